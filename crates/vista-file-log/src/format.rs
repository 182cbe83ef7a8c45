//! On-disk record layout
//!
//! `[offset: u64][timestamp_ms: i64][key_len: u32][key][value_len: u32][value]`,
//! all integers big-endian.

use std::io::{self, Read};
use vista_core::{Offset, Result, VistaError};

const FIXED_LEN: usize = 8 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawRecord {
    pub offset: Offset,
    pub timestamp_ms: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawRecord {
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + self.key.len() + 4 + self.value.len()
    }
}

pub(crate) fn encode(record: &RawRecord, buf: &mut Vec<u8>) {
    buf.reserve(record.encoded_len());
    buf.extend_from_slice(&(record.offset as u64).to_be_bytes());
    buf.extend_from_slice(&record.timestamp_ms.to_be_bytes());
    buf.extend_from_slice(&(record.key.len() as u32).to_be_bytes());
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&(record.value.len() as u32).to_be_bytes());
    buf.extend_from_slice(&record.value);
}

/// Fill `buf` completely; `false` if the input ends first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read the next complete record.
///
/// `Ok(None)` when the input ends before a whole record is available, which
/// is either the end of the log or a record still being written.
pub(crate) fn read_record<R: Read>(
    reader: &mut R,
    max_record_size: usize,
) -> Result<Option<RawRecord>> {
    let mut fixed = [0u8; FIXED_LEN];
    if !read_full(reader, &mut fixed)? {
        return Ok(None);
    }

    let mut word = [0u8; 8];
    word.copy_from_slice(&fixed[0..8]);
    let offset = u64::from_be_bytes(word) as Offset;
    word.copy_from_slice(&fixed[8..16]);
    let timestamp_ms = i64::from_be_bytes(word);
    let mut len = [0u8; 4];
    len.copy_from_slice(&fixed[16..20]);
    let key_len = u32::from_be_bytes(len) as usize;

    if key_len > max_record_size {
        return Err(VistaError::InvalidState(format!(
            "record {} key size {} exceeds max_record_size {}",
            offset, key_len, max_record_size
        )));
    }
    let mut key = vec![0u8; key_len];
    if !read_full(reader, &mut key)? {
        return Ok(None);
    }

    if !read_full(reader, &mut len)? {
        return Ok(None);
    }
    let value_len = u32::from_be_bytes(len) as usize;
    if key_len + value_len > max_record_size {
        return Err(VistaError::InvalidState(format!(
            "record {} size {} exceeds max_record_size {}",
            offset,
            key_len + value_len,
            max_record_size
        )));
    }
    let mut value = vec![0u8; value_len];
    if !read_full(reader, &mut value)? {
        return Ok(None);
    }

    Ok(Some(RawRecord {
        offset,
        timestamp_ms,
        key,
        value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(offset: Offset, key: &str, value: &[u8]) -> RawRecord {
        RawRecord {
            offset,
            timestamp_ms: 1_700_000_000_000,
            key: key.as_bytes().to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_layout() {
        let mut buf = Vec::new();
        encode(&record(1, "ab", b"xyz"), &mut buf);
        assert_eq!(buf.len(), 8 + 8 + 4 + 2 + 4 + 3);
        assert_eq!(&buf[0..8], &1u64.to_be_bytes());
        assert_eq!(&buf[16..20], &2u32.to_be_bytes());
        assert_eq!(&buf[20..22], b"ab");
        assert_eq!(&buf[22..26], &3u32.to_be_bytes());
    }

    #[test]
    fn test_partial_record_reads_as_none() {
        let mut buf = Vec::new();
        encode(&record(0, "k", b"v"), &mut buf);
        encode(&record(1, "key", b"value"), &mut buf);
        buf.truncate(buf.len() - 2);

        let mut cursor = Cursor::new(buf);
        let first = read_record(&mut cursor, 1024).unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert!(read_record(&mut cursor, 1024).unwrap().is_none());
    }

    #[test]
    fn test_tombstone_has_empty_value() {
        let mut buf = Vec::new();
        encode(&record(4, "gone", b""), &mut buf);
        let decoded = read_record(&mut Cursor::new(buf), 1024).unwrap().unwrap();
        assert!(decoded.value.is_empty());
        assert_eq!(decoded.key, b"gone");
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let mut buf = Vec::new();
        encode(&record(0, "k", &[0u8; 64]), &mut buf);
        assert!(matches!(
            read_record(&mut Cursor::new(buf), 16),
            Err(VistaError::InvalidState(_))
        ));
    }
}
