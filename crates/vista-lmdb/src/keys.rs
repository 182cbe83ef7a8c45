use vista_core::Offset;

/// Encode an offset as big-endian bytes
pub fn offset_to_bytes(offset: Offset) -> [u8; 8] {
    offset.to_be_bytes()
}

/// Decode a big-endian offset; `None` unless exactly 8 bytes
pub fn bytes_to_offset(bytes: &[u8]) -> Option<Offset> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(Offset::from_be_bytes(raw))
}

/// Keys of the meta database
pub mod meta_keys {
    pub const OFFSET: &str = "offset";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const CREATED_AT: &str = "created_at";
    pub const RECOVERED_AT: &str = "recovered_at";
}
