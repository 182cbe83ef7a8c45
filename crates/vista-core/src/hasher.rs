//! Key hashing for partition routing
//!
//! A [`HasherFactory`] produces a fresh [`Hasher32`] per key. The routed
//! partition is `sum32 % partition_count`, so a producer and a view that
//! share a hasher type and a partition count always agree on placement.

use crate::error::{Result, VistaError};
use crate::types::PartitionId;
use std::io;
use std::sync::Arc;
use xxhash_rust::xxh32::Xxh32;

/// A streaming 32-bit hash function.
///
/// `write` may fail; routing surfaces that failure instead of guessing a partition.
pub trait Hasher32: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn sum32(&self) -> u32;
}

/// Produces a fresh hasher instance per call.
pub type HasherFactory = Arc<dyn Fn() -> Box<dyn Hasher32> + Send + Sync>;

/// Kafka-compatible murmur2 hasher (the default).
///
/// Bytes are buffered and hashed on [`Hasher32::sum32`]; the sign bit is
/// masked exactly like Kafka's default partitioner so keys land on the same
/// partitions producers put them on.
#[derive(Debug, Default, Clone)]
pub struct Murmur2Hasher {
    buf: Vec<u8>,
}

impl Murmur2Hasher {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for use in view and producer options.
    pub fn factory() -> HasherFactory {
        Arc::new(|| Box::new(Murmur2Hasher::new()) as Box<dyn Hasher32>)
    }

    fn murmur2(data: &[u8]) -> u32 {
        let len = data.len();
        let mut h: u32 = Self::SEED ^ (len as u32);

        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            k = k.wrapping_mul(Self::M);
            k ^= k >> Self::R;
            k = k.wrapping_mul(Self::M);
            h = h.wrapping_mul(Self::M);
            h ^= k;
        }

        let tail = chunks.remainder();
        if tail.len() >= 3 {
            h ^= u32::from(tail[2]) << 16;
        }
        if tail.len() >= 2 {
            h ^= u32::from(tail[1]) << 8;
        }
        if !tail.is_empty() {
            h ^= u32::from(tail[0]);
            h = h.wrapping_mul(Self::M);
        }

        h ^= h >> 13;
        h = h.wrapping_mul(Self::M);
        h ^= h >> 15;
        h
    }
}

impl Hasher32 for Murmur2Hasher {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn sum32(&self) -> u32 {
        Self::murmur2(&self.buf) & 0x7fff_ffff
    }
}

/// xxHash32 hasher backed by `xxhash-rust`.
#[derive(Clone)]
pub struct XxHash32Hasher {
    state: Xxh32,
}

impl XxHash32Hasher {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            state: Xxh32::new(seed),
        }
    }

    pub fn factory() -> HasherFactory {
        Arc::new(|| Box::new(XxHash32Hasher::new()) as Box<dyn Hasher32>)
    }
}

impl Default for XxHash32Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher32 for XxHash32Hasher {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.state.update(bytes);
        Ok(())
    }

    fn sum32(&self) -> u32 {
        self.state.digest()
    }
}

/// Route `key` to a partition index in `0..partitions`.
///
/// # Errors
///
/// `Config` when there are no partitions, `Routing` when the hasher fails to
/// absorb the key bytes.
pub fn hash_key(hasher: &HasherFactory, key: &str, partitions: usize) -> Result<PartitionId> {
    if partitions == 0 {
        return Err(VistaError::Config("no partitions to route to".into()));
    }

    let mut h = hasher();
    h.write(key.as_bytes()).map_err(VistaError::Routing)?;

    let index = h.sum32() % partitions as u32;
    Ok(index as PartitionId)
}
