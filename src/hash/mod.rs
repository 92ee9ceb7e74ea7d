//! The 32-bit hash primitives used to place virtual points and keys on the ring.
//!
//! The ring itself doesn't care which function is used as long as it is deterministic.
//! Like the partitioning code in rldb, a hash function is just a function pointer.
//! This means the whole byte slice is hashed at once, which is fine for node ids and routing keys.
use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Signature of every hash function accepted by the ring
pub type HashFn = fn(&[u8]) -> u32;

/// A hash function together with the largest value it can return.
///
/// `domain_max` is what the bucket table divides to compute its `step`. Real hash functions
/// cover the whole u32 space, but test doubles usually don't (eg: a stub returning values in [0, 63]).
#[derive(Clone, Copy)]
pub struct HashFunction {
    func: HashFn,
    domain_max: u32,
}

impl HashFunction {
    pub fn new(func: HashFn) -> Self {
        Self {
            func,
            domain_max: u32::MAX,
        }
    }

    pub fn with_domain_max(func: HashFn, domain_max: u32) -> Self {
        Self { func, domain_max }
    }

    pub fn hash(&self, data: &[u8]) -> u32 {
        (self.func)(data)
    }

    pub fn domain_max(&self) -> u32 {
        self.domain_max
    }
}

impl Default for HashFunction {
    fn default() -> Self {
        HashAlgorithm::default().into()
    }
}

impl std::fmt::Debug for HashFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashFunction")
            .field("domain_max", &self.domain_max)
            .finish()
    }
}

/// The hash algorithms that can be selected through configuration
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// zlib/IEEE CRC-32. Same values as `Zlib.crc32`, `binascii.crc32` and friends
    #[default]
    Crc32,
    /// CRC-32 with the Castagnoli polynomial
    Crc32c,
    /// murmur3 x86 32 bits, seed 0
    Murmur3,
}

impl From<HashAlgorithm> for HashFunction {
    fn from(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Crc32 => HashFunction::new(crc32_hash),
            HashAlgorithm::Crc32c => HashFunction::new(crc32c_hash),
            HashAlgorithm::Murmur3 => HashFunction::new(murmur3_hash),
        }
    }
}

pub fn crc32_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

pub fn crc32c_hash(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

pub fn murmur3_hash(data: &[u8]) -> u32 {
    // reading from an in-memory cursor can't fail
    murmur3_32(&mut Cursor::new(data), 0).unwrap_or_default()
}
