//! # Bloom Filter Module
//!
//! A space-efficient probabilistic membership structure embedded in every
//! SSTable for fast negative point lookups.
//!
//! A bloom filter answers "might this key be present?" with **no false
//! negatives**: if [`BloomFilter::might_contain`] returns `false`, the key
//! is definitely absent and the SSTable can be skipped without touching its
//! data block. False positives are possible and bounded by the bit-array
//! size and hash count.
//!
//! ## Hash family
//!
//! The filter derives its `k` bit positions from FNV-1a over the key's
//! bytes, re-seeded per hash index: hash `i` starts from the FNV offset
//! basis XOR `i`, so a single pass per hash yields `k` independent
//! positions.
//!
//! # On-disk layout
//!
//! ```text
//! [size_bits_LE (4 B)][hash_count (1 B)][bits (ceil(size/8) B)]
//! ```
//!
//! Deserializing the serialized form reconstructs an equivalent filter:
//! every key added before the round-trip still reports "maybe present".

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 16_777_619;

/// Serialized prefix: `size (4 B) + hash_count (1 B)`.
const PREFIX_SIZE: usize = 5;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`BloomFilter`] deserialization.
#[derive(Debug, Error)]
pub enum BloomError {
    /// The serialized bytes do not describe a valid filter.
    #[error("corrupt bloom filter: {0}")]
    CorruptFilter(String),
}

// ------------------------------------------------------------------------------------------------
// BloomFilter
// ------------------------------------------------------------------------------------------------

/// A bloom filter over string keys, backed by a packed bit array with `k`
/// seed-perturbed FNV-1a hash functions.
///
/// Sizing comes from the engine configuration
/// ([`EngineConfig::bloom_filter_size`](crate::engine::EngineConfig) bits and
/// [`EngineConfig::bloom_hash_count`](crate::engine::EngineConfig) hashes);
/// the SSTable writer builds one filter per table and embeds its serialized
/// form in the bloom block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Packed bit array, bit `i` lives at `bits[i / 8]`, mask `1 << (i % 8)`.
    bits: Vec<u8>,

    /// Number of addressable bits.
    size: u32,

    /// Number of hash functions (`k`).
    hash_count: u8,
}

impl BloomFilter {
    /// Creates an empty filter with `size` bits and `hash_count` hash
    /// functions.
    ///
    /// A `size` of zero is clamped to one bit so the modulo in the hash
    /// family stays well-defined.
    pub fn new(size: u32, hash_count: u8) -> Self {
        let size = size.max(1);
        Self {
            bits: vec![0u8; size.div_ceil(8) as usize],
            size,
            hash_count,
        }
    }

    /// Adds a key to the set by setting its `k` bit positions.
    pub fn add(&mut self, key: &str) {
        for i in 0..self.hash_count {
            let bit = self.bit_position(key, i);
            self.set_bit(bit);
        }
    }

    /// Returns `false` if the key is definitely absent, `true` if it might
    /// be present.
    #[must_use]
    pub fn might_contain(&self, key: &str) -> bool {
        (0..self.hash_count).all(|i| self.get_bit(self.bit_position(key, i)))
    }

    /// Returns the number of addressable bits.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn hash_count(&self) -> u8 {
        self.hash_count
    }

    /// Serializes the filter.
    ///
    /// Layout (little-endian): `size (u32) | hash_count (u8) | bits`.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_SIZE + self.bits.len());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.push(self.hash_count);
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Reconstructs a filter from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`BloomError::CorruptFilter`] when the buffer is shorter than
    /// the fixed prefix, declares a zero bit count, or carries a bit array
    /// whose length disagrees with the declared size.
    pub fn deserialize(buf: &[u8]) -> Result<Self, BloomError> {
        if buf.len() < PREFIX_SIZE {
            return Err(BloomError::CorruptFilter(format!(
                "{} bytes is shorter than the {PREFIX_SIZE}-byte prefix",
                buf.len()
            )));
        }

        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let hash_count = buf[4];

        if size == 0 {
            return Err(BloomError::CorruptFilter("declared size is zero".into()));
        }

        let expected = size.div_ceil(8) as usize;
        let bits = &buf[PREFIX_SIZE..];
        if bits.len() != expected {
            return Err(BloomError::CorruptFilter(format!(
                "bit array is {} bytes, expected {expected} for {size} bits",
                bits.len()
            )));
        }

        Ok(Self {
            bits: bits.to_vec(),
            size,
            hash_count,
        })
    }

    /// Computes the bit position for hash index `i`.
    ///
    /// FNV-1a over the key's bytes with the offset basis perturbed by the
    /// hash index, reduced modulo the bit-array size.
    fn bit_position(&self, key: &str, i: u8) -> u32 {
        let mut h = FNV_OFFSET_BASIS ^ u32::from(i);
        for &byte in key.as_bytes() {
            h = (h ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
        }
        h % self.size
    }

    fn set_bit(&mut self, idx: u32) {
        self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    fn get_bit(&self, idx: u32) -> bool {
        self.bits[(idx / 8) as usize] & (1 << (idx % 8)) != 0
    }
}
