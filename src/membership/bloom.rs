//! Bloom filter over vertex keys.
//!
//! Vertex keys are already blake3 output, so instead of re-hashing we split
//! the 128-bit key into two 64-bit halves (h1, h2) and derive probe positions
//! with enhanced double-hashing.
//!
//! Binary format:
//! ```text
//! [num_bits: u64 LE]           // 8 bytes
//! [num_hashes: u32 LE]         // 4 bytes
//! [padding: u32 LE = 0]        // 4 bytes
//! [bits: u64 LE x word_count]  // word_count = ceil(num_bits / 64)
//! ```

use std::io::Write;

use crate::error::{Result, SplitError};
use crate::record::VertexKey;

/// Bits per expected key (~0.82% FPR with 7 hashes).
pub const BLOOM_BITS_PER_KEY: usize = 10;

/// Probe count per key.
pub const BLOOM_NUM_HASHES: usize = 7;

/// Header size: num_bits(8) + num_hashes(4) + padding(4) = 16 bytes.
const BLOOM_HEADER_SIZE: usize = 16;

#[derive(Debug)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: usize,
}

/// h2 is forced odd so it stays coprime with power-of-two bit counts.
fn probe_positions(key: VertexKey, num_hashes: usize, num_bits: usize) -> impl Iterator<Item = usize> {
    let h1 = key.0 as u64;
    let h2 = ((key.0 >> 64) as u64) | 1;
    (0..num_hashes as u64)
        .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % (num_bits as u64)) as usize)
}

impl BloomFilter {
    /// Filter sized for `num_keys` insertions, word-aligned, at least 64 bits.
    pub fn new(num_keys: usize) -> Self {
        let raw_bits = num_keys.saturating_mul(BLOOM_BITS_PER_KEY);
        let num_bits = (raw_bits.max(64) + 63) & !63;
        Self {
            bits: vec![0u64; num_bits / 64],
            num_bits,
            num_hashes: BLOOM_NUM_HASHES,
        }
    }

    pub fn insert(&mut self, key: VertexKey) {
        for pos in probe_positions(key, self.num_hashes, self.num_bits) {
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
    }

    /// `false` means definitely absent.
    pub fn maybe_contains(&self, key: VertexKey) -> bool {
        probe_positions(key, self.num_hashes, self.num_bits)
            .all(|pos| self.bits[pos / 64] & (1u64 << (pos % 64)) != 0)
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&(self.num_bits as u64).to_le_bytes())?;
        writer.write_all(&(self.num_hashes as u32).to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;
        for &word in &self.bits {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOOM_HEADER_SIZE {
            return Err(SplitError::InvalidFormat("Bloom filter too small".into()));
        }

        let num_bits = read_u64(bytes, 0) as usize;
        let num_hashes = read_u32(bytes, 8) as usize;

        if num_bits == 0 {
            return Err(SplitError::InvalidFormat("Bloom filter has zero bits".into()));
        }

        let word_count = num_bits.div_ceil(64);
        if bytes.len() < BLOOM_HEADER_SIZE + word_count * 8 {
            return Err(SplitError::InvalidFormat("Bloom filter data truncated".into()));
        }

        let bits = (0..word_count)
            .map(|i| read_u64(bytes, BLOOM_HEADER_SIZE + i * 8))
            .collect();

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    pub fn serialized_size(&self) -> usize {
        BLOOM_HEADER_SIZE + self.bits.len() * 8
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}
