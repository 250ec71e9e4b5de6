//! Fixed-size bloom filter bit array

use std::fmt;

/// A bloom filter over byte strings
///
/// Bit positions are derived from a single BLAKE3 digest of the element by
/// double hashing, so `hashes` positions cost one hash computation.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    hashes: u8,
}

impl BloomFilter {
    /// Create an empty filter of `bytes` bytes setting `hashes` bits per element
    pub fn new(bytes: usize, hashes: u8) -> Self {
        assert!(bytes > 0, "bloom filter needs at least one byte");
        assert!(hashes > 0, "bloom filter needs at least one hash");
        BloomFilter {
            bits: vec![0u8; bytes],
            hashes,
        }
    }

    fn positions(&self, item: &[u8]) -> impl Iterator<Item = usize> {
        let digest = blake3::hash(item);
        let bytes = digest.as_bytes();

        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&bytes[0..8]);
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_le_bytes(h1);
        // Odd stride so consecutive probes never collapse onto one bit
        let h2 = u64::from_le_bytes(h2) | 1;

        let m = (self.bits.len() * 8) as u64;
        (0..self.hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }

    /// Add an element
    pub fn add(&mut self, item: &[u8]) {
        let positions: Vec<usize> = self.positions(item).collect();
        for pos in positions {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Test an element. False positives are possible, false negatives are not.
    pub fn contains(&self, item: &[u8]) -> bool {
        self.positions(item)
            .all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    /// Size of the bit array in bytes
    pub fn size_bytes(&self) -> usize {
        self.bits.len()
    }

    /// Bits set per element
    pub fn hashes(&self) -> u8 {
        self.hashes
    }

    /// Whether two filters can be merged or compared bit for bit
    pub fn same_geometry(&self, other: &BloomFilter) -> bool {
        self.bits.len() == other.bits.len() && self.hashes == other.hashes
    }

    /// Bitwise union, `None` if the geometries differ
    pub fn merge(&self, other: &BloomFilter) -> Option<BloomFilter> {
        if !self.same_geometry(other) {
            return None;
        }
        let bits = self
            .bits
            .iter()
            .zip(&other.bits)
            .map(|(a, b)| a | b)
            .collect();
        Some(BloomFilter {
            bits,
            hashes: self.hashes,
        })
    }

    /// Every bit set in `smaller` is also set here
    pub fn may_contain(&self, smaller: &BloomFilter) -> bool {
        self.same_geometry(smaller)
            && self
                .bits
                .iter()
                .zip(&smaller.bits)
                .all(|(big, small)| small & !big == 0)
    }

    /// Number of differing bits. Bytes past the end of the shorter filter
    /// count as unset.
    pub fn hamming_distance(&self, other: &BloomFilter) -> u32 {
        let len = self.bits.len().max(other.bits.len());
        (0..len)
            .map(|i| {
                let a = self.bits.get(i).copied().unwrap_or(0);
                let b = other.bits.get(i).copied().unwrap_or(0);
                (a ^ b).count_ones()
            })
            .sum()
    }

    /// Number of set bits
    pub fn popcount(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Serialized form: hash count followed by the bit array
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bits.len() + 1);
        out.push(self.hashes);
        out.extend_from_slice(&self.bits);
        out
    }

    /// Inverse of [`BloomFilter::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.split_first() {
            Some((&hashes, bits)) if hashes > 0 && !bits.is_empty() => Some(BloomFilter {
                bits: bits.to_vec(),
                hashes,
            }),
            _ => None,
        }
    }

    /// Short description used in error messages
    pub fn geometry(&self) -> String {
        format!("{} bytes/{} hashes", self.bits.len(), self.hashes)
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BloomFilter({}, {} bits set)",
            self.geometry(),
            self.popcount()
        )
    }
}
