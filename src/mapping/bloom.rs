//! Bloom filter over vanity path keys.
//!
//! # Design Decisions
//! - Bits live in `AtomicU64` words so `add` only needs `&self`
//! - Two base hashes combined as `h1 + i * h2` derive all probe positions
//! - No removal: a stale filter is replaced wholesale, never cleared bit by bit

use std::sync::atomic::{AtomicU64, Ordering};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Target false-positive rate used when sizing the bit array.
const FALSE_POSITIVE_RATE: f64 = 0.01;

const MAX_HASHES: u32 = 16;

/// Fixed-size probabilistic set.
#[derive(Debug)]
pub struct BloomFilter {
    words: Vec<AtomicU64>,
    bits: u64,
    hashes: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_entries` keys within `max_bytes`.
    pub fn new(expected_entries: usize, max_bytes: usize) -> Self {
        let n = expected_entries.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let optimal = (-n * FALSE_POSITIVE_RATE.ln() / (ln2 * ln2)).ceil() as u64;
        let budget = (max_bytes.max(8) as u64).saturating_mul(8);
        let bits = optimal.clamp(64, budget.max(64));
        let hashes = ((bits as f64 / n) * ln2).round() as u32;

        let words = (0..bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        Self {
            words,
            bits,
            hashes: hashes.clamp(1, MAX_HASHES),
        }
    }

    pub fn add(&self, key: &[u8]) {
        for bit in self.positions(key) {
            self.words[(bit / 64) as usize].fetch_or(1 << (bit % 64), Ordering::Relaxed);
        }
    }

    /// False means the key was definitely never added.
    pub fn probably_contains(&self, key: &[u8]) -> bool {
        self.positions(key)
            .all(|bit| self.words[(bit / 64) as usize].load(Ordering::Relaxed) & (1 << (bit % 64)) != 0)
    }

    pub fn bit_count(&self) -> u64 {
        self.bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hashes
    }

    fn positions(&self, key: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let h1 = fnv1a(key);
        let h2 = mix(h1) | 1;
        (0..self.hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.bits)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(FNV_PRIME)
    })
}

/// splitmix64 finaliser.
fn mix(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
