//! Deterministic PRNG and seed derivation for map generation.
//!
//! Uses a 32-bit SplitMix-style counter: the state advances by a fixed odd
//! increment and each output is the murmur3 finalizer of the new state.
//! Four bytes of state, no platform randomness, trivially serializable.

use crate::fixed::Fixed64;
use serde::{Deserialize, Serialize};

/// Substituted whenever seed derivation would produce zero.
pub const FALLBACK_SEED: u32 = 0x6D2B_79F5;

const GOLDEN_GAMMA: u32 = 0x9E37_79B9;
const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// A user-facing world seed. Either a number or free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldSeed {
    Number(i64),
    Text(String),
}

impl WorldSeed {
    /// Derive the 32-bit generator seed.
    ///
    /// Numbers keep their low 32 bits; text is hashed with FNV-1a over its
    /// UTF-8 bytes. A zero result is replaced with [`FALLBACK_SEED`].
    pub fn derive(&self) -> u32 {
        let raw = match self {
            WorldSeed::Number(n) => *n as u32,
            WorldSeed::Text(s) => fnv1a_32(s.as_bytes()),
        };
        if raw == 0 { FALLBACK_SEED } else { raw }
    }
}

impl From<i64> for WorldSeed {
    fn from(n: i64) -> Self {
        WorldSeed::Number(n)
    }
}

impl From<u32> for WorldSeed {
    fn from(n: u32) -> Self {
        WorldSeed::Number(n as i64)
    }
}

impl From<&str> for WorldSeed {
    fn from(s: &str) -> Self {
        WorldSeed::Text(s.to_string())
    }
}

impl From<String> for WorldSeed {
    fn from(s: String) -> Self {
        WorldSeed::Text(s)
    }
}

/// 32-bit FNV-1a. Order dependent: `"ab"` and `"ba"` hash differently.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Counter-based 32-bit generator used by map generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRng {
    state: u32,
}

impl MapRng {
    /// Create a generator from an already-derived seed.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u32` in the sequence.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 16)).wrapping_mul(0x85EB_CA6B);
        z = (z ^ (z >> 13)).wrapping_mul(0xC2B2_AE35);
        z ^ (z >> 16)
    }

    /// Uniform fraction in `[0, 1)`.
    pub fn next_fixed(&mut self) -> Fixed64 {
        // Q32.32: a u32 in the fractional bits is exactly value / 2^32.
        Fixed64::from_bits(self.next_u32() as i64)
    }

    /// Uniform integer in `[lo, hi)`. Returns `lo` for an empty range.
    pub fn range_i32(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        let span = (hi as i64 - lo as i64) as u64;
        let offset = (self.next_u32() as u64 * span) >> 32;
        (lo as i64 + offset as i64) as i32
    }

    /// Uniform fixed-point value in `[lo, hi)`.
    pub fn range_fixed(&mut self, lo: Fixed64, hi: Fixed64) -> Fixed64 {
        if hi <= lo {
            return lo;
        }
        lo + (hi - lo) * self.next_fixed()
    }

    /// One draw against `probability`. Certain outcomes skip the draw.
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::from_num(1) {
            return true;
        }
        self.next_fixed() < probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let mut a = MapRng::new(42);
        let mut b = MapRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = MapRng::new(1);
        let mut b = MapRng::new(2);
        assert_ne!(a.next_u32(), b.next_u32());
    }

    #[test]
    fn numeric_seed_truncates_to_low_bits() {
        let wide = WorldSeed::Number((7_i64 << 32) | 1234);
        assert_eq!(wide.derive(), 1234);
    }

    #[test]
    fn zero_seed_falls_back() {
        assert_eq!(WorldSeed::Number(0).derive(), FALLBACK_SEED);
        assert_eq!(WorldSeed::Number(1_i64 << 32).derive(), FALLBACK_SEED);
    }

    #[test]
    fn text_seed_is_order_sensitive() {
        let ab = WorldSeed::from("ab").derive();
        let ba = WorldSeed::from("ba").derive();
        assert_ne!(ab, ba);
        assert_eq!(ab, WorldSeed::from("ab").derive());
    }

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811C_9DC5);
        assert_eq!(fnv1a_32(b"a"), 0xE40C_292C);
        assert_eq!(fnv1a_32(b"foobar"), 0xBF9C_F968);
    }

    #[test]
    fn next_fixed_in_unit_interval() {
        let mut rng = MapRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_fixed();
            assert!(v >= Fixed64::ZERO && v < Fixed64::from_num(1));
        }
    }

    #[test]
    fn range_i32_stays_in_range() {
        let mut rng = MapRng::new(99);
        for _ in 0..1000 {
            let v = rng.range_i32(-3, 4);
            assert!((-3..4).contains(&v), "got {v}");
        }
        assert_eq!(rng.range_i32(5, 5), 5);
    }

    #[test]
    fn chance_extremes() {
        let mut rng = MapRng::new(999);
        for _ in 0..100 {
            assert!(!rng.chance(Fixed64::ZERO));
            assert!(rng.chance(Fixed64::from_num(1)));
        }
    }

    #[test]
    fn seed_untagged_serde() {
        let n: WorldSeed = serde_json::from_str("12345").unwrap();
        assert_eq!(n, WorldSeed::Number(12345));
        let t: WorldSeed = serde_json::from_str("\"factory\"").unwrap();
        assert_eq!(t, WorldSeed::Text("factory".into()));
    }
}
