//! Hash rounds and bit addressing.
//!
//! Round `i` hashes the item with XXH64 seeded by `i`, masks the hash down to
//! an offset, and splits the offset into a byte index (`offset >> 3`) and a
//! bit within that byte (`offset & 7`).

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

#[inline]
pub fn round_hash(seed: u32, data: &[u8]) -> u64 {
    xxh64(data, seed as u64)
}

/// How a round hash is reduced to an offset inside a `size`-byte region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addressing {
    /// Mask with `size - 1`. Offsets land in the low `size / 8` bytes only;
    /// this is the layout of every existing duckbloom file.
    #[default]
    Compatible,
    /// Mask with `size * 8 - 1`, spreading offsets over the whole region.
    /// Files written this way are not readable as `Compatible` and vice versa.
    FullRange,
}

impl Addressing {
    #[inline]
    pub fn mask(self, size: usize) -> u64 {
        match self {
            Addressing::Compatible => (size as u64).wrapping_sub(1),
            Addressing::FullRange => (size as u64).wrapping_mul(8).wrapping_sub(1),
        }
    }

    /// Number of distinct bits this scheme can address in a `size`-byte region.
    pub fn addressable_bits(self, size: usize) -> u64 {
        self.mask(size).wrapping_add(1)
    }

    #[inline]
    pub fn locate(self, hash: u64, size: usize) -> (usize, u8) {
        let offset = hash & self.mask(size);
        ((offset >> 3) as usize, 1u8 << (offset & 7))
    }
}

/// The `(byte_index, bit_mask)` pairs for one item, one per round, in round order.
pub struct BitPositions<'a> {
    data: &'a [u8],
    mask: u64,
    round: u32,
    rounds: u32,
}

impl<'a> BitPositions<'a> {
    pub fn new(data: &'a [u8], rounds: u32, size: usize, addressing: Addressing) -> Self {
        Self { data, mask: addressing.mask(size), round: 0, rounds }
    }
}

impl Iterator for BitPositions<'_> {
    type Item = (usize, u8);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.round >= self.rounds {
            return None;
        }
        let offset = round_hash(self.round, self.data) & self.mask;
        self.round += 1;
        Some(((offset >> 3) as usize, 1u8 << (offset & 7)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.rounds - self.round) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xxh64_reference_values() {
        assert_eq!(round_hash(0, b""), 0xEF46_DB37_51D8_E999);
        assert_eq!(round_hash(0, b"abc"), 0x44BC_2CF5_AD77_0999);
        assert_eq!(round_hash(0, b"abcd"), 0xDE03_27B0_D25D_92CC);
        assert_eq!(round_hash(1, b"abcd"), 0xF5DC_BD6D_EE3C_9553);
    }

    #[test]
    fn compatible_masks_by_bytes() {
        assert_eq!(Addressing::Compatible.mask(1024), 1023);
        assert_eq!(Addressing::Compatible.addressable_bits(1024), 1024);
        // 0x...92cc & 1023 = 716 -> byte 89, bit 4
        assert_eq!(Addressing::Compatible.locate(0xDE03_27B0_D25D_92CC, 1024), (89, 1 << 4));
    }

    #[test]
    fn full_range_masks_by_bits() {
        assert_eq!(Addressing::FullRange.mask(1024), 8191);
        assert_eq!(Addressing::FullRange.locate(0xDE03_27B0_D25D_92CC, 1024), (601, 1 << 4));
    }

    #[test]
    fn single_byte_region() {
        assert_eq!(Addressing::Compatible.locate(u64::MAX, 1), (0, 1));
        assert_eq!(Addressing::FullRange.locate(u64::MAX, 1), (0, 1 << 7));
    }

    #[test]
    fn positions_follow_round_order() {
        let got: Vec<_> = BitPositions::new(b"abcd", 3, 1024, Addressing::Compatible).collect();
        assert_eq!(got, vec![(89, 1 << 4), (42, 1 << 3), (69, 1 << 4)]);
        assert_eq!(BitPositions::new(b"abcd", 0, 1024, Addressing::Compatible).count(), 0);
    }
}
