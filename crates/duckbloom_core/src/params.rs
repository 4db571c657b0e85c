//! Sizing rules and capacity planning.

use crate::errors::{BloomError, Result};
use crate::hash::Addressing;
use std::f64::consts::LN_2;

#[inline]
pub fn is_power_of_two(v: usize) -> bool {
    v != 0 && v & (v - 1) == 0
}

/// The only validation the engine performs: sizes must be a power of two.
pub fn validate_size(size: usize) -> Result<()> {
    if !is_power_of_two(size) {
        return Err(BloomError::NotPowerOfTwo { size });
    }
    Ok(())
}

/// A `(size, hash_count)` pair derived from an expected item count and a
/// target false-positive probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub size: usize,
    pub hash_count: u32,
}

impl FilterParams {
    /// Size a filter for `n` items at false-positive probability `p`.
    ///
    /// `m = -n ln p / ln²2` bits are required. The region is the smallest power
    /// of two whose *addressable* bits cover `m`, which for
    /// [`Addressing::Compatible`] is one bit per byte.
    pub fn plan(n: u64, p: f64, addressing: Addressing) -> Result<Self> {
        check_rate(p)?;
        if n == 0 {
            return Err(BloomError::InvalidInput("expected item count must be positive".into()));
        }
        let m = -(n as f64) * p.ln() / (LN_2 * LN_2);
        let bits_per_byte = match addressing {
            Addressing::Compatible => 1.0,
            Addressing::FullRange => 8.0,
        };
        let bytes = (m / bits_per_byte).max(1.0);
        let exp = bytes.log2().ceil();
        if exp >= (usize::BITS - 1) as f64 {
            return Err(BloomError::InvalidInput(format!("{n} items at p={p} needs an unmappable filter")));
        }
        let size = 1usize << (exp as u32);
        Ok(Self { size, hash_count: Self::hash_count_for(size, n, addressing) })
    }

    /// Optimal rounds for `n` items in a `size`-byte region: `k = round(m/n · ln 2)`.
    pub fn hash_count_for(size: usize, n: u64, addressing: Addressing) -> u32 {
        if n == 0 {
            return 1;
        }
        let m = addressing.addressable_bits(size) as f64;
        ((m / n as f64) * LN_2).round().max(1.0) as u32
    }

    /// Sizing used by the duckbloom Python wrapper: `size * 8` bits are
    /// counted whatever the addressing. Its files carry no header, so `k` for
    /// an existing file must come from this same formula on every open.
    pub fn plan_classic(n: u64, p: f64) -> Result<Self> {
        Self::plan(n, p, Addressing::FullRange)
    }

    /// `k = round(size·8/n · ln 2)`, the wrapper's rounds for a known size.
    pub fn classic_hash_count(size: usize, n: u64) -> u32 {
        Self::hash_count_for(size, n, Addressing::FullRange)
    }

    /// Rounds for a target probability alone: `k = round(-log2 p)`.
    pub fn hash_count_for_rate(p: f64) -> Result<u32> {
        check_rate(p)?;
        Ok((-p.log2()).round().max(1.0) as u32)
    }
}

fn check_rate(p: f64) -> Result<()> {
    if !(p > 0.0 && p < 1.0) {
        return Err(BloomError::InvalidInput(format!("false-positive rate must be in (0, 1), got {p}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_rule() {
        for ok in [1usize, 2, 1024, 65536] {
            assert!(validate_size(ok).is_ok(), "{ok}");
        }
        for bad in [0usize, 3, 6, 100] {
            assert!(matches!(validate_size(bad), Err(BloomError::NotPowerOfTwo { size }) if size == bad));
        }
    }

    #[test]
    fn plan_full_range_matches_textbook_sizing() {
        // n=1000, p=1e-6 -> m ≈ 28756 bits ≈ 3595 bytes -> 4096
        let fp = FilterParams::plan(1000, 1e-6, Addressing::FullRange).unwrap();
        assert_eq!(fp.size, 4096);
        // 32768 / 1000 * ln2 ≈ 22.7
        assert_eq!(fp.hash_count, 23);
    }

    #[test]
    fn plan_compatible_allots_a_byte_per_bit() {
        let fp = FilterParams::plan(1000, 1e-6, Addressing::Compatible).unwrap();
        assert_eq!(fp.size, 32768);
        assert_eq!(fp.hash_count, 23);
    }

    #[test]
    fn plan_rejects_bad_inputs() {
        assert!(FilterParams::plan(0, 0.01, Addressing::Compatible).is_err());
        assert!(FilterParams::plan(10, 0.0, Addressing::Compatible).is_err());
        assert!(FilterParams::plan(10, 1.0, Addressing::Compatible).is_err());
        assert!(FilterParams::plan(10, f64::NAN, Addressing::Compatible).is_err());
    }

    #[test]
    fn classic_sizing_counts_eight_bits_per_byte() {
        let fp = FilterParams::plan_classic(1000, 1e-6).unwrap();
        assert_eq!(fp, FilterParams { size: 4096, hash_count: 23 });
        // reopening that 4096-byte file with n=1000 must agree on k
        assert_eq!(FilterParams::classic_hash_count(4096, 1000), 23);
        assert_eq!(FilterParams::hash_count_for(4096, 1000, Addressing::Compatible), 3);
    }

    #[test]
    fn rounds_from_rate() {
        assert_eq!(FilterParams::hash_count_for_rate(1e-6).unwrap(), 20);
        assert_eq!(FilterParams::hash_count_for_rate(0.5).unwrap(), 1);
    }
}
