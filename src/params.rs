//! # Params — Candidate Normalization and Trivial-Case Tables
//!
//! A Riesel candidate is N = h·2^n − 1 with h odd and h < 2^n. Users may pass
//! an even h; powers of two are shifted from h into the exponent until h is
//! odd (6·2^2 − 1 and 3·2^3 − 1 are the same number). The original h and n are
//! kept for reporting, so the verdict line always echoes what the user typed.
//!
//! Candidates divisible by 3 are rejected without running the Lucas test:
//! h·2^n − 1 ≡ 0 (mod 3) exactly when h ≡ 1 (mod 3) with n even, or
//! h ≡ 2 (mod 3) with n odd.

use rug::Integer;

use crate::{checked_u32, TestError};

/// Verified Riesel primes too small for the standard test (n below the
/// iteration floor). Checked after normalization, before setup.
pub const KNOWN_PRIMES: &[(u64, u64)] = &[(1, 2)];

/// Known composites too small for the standard test.
pub const KNOWN_COMPOSITES: &[(u64, u64)] = &[(1, 1)];

/// Normalized test parameters. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RieselParams {
    h: u64,
    n: u64,
    orig_h: u64,
    orig_n: u64,
}

impl RieselParams {
    /// Normalize (h, n): even h is folded into the exponent.
    ///
    /// Normalization is the only validation done here. Whether the candidate
    /// fits the Lucas test (h < 2^n) is checked by the driver through
    /// [`RieselParams::testable`], after the trivial filters have had their
    /// say — a multiple-of-3 verdict beats a domain error.
    pub fn new(h: u64, n: u64) -> Result<RieselParams, TestError> {
        if h == 0 {
            return Err(TestError::InvalidArgument("h must be > 0".into()));
        }
        if n == 0 {
            return Err(TestError::InvalidArgument("n must be > 0".into()));
        }

        let (orig_h, orig_n) = (h, n);
        let shift = h.trailing_zeros() as u64;
        let (h, n) = if shift > 0 {
            tracing::debug!(
                orig_h,
                orig_n,
                new_h = h >> shift,
                new_n = n + shift,
                "folding even h into the exponent"
            );
            (h >> shift, n + shift)
        } else {
            (h, n)
        };

        Ok(RieselParams {
            h,
            n,
            orig_h,
            orig_n,
        })
    }

    /// True when the normalized candidate can be handled by this method:
    /// h < 2^n.
    pub fn testable(&self) -> bool {
        self.n >= 64 || self.h < 1u64 << self.n
    }

    pub fn h(&self) -> u64 {
        self.h
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn orig_h(&self) -> u64 {
        self.orig_h
    }

    pub fn orig_n(&self) -> u64 {
        self.orig_n
    }

    /// The candidate N = h·2^n − 1 as a big integer.
    pub fn candidate(&self) -> Integer {
        (Integer::from(self.h) << checked_u32(self.n)) - 1u32
    }

    /// The candidate expression with the user's original h and n, as used in
    /// the verdict line.
    pub fn expr(&self) -> String {
        format!("{} * 2 ^ {} - 1", self.orig_h, self.orig_n)
    }

    pub fn is_known_prime(&self) -> bool {
        KNOWN_PRIMES.contains(&(self.h, self.n))
    }

    pub fn is_known_composite(&self) -> bool {
        KNOWN_COMPOSITES.contains(&(self.h, self.n))
    }

    /// True when 3 | h·2^n − 1, decidable from h and n alone.
    pub fn multiple_of_three(&self) -> bool {
        (self.h % 3 == 1 && self.n % 2 == 0) || (self.h % 3 == 2 && self.n % 2 == 1)
    }
}
