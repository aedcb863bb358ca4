//! # Shiftadd — Modular Squaring Step for N = h·2^n − 1
//!
//! Advances U to (U² − 2) mod N without ever dividing by N. Writing
//! T = U² − 2 and splitting at the low n bits,
//!
//! J = ⌊T / 2^n⌋, K = T mod 2^n, q = ⌊J / h⌋, r = J mod h,
//!
//! the identity 2^n ≡ 1/h (mod N) gives U' ≡ q + r·2^n + K (mod N). The sum
//! can overshoot into [N, 2N) through the carry, so N is subtracted until the
//! result is in range (once is expected; the loop is defensive).
//!
//! Only bit shifts, a single division by the machine-word h, additions and a
//! comparison against N are used per step. The temporaries live inside the
//! reducer and are reused across iterations, so steady-state memory stays at
//! O(bits of N) however many squarings run.

use rug::{Assign, Integer};

use crate::{checked_u32, TestError};

/// Reusable reducer for a fixed (h, n). Construct once per test, then call
/// [`ShiftAdd::step`] n − 2 times.
pub struct ShiftAdd {
    h: Integer,
    n: u32,
    modulus: Integer,
    // scratch, reused every step
    sq: Integer,
    t: Integer,
    j: Integer,
    k: Integer,
    q: Integer,
    r: Integer,
}

impl ShiftAdd {
    /// h must be odd and positive; n is the exponent of the candidate
    /// N = h·2^n − 1.
    pub fn new(h: u64, n: u64) -> Result<ShiftAdd, TestError> {
        if h == 0 || h % 2 == 0 {
            return Err(TestError::Internal(format!(
                "shift-and-add reduction requires odd h >= 1, got {}",
                h
            )));
        }
        let n = checked_u32(n);
        let modulus = (Integer::from(h) << n) - 1u32;
        Ok(ShiftAdd {
            h: Integer::from(h),
            n,
            modulus,
            sq: Integer::new(),
            t: Integer::new(),
            j: Integer::new(),
            k: Integer::new(),
            q: Integer::new(),
            r: Integer::new(),
        })
    }

    /// The candidate N = h·2^n − 1.
    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    /// U² from the most recent [`ShiftAdd::step`], before the −2. Kept for
    /// the verification-script writer, which cross-checks each phase.
    pub fn square(&self) -> &Integer {
        &self.sq
    }

    /// Replace u with (u² − 2) mod N. Requires 0 <= u < N; the result
    /// satisfies the same bounds. Pure: identical inputs give identical
    /// outputs.
    pub fn step(&mut self, u: &mut Integer) {
        debug_assert!(*u >= 0u32 && *u < self.modulus, "step input out of range");

        // T = u^2 - 2. For u in {0, 1} this is negative; one addition of N
        // brings it back into [0, N^2) and the identity applies unchanged.
        self.sq.assign(&*u * &*u);
        self.t.assign(&self.sq - 2u32);
        if self.t < 0u32 {
            self.t += &self.modulus;
        }

        // J = T >> n, K = low n bits of T
        self.j.assign(&self.t >> self.n);
        self.k.assign(self.t.keep_bits_ref(self.n));

        // q = J / h, r = J mod h — the only division, by a machine-word value
        (&mut self.q, &mut self.r).assign(self.j.div_rem_ref(&self.h));

        // u = q + r*2^n + K, then pull back below N
        self.r <<= self.n;
        u.assign(&self.q + &self.r);
        *u += &self.k;
        while *u >= self.modulus {
            *u -= &self.modulus;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rug::ops::RemRounding;

    /// Reference step through plain big-integer arithmetic.
    fn step_ref(u: &Integer, modulus: &Integer) -> Integer {
        (Integer::from(u * u) - 2u32).rem_euc(modulus)
    }

    #[test]
    fn matches_plain_modular_arithmetic() {
        for &(h, n) in &[(1u64, 3u64), (1, 7), (3, 3), (3, 4), (5, 4), (15, 6), (63, 8)] {
            let mut engine = ShiftAdd::new(h, n).unwrap();
            let modulus = engine.modulus().clone();
            let mut u = Integer::new();
            // walk every residue for small moduli, a spread for larger ones
            let count = modulus.to_u64().unwrap_or(u64::MAX).min(2000);
            for raw in 0..count {
                u.assign(raw);
                u = u.rem_euc(&modulus);
                let expected = step_ref(&u, &modulus);
                engine.step(&mut u);
                assert_eq!(u, expected, "h={} n={} raw={}", h, n, raw);
            }
        }
    }

    #[test]
    fn result_always_in_range() {
        let mut engine = ShiftAdd::new(5, 4).unwrap();
        let modulus = engine.modulus().clone();
        let mut u = Integer::from(7u32);
        for _ in 0..200 {
            engine.step(&mut u);
            assert!(u >= 0u32 && u < modulus);
        }
    }

    #[test]
    fn zero_and_one_inputs() {
        // u = 0: result must be N - 2; u = 1: result must be N - 1
        let mut engine = ShiftAdd::new(3, 5).unwrap();
        let modulus = engine.modulus().clone();

        let mut u = Integer::from(0u32);
        engine.step(&mut u);
        assert_eq!(u, Integer::from(&modulus - 2u32));

        let mut u = Integer::from(1u32);
        engine.step(&mut u);
        assert_eq!(u, Integer::from(&modulus - 1u32));
    }

    #[test]
    fn step_is_pure() {
        let mut engine = ShiftAdd::new(3, 7).unwrap();
        let start = Integer::from(97u32);

        let mut a = start.clone();
        engine.step(&mut a);
        let mut b = start.clone();
        engine.step(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn square_accessor_reflects_last_step() {
        let mut engine = ShiftAdd::new(3, 4).unwrap();
        let mut u = Integer::from(18u32);
        engine.step(&mut u);
        assert_eq!(*engine.square(), Integer::from(18u32 * 18));
    }

    #[test]
    fn mersenne_sequence_reaches_zero() {
        // M7 = 127 with U(2) = 4: 14, 67, 42, 111, 0 — the classic
        // Lucas-Lehmer trace
        let mut engine = ShiftAdd::new(1, 7).unwrap();
        let mut u = Integer::from(4u32);
        let trace: Vec<u32> = (0..5)
            .map(|_| {
                engine.step(&mut u);
                u.to_u32().unwrap()
            })
            .collect();
        assert_eq!(trace, vec![14, 67, 42, 111, 0]);
    }

    #[test]
    fn even_h_rejected() {
        assert!(matches!(
            ShiftAdd::new(6, 4),
            Err(TestError::Internal(_))
        ));
        assert!(matches!(
            ShiftAdd::new(0, 4),
            Err(TestError::Internal(_))
        ));
    }
}
