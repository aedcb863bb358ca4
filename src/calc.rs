//! # Calc — Self-Checking Verification Script Output
//!
//! When requested, stdout carries a script for the calc(1) arbitrary-precision
//! calculator instead of the plain verdict line. The script replays the whole
//! test symbolically — candidate construction, u(2) from `lucas.cal`, every
//! square / minus-2 / mod step — and compares each phase against the values
//! this process computed, quitting loudly on the first mismatch. Running it
//! under calc independently verifies the run.
//!
//! Values we computed are emitted under the `llr_` prefix; the script's own
//! recomputations use the bare names.

use std::io::{self, Write};

use rug::Integer;

use crate::params::RieselParams;

/// Writes the verification script. Wraps any `Write` target; the driver
/// flushes through [`CalcScript::flush`] at phase boundaries.
pub struct CalcScript<W: Write> {
    out: W,
}

impl<W: Write> CalcScript<W> {
    pub fn new(out: W) -> CalcScript<W> {
        CalcScript { out }
    }

    /// Script for a candidate decided by the small-primes table.
    pub fn trivial_prime(&mut self, p: &RieselParams) -> io::Result<()> {
        self.trivial_verdict(p, true)
    }

    /// Script for a candidate decided by the small-composites table.
    pub fn trivial_composite(&mut self, p: &RieselParams) -> io::Result<()> {
        self.trivial_verdict(p, false)
    }

    fn trivial_verdict(&mut self, p: &RieselParams, prime: bool) -> io::Result<()> {
        let (h, n) = (p.h(), p.n());
        let (want, label) = if prime { (1, "prime") } else { (0, "composite") };
        writeln!(self.out, "read lucas;")?;
        writeln!(self.out, "print \"lucas( {} , {} )\",;", h, n)?;
        writeln!(self.out, "ret = lucas({} , {});", h, n)?;
        writeln!(
            self.out,
            "if (ret == {}) {{ print \"returned {}\"; }} else {{ print \"failed returning\", ret; }};",
            want, label
        )?;
        writeln!(
            self.out,
            "print \"original test: {} =\", ({});",
            p.expr(),
            p.expr()
        )?;
        writeln!(
            self.out,
            "print \"{} * 2 ^ {} - 1 is {}\";",
            h, n, label
        )?;
        self.flush()
    }

    /// Script for a candidate rejected by the multiple-of-3 filter.
    pub fn multiple_of_three(&mut self, p: &RieselParams) -> io::Result<()> {
        writeln!(
            self.out,
            "print \"{} is a multiple of 3 > 3\";",
            p.expr()
        )?;
        writeln!(self.out, "mod3 = (({}) % 3);", p.expr())?;
        writeln!(
            self.out,
            "if (mod3 == 0) {{ print \"value mod 3:\", mod3; }} else {{ print \"failed: mod 3 != 0:\", mod3 }};"
        )?;
        writeln!(self.out, "print \"{} is composite\";", p.expr())?;
        self.flush()
    }

    /// Opening phase: candidate construction and the u(2) cross-check
    /// against the calc resource file's own `gen_u0`/`gen_v1`.
    pub fn setup(&mut self, p: &RieselParams, u2: &Integer) -> io::Result<()> {
        let (h, n) = (p.h(), p.n());
        writeln!(self.out, "print \"original test {}\";", p.expr())?;
        writeln!(self.out, "print \"about to test {} * 2 ^ {} - 1\";", h, n)?;
        writeln!(self.out, "riesel_cand = {} * 2 ^ {} - 1;", h, n)?;
        writeln!(self.out, "read lucas;")?;
        writeln!(self.out, "u_term = gen_u0({}, {}, gen_v1({}, {}));", h, n, h, n)?;
        writeln!(self.out, "llr_u_term = {};", u2)?;
        writeln!(self.out, "if (u_term == llr_u_term) {{")?;
        writeln!(self.out, "  print \"u(2) value set correctly\";")?;
        writeln!(self.out, "}} else {{")?;
        writeln!(self.out, "  print \"u_term = \", u_term;")?;
        writeln!(self.out, "  print \"llr_u_term = \", llr_u_term;")?;
        writeln!(self.out, "  quit \"u(2) value not correctly set\";")?;
        writeln!(self.out, "}}")?;
        self.flush()
    }

    /// One iteration: cross-check the square, the subtraction and the
    /// reduction mod N for term i.
    pub fn term(&mut self, i: u64, square: &Integer, u: &Integer) -> io::Result<()> {
        writeln!(self.out, "print \"starting to compute u({})\";", i)?;

        writeln!(self.out, "u_term_sq = u_term^2;")?;
        writeln!(self.out, "llr_u_term_sq = {};", square)?;
        writeln!(self.out, "if (u_term_sq != llr_u_term_sq) {{")?;
        writeln!(self.out, "  print \"u_term_sq = \", u_term_sq;")?;
        writeln!(self.out, "  print \"llr_u_term_sq = \", llr_u_term_sq;")?;
        writeln!(self.out, "  quit \"bad square calculation for u({})\";", i)?;
        writeln!(self.out, "}}")?;

        writeln!(self.out, "u_term_sq_2 = u_term_sq - 2;")?;
        let square_minus_two = Integer::from(square - 2u32);
        writeln!(self.out, "llr_u_term_sq_2 = {};", square_minus_two)?;
        writeln!(self.out, "if (u_term_sq_2 != llr_u_term_sq_2) {{")?;
        writeln!(self.out, "  quit \"bad minus-2 calculation for u({})\";", i)?;
        writeln!(self.out, "}}")?;

        writeln!(self.out, "u_term = u_term_sq_2 % riesel_cand;")?;
        writeln!(self.out, "llr_u_term = {};", u)?;
        writeln!(self.out, "if (u_term != llr_u_term) {{")?;
        writeln!(self.out, "  print \"u_term = \", u_term;")?;
        writeln!(self.out, "  print \"llr_u_term = \", llr_u_term;")?;
        writeln!(self.out, "  quit \"bad mod calculation for u({})\";", i)?;
        writeln!(self.out, "}}")?;
        Ok(())
    }

    /// Closing phase: the zero test and the verdict line.
    pub fn verdict(&mut self, p: &RieselParams, prime: bool) -> io::Result<()> {
        let n = p.n();
        writeln!(self.out, "print \"u({}) =\", u_term;", n)?;
        writeln!(self.out, "print \"original test: {}\";", p.expr())?;
        if prime {
            writeln!(
                self.out,
                "if (u_term == 0) {{ print \"u({}) == 0\"; }} else {{ print \"ERROR: u({}) != 0\"; }}",
                n, n
            )?;
            writeln!(self.out, "print \"{} is prime\";", p.expr())?;
        } else {
            writeln!(
                self.out,
                "if (u_term != 0) {{ print \"u({}) != 0\"; }} else {{ print \"ERROR: u({}) == 0\"; }}",
                n, n
            )?;
            writeln!(self.out, "print \"{} is composite\";", p.expr())?;
        }
        self.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
