// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! Summary of a benchmark run.

use crate::pool::PoolOutcome;
use std::fmt::{self, Display, Formatter};

/// Number of significant digits printed for floating-point values.
const PRECISION: usize = 6;

/// Summary of a run, printed as five lines.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Number of elements in the input.
    pub num_elements: usize,
    /// Number of worker threads.
    pub num_threads: usize,
    /// Final value of the accumulator.
    pub result: f64,
    /// Mean CPU time of the worker threads, in milliseconds.
    pub avg_thread_millis: f64,
    /// Wall-clock time from the first spawn to the last join, in milliseconds.
    pub total_millis: f64,
}

impl Report {
    /// Summarizes the outcome of a pool run over `num_elements` elements.
    pub fn new(num_elements: usize, outcome: &PoolOutcome) -> Self {
        Self {
            num_elements,
            num_threads: outcome.workers.len(),
            result: outcome.total,
            avg_thread_millis: outcome.avg_thread_millis(),
            total_millis: outcome.wall_millis(),
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Numbers: {}", self.num_elements)?;
        writeln!(f, "Threads: {}", self.num_threads)?;
        writeln!(f, "Result: {}", Significant(self.result))?;
        writeln!(
            f,
            "Average thread time, ms: {}",
            Significant(self.avg_thread_millis)
        )?;
        write!(f, "Calculation took, ms: {}", Significant(self.total_millis))
    }
}

/// Displays a float with 6 significant digits and no trailing zeros, in
/// scientific notation for exponents below -4 or from 6 onwards (as `printf`'s
/// `%g` does).
#[derive(Clone, Copy, Debug)]
pub struct Significant(pub f64);

impl Display for Significant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if x == 0.0 {
            return f.write_str(if x.is_sign_negative() { "-0" } else { "0" });
        }
        if x.is_nan() {
            return f.write_str("nan");
        }
        if x.is_infinite() {
            return f.write_str(if x < 0.0 { "-inf" } else { "inf" });
        }

        // Rounding to the target precision can bump the exponent (e.g. 999999.7
        // becomes 1e6), so the exponent is read back from the rounded value.
        let scientific = format!("{:.*e}", PRECISION - 1, x);
        let (mantissa, exponent) = scientific.split_once('e').ok_or(fmt::Error)?;
        let exponent = exponent.parse::<i32>().map_err(|_| fmt::Error)?;

        if exponent < -4 || exponent >= PRECISION as i32 {
            let sign = if exponent < 0 { '-' } else { '+' };
            write!(
                f,
                "{}e{sign}{:02}",
                trim_fraction(mantissa),
                exponent.unsigned_abs()
            )
        } else {
            let decimals = (PRECISION as i32 - 1 - exponent) as usize;
            let fixed = format!("{:.*}", decimals, x);
            f.write_str(trim_fraction(&fixed))
        }
    }
}

/// Removes trailing zeros after the decimal point, and the point itself if
/// nothing remains after it.
fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
