// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! The per-element workload reduced by each worker thread.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

/// Exclusive upper bound of the random exponents.
pub const MAX_EXPONENT: i32 = 8;

/// Power of two that each element is scaled by in the last term.
const SCALE_EXPONENT: i32 = 2;

/// A factory of per-worker streams of exponents.
///
/// Each worker thread obtains its own [`ExponentStream`] via
/// [`stream()`](Self::stream), so that no generator state is shared between
/// threads.
pub trait ExponentSource: Sync {
    /// Type of stream handed to each worker.
    type Stream: ExponentStream;

    /// Returns the stream for the given worker.
    fn stream(&self, worker_id: usize) -> Self::Stream;
}

/// A stream of integer exponents, owned by one worker thread.
pub trait ExponentStream {
    /// Draws the next exponent.
    fn next_exponent(&mut self) -> i32;
}

/// Exponents drawn uniformly in `0..MAX_EXPONENT`, from independent ChaCha12
/// streams split off a master seed.
///
/// Worker `i` uses stream `i + 1` of the seed; stream 0 is the one that
/// generates the input array.
#[derive(Clone, Copy, Debug)]
pub struct SplitExponents {
    seed: u64,
}

impl SplitExponents {
    /// Creates a source of exponent streams derived from the given seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl ExponentSource for SplitExponents {
    type Stream = ChaChaExponents;

    fn stream(&self, worker_id: usize) -> ChaChaExponents {
        let mut rng = ChaCha12Rng::seed_from_u64(self.seed);
        rng.set_stream(worker_id as u64 + 1);
        ChaChaExponents { rng }
    }
}

/// A stream of random exponents for one worker.
pub struct ChaChaExponents {
    rng: ChaCha12Rng,
}

impl ExponentStream for ChaChaExponents {
    #[inline(always)]
    fn next_exponent(&mut self) -> i32 {
        self.rng.random_range(0..MAX_EXPONENT)
    }
}

/// A constant exponent, which makes the reduction deterministic given the
/// input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedExponent(pub i32);

impl ExponentSource for FixedExponent {
    type Stream = FixedExponent;

    fn stream(&self, _worker_id: usize) -> FixedExponent {
        *self
    }
}

impl ExponentStream for FixedExponent {
    #[inline(always)]
    fn next_exponent(&mut self) -> i32 {
        self.0
    }
}

/// Computes `exp(x) + x^exponent + x * 2^2`.
#[inline(always)]
pub fn element_term(x: f64, exponent: i32) -> f64 {
    x.exp() + x.powi(exponent) + ldexp(x, SCALE_EXPONENT)
}

/// Multiplies `x` by 2 to the power `exp`.
#[inline(always)]
fn ldexp(x: f64, exp: i32) -> f64 {
    x * 2f64.powi(exp)
}

/// Sequentially reduces a slice, drawing one exponent per element.
pub fn reduce_slice(slice: &[f64], exponents: &mut impl ExponentStream) -> f64 {
    slice
        .iter()
        .fold(0.0, |acc, &x| acc + element_term(x, exponents.next_exponent()))
}
