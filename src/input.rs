// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! Seeding and generation of the randomized input array.

use crate::error::{BenchError, Result};
use crate::macros::log_debug;
use crate::range::{partition, Slice};
use rand::rngs::OsRng;
use rand::{Rng, SeedableRng, TryRngCore};
use rand_chacha::ChaCha12Rng;

/// Upper bound (exclusive) of the generated values.
pub const MAX_VALUE: f64 = 5.0;

/// Where the master seed of a run comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedSource {
    /// Read the seed from the OS entropy source.
    Entropy,
    /// Use the given seed, to reproduce a run.
    Fixed(u64),
}

impl SeedSource {
    /// Resolves the master seed.
    ///
    /// Fails if the OS entropy source is unavailable.
    pub fn resolve(self) -> Result<u64> {
        match self {
            SeedSource::Entropy => {
                let seed = OsRng
                    .try_next_u64()
                    .map_err(|e| BenchError::Entropy(e.to_string()))?;
                log_debug!("Read seed {seed:#018x} from the OS entropy source");
                Ok(seed)
            }
            SeedSource::Fixed(seed) => Ok(seed),
        }
    }
}

/// The owned input of a run: a flat array of values in `[0, 5)`.
///
/// The array is never mutated after generation, so worker threads can borrow
/// disjoint slices of it without synchronization.
pub struct InputArray {
    values: Box<[f64]>,
}

impl InputArray {
    /// Fills an array of `len` values drawn uniformly in `[0, 5)` from a
    /// generator seeded with `seed`.
    ///
    /// The values are drawn from stream 0 of a ChaCha12 generator; the other
    /// streams of the same seed are reserved for the worker threads.
    ///
    /// Fails if the array can't be allocated.
    pub fn generate(len: usize, seed: u64) -> Result<Self> {
        let mut values = Vec::new();
        values
            .try_reserve_exact(len)
            .map_err(|source| BenchError::Allocation { len, source })?;

        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        values.extend((0..len).map(|_| rng.random_range(0.0..MAX_VALUE)));
        log_debug!("Generated {len} input values");
        Ok(Self {
            values: values.into_boxed_slice(),
        })
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns all the values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the read-only view of the given slice.
    pub fn slice(&self, slice: &Slice) -> &[f64] {
        &self.values[slice.range()]
    }

    /// Splits the array into one slice per worker thread.
    pub fn partition(&self, num_threads: usize) -> Vec<Slice> {
        partition(self.values.len(), num_threads)
    }
}

impl From<Vec<f64>> for InputArray {
    fn from(values: Vec<f64>) -> Self {
        Self {
            values: values.into_boxed_slice(),
        }
    }
}
