// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! Validated configuration of a benchmark run.

use crate::error::UsageError;
use crate::input::SeedSource;
use crate::pool::MergeStrategy;
use crate::sched::SchedulingConfig;
use std::num::NonZeroUsize;

/// Configuration of a benchmark run.
///
/// ```
/// # use parabench::{BenchConfig, MergeStrategy, SchedulingConfig, SeedSource};
/// let config = BenchConfig {
///     seed: SeedSource::Fixed(42),
///     scheduling: SchedulingConfig::none(),
///     merge: MergeStrategy::Collect,
///     ..BenchConfig::new(4, 1_000).unwrap()
/// };
/// assert_eq!(config.slice_len(), 250);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BenchConfig {
    /// Number of worker threads to spawn.
    pub num_threads: NonZeroUsize,
    /// Number of elements in the input array.
    pub num_elements: NonZeroUsize,
    /// Source of the master seed.
    pub seed: SeedSource,
    /// Affinity and priority of the threads.
    pub scheduling: SchedulingConfig,
    /// Strategy to merge the partial sums.
    pub merge: MergeStrategy,
}

impl BenchConfig {
    /// Validates the thread count and array size, and fills the other fields
    /// with their defaults: an entropy seed, the default scheduling and a
    /// shared-lock merge.
    ///
    /// Both values must be strictly positive, and the number of threads must
    /// divide the number of elements.
    pub fn new(num_threads: i64, num_elements: i64) -> Result<Self, UsageError> {
        if num_threads <= 0 {
            return Err(UsageError::NonPositiveThreads(num_threads));
        }
        if num_elements <= 0 {
            return Err(UsageError::NonPositiveElements(num_elements));
        }
        let threads = to_non_zero(num_threads)?;
        let elements = to_non_zero(num_elements)?;
        if elements.get() % threads.get() != 0 {
            return Err(UsageError::NotDivisible {
                threads: threads.get(),
                elements: elements.get(),
            });
        }

        Ok(Self {
            num_threads: threads,
            num_elements: elements,
            seed: SeedSource::Entropy,
            scheduling: SchedulingConfig::default(),
            merge: MergeStrategy::SharedLock,
        })
    }

    /// Returns the number of elements processed by each worker.
    pub fn slice_len(&self) -> usize {
        self.num_elements.get() / self.num_threads.get()
    }
}

fn to_non_zero(value: i64) -> Result<NonZeroUsize, UsageError> {
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or(UsageError::TooLarge(value))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = BenchConfig::new(4, 8).unwrap();
        assert_eq!(config.num_threads.get(), 4);
        assert_eq!(config.num_elements.get(), 8);
        assert_eq!(config.slice_len(), 2);
        assert_eq!(config.seed, SeedSource::Entropy);
        assert_eq!(config.scheduling, SchedulingConfig::default());
        assert_eq!(config.merge, MergeStrategy::SharedLock);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(BenchConfig::new(1, 1).unwrap().slice_len(), 1);
        assert_eq!(BenchConfig::new(1, 10).unwrap().slice_len(), 10);
        assert_eq!(BenchConfig::new(10, 10).unwrap().slice_len(), 1);
    }

    #[test]
    fn test_zero_threads() {
        assert_eq!(
            BenchConfig::new(0, 10),
            Err(UsageError::NonPositiveThreads(0))
        );
        assert_eq!(
            BenchConfig::new(-2, 10),
            Err(UsageError::NonPositiveThreads(-2))
        );
    }

    #[test]
    fn test_zero_elements() {
        assert_eq!(
            BenchConfig::new(2, 0),
            Err(UsageError::NonPositiveElements(0))
        );
        assert_eq!(
            BenchConfig::new(2, -8),
            Err(UsageError::NonPositiveElements(-8))
        );
    }

    #[test]
    fn test_not_divisible() {
        assert_eq!(
            BenchConfig::new(3, 10),
            Err(UsageError::NotDivisible {
                threads: 3,
                elements: 10
            })
        );
        assert_eq!(
            BenchConfig::new(11, 10),
            Err(UsageError::NotDivisible {
                threads: 11,
                elements: 10
            })
        );
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_too_large() {
        assert_eq!(
            BenchConfig::new(1, i64::MAX),
            Err(UsageError::TooLarge(i64::MAX))
        );
    }
}
