// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! Error types for a benchmark run.

use thiserror::Error;

/// Invalid combination of thread count and array size.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// The number of threads must be strictly positive.
    #[error("Numbers of threads and array size should be >0 (got {0} threads)")]
    NonPositiveThreads(i64),

    /// The number of elements must be strictly positive.
    #[error("Numbers of threads and array size should be >0 (got {0} elements)")]
    NonPositiveElements(i64),

    /// Each worker must receive the same number of elements.
    #[error("Numbers of threads ({threads}) is not a divisor of array size ({elements})")]
    NotDivisible {
        /// Requested number of worker threads.
        threads: usize,
        /// Requested number of elements.
        elements: usize,
    },

    /// The value doesn't fit in the address space of this platform.
    #[error("{0} is too large for this platform")]
    TooLarge(i64),
}

/// Error type for all the steps of a benchmark run.
#[derive(Error, Debug)]
pub enum BenchError {
    /// The requested run is invalid.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// No seed could be obtained from the OS entropy source.
    #[error("Cannot read a seed from the OS entropy source: {0}")]
    Entropy(String),

    /// The input array couldn't be allocated.
    #[error("Cannot allocate an array of {len} values: {source}")]
    Allocation {
        /// Requested number of values.
        len: usize,
        /// Underlying allocation error.
        #[source]
        source: std::collections::TryReserveError,
    },

    /// The number of online CPUs couldn't be determined.
    #[error("Cannot query the number of online CPUs: {0}")]
    CpuCount(#[source] std::io::Error),

    /// The CPU affinity of a thread couldn't be set.
    #[error("Failed to set CPU affinity for the {thread} thread: {source}")]
    Affinity {
        /// Name of the thread.
        thread: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A mandatory real-time priority couldn't be applied.
    #[error("Failed to set real-time priority for the {thread} thread: {source}")]
    Priority {
        /// Name of the thread.
        thread: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A clock couldn't be read.
    #[error("Failed to read the {clock} clock: {source}")]
    Clock {
        /// Name of the clock.
        clock: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread couldn't be spawned.
    #[error("Failed to spawn worker thread #{id}: {source}")]
    Spawn {
        /// Index of the worker.
        id: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked before reporting its partial sum.
    #[error("Worker thread #{id} panicked")]
    WorkerPanicked {
        /// Index of the worker.
        id: usize,
    },
}

impl BenchError {
    /// Process exit status to report this error with.
    ///
    /// Each error kind gets its own status, so that scripts driving the
    /// benchmark can tell a bad invocation from a misconfigured machine.
    pub fn exit_code(&self) -> u8 {
        match self {
            BenchError::Usage(_) => 2,
            BenchError::Entropy(_) => 3,
            BenchError::CpuCount(_) | BenchError::Affinity { .. } => 4,
            BenchError::Priority { .. } => 5,
            BenchError::Allocation { .. } => 6,
            BenchError::Clock { .. }
            | BenchError::Spawn { .. }
            | BenchError::WorkerPanicked { .. } => 1,
        }
    }
}

/// Convenience type alias for [`std::result::Result`] with [`BenchError`].
pub type Result<T> = std::result::Result<T, BenchError>;
