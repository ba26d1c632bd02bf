// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod error;
mod input;
mod macros;
mod pool;
mod range;
mod report;
mod sched;
mod timing;
mod workload;

pub use config::BenchConfig;
pub use error::{BenchError, Result, UsageError};
pub use input::{InputArray, SeedSource, MAX_VALUE};
pub use pool::{MergeStrategy, PoolOutcome, SharedAccumulator, WorkerPool, WorkerReport};
pub use range::{partition, Slice};
pub use report::{Report, Significant};
pub use sched::{
    online_cpus, AffinityPolicy, PriorityOutcome, PriorityPolicy, Scheduler, SchedulingConfig,
};
pub use timing::{Clock, Timestamp};
pub use workload::{
    element_term, reduce_slice, ChaChaExponents, ExponentSource, ExponentStream, FixedExponent,
    SplitExponents, MAX_EXPONENT,
};

use macros::log_warn;

/// Runs the whole benchmark: seeds and fills the input, configures the
/// scheduling of the calling thread, then reduces the input on the worker
/// pool and summarizes the timings.
///
/// The calling thread keeps the affinity and priority applied here after this
/// function returns.
pub fn run(config: &BenchConfig) -> Result<Report> {
    let seed = config.seed.resolve()?;
    let input = InputArray::generate(config.num_elements.get(), seed)?;

    let scheduler = Scheduler::prepare(config.scheduling)?;
    let priority = scheduler.apply_to_current_thread("main")?;
    warn_main_priority(&priority);

    let pool = WorkerPool::new(config.num_threads, &scheduler, config.merge);
    let outcome = pool.run(&input, &SplitExponents::new(seed))?;
    warn_worker_priority(&outcome);

    Ok(Report::new(input.len(), &outcome))
}

/// Warns if the main thread runs without the requested real-time priority.
/// Returns whether a warning was emitted.
fn warn_main_priority(outcome: &PriorityOutcome) -> bool {
    match outcome {
        PriorityOutcome::Denied(_e) => {
            log_warn!(
                "Running without real-time priority ({_e}): timings may include scheduling noise"
            );
            true
        }
        PriorityOutcome::Unsupported => {
            log_warn!("Real-time priority is not implemented on this platform");
            true
        }
        PriorityOutcome::Unchanged | PriorityOutcome::Elevated(_) => false,
    }
}

/// Warns if some workers ran without the requested real-time priority.
/// Returns whether a warning was emitted.
fn warn_worker_priority(outcome: &PoolOutcome) -> bool {
    let denied = outcome.num_denied_priority();
    if denied > 0 {
        log_warn!(
            "{denied} of {} worker threads ran without real-time priority",
            outcome.workers.len()
        );
    }
    denied > 0
}

#[cfg(test)]
mod test {
    use super::*;

    fn quiet_config(num_threads: i64, num_elements: i64, seed: u64) -> BenchConfig {
        BenchConfig {
            seed: SeedSource::Fixed(seed),
            scheduling: SchedulingConfig::none(),
            merge: MergeStrategy::Collect,
            ..BenchConfig::new(num_threads, num_elements).unwrap()
        }
    }

    #[test]
    fn test_run_reports_sizes() {
        for (num_threads, num_elements) in [(1, 1), (4, 8), (8, 8), (3, 999), (16, 4096)] {
            let report = run(&quiet_config(num_threads, num_elements, 1)).unwrap();
            assert_eq!(report.num_elements, num_elements as usize);
            assert_eq!(report.num_threads, num_threads as usize);
            assert!(report.result.is_finite());
            assert!(report.result > 0.0);
            assert!(report.avg_thread_millis >= 0.0);
            assert!(report.avg_thread_millis <= report.total_millis * num_threads as f64);
        }
    }

    #[test]
    fn test_run_is_reproducible_with_fixed_seed() {
        let a = run(&quiet_config(4, 4_000, 99)).unwrap();
        let b = run(&quiet_config(4, 4_000, 99)).unwrap();
        assert_eq!(a.result, b.result);
    }

    #[test]
    fn test_run_with_entropy_seed() {
        let config = BenchConfig {
            scheduling: SchedulingConfig::none(),
            ..BenchConfig::new(2, 100).unwrap()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.num_elements, 100);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_run_too_large_input() {
        let result = run(&quiet_config(1, i64::MAX, 1));
        assert!(matches!(result, Err(BenchError::Allocation { .. })));
    }

    fn worker_with(id: usize, priority: PriorityOutcome) -> WorkerReport {
        WorkerReport {
            id,
            num_items: 1,
            partial: 1.0,
            start: Timestamp::default(),
            end: Timestamp::default(),
            priority,
        }
    }

    #[test]
    fn test_warn_main_priority() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(warn_main_priority(&PriorityOutcome::Denied(denied)));
        assert!(warn_main_priority(&PriorityOutcome::Unsupported));
        assert!(!warn_main_priority(&PriorityOutcome::Unchanged));
        assert!(!warn_main_priority(&PriorityOutcome::Elevated(99)));
    }

    #[test]
    fn test_warn_worker_priority() {
        let denied = || {
            PriorityOutcome::Denied(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        };
        let outcome = PoolOutcome {
            total: 4.0,
            workers: vec![
                worker_with(0, PriorityOutcome::Elevated(99)),
                worker_with(1, denied()),
                worker_with(2, PriorityOutcome::Unsupported),
                worker_with(3, denied()),
            ],
            wall_start: Timestamp::default(),
            wall_end: Timestamp::default(),
        };
        assert_eq!(outcome.num_denied_priority(), 3);
        assert!(warn_worker_priority(&outcome));

        let outcome = PoolOutcome {
            total: 2.0,
            workers: vec![
                worker_with(0, PriorityOutcome::Unchanged),
                worker_with(1, PriorityOutcome::Elevated(99)),
            ],
            wall_start: Timestamp::default(),
            wall_end: Timestamp::default(),
        };
        assert_eq!(outcome.num_denied_priority(), 0);
        assert!(!warn_worker_priority(&outcome));
    }

    #[test]
    fn test_run_with_default_scheduling() {
        // Real-time priority may be denied, but that's not an error by default.
        let config = BenchConfig {
            seed: SeedSource::Fixed(5),
            ..BenchConfig::new(2, 64).unwrap()
        };
        // Run on a dedicated thread, which keeps the resulting scheduling.
        let report = std::thread::spawn(move || run(&config))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(report.num_threads, 2);
    }
}
