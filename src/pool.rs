// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! A fixed pool of worker threads, one per slice of the input.

use crate::error::{BenchError, Result};
use crate::input::InputArray;
use crate::macros::{log_debug, log_error};
use crate::range::Slice;
use crate::sched::{PriorityOutcome, Scheduler};
use crate::timing::{Clock, Timestamp};
use crate::workload::{reduce_slice, ExponentSource};
use crossbeam_utils::CachePadded;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Strategy to merge the partial sums of the worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Each worker adds its partial sum into a [`SharedAccumulator`], under a
    /// lock.
    SharedLock,
    /// Each worker returns its partial sum when joined, and the main thread
    /// adds them up in worker order.
    Collect,
}

/// A floating-point total that worker threads add into under a lock.
pub struct SharedAccumulator {
    total: CachePadded<Mutex<f64>>,
}

impl SharedAccumulator {
    /// Creates an accumulator initialized to zero.
    pub fn new() -> Self {
        Self {
            total: CachePadded::new(Mutex::new(0.0)),
        }
    }

    /// Adds a partial sum to the total.
    pub fn add(&self, partial: f64) {
        // The critical section can't panic, so a poisoned lock still holds a
        // consistent total.
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) += partial;
    }

    /// Consumes the accumulator and returns the total.
    pub fn into_inner(self) -> f64 {
        CachePadded::into_inner(self.total)
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit of work of one worker thread.
struct WorkItem<'a> {
    /// Position of the slice in the input.
    slice: Slice,
    /// Read-only view of the slice.
    input: &'a [f64],
    /// Accumulator to merge into, under [`MergeStrategy::SharedLock`].
    accumulator: Option<&'a SharedAccumulator>,
}

impl WorkItem<'_> {
    /// Main function run by a worker thread.
    fn run(self, scheduler: &Scheduler, exponents: &impl ExponentSource) -> Result<WorkerReport> {
        let id = self.slice.id;
        let priority = scheduler.apply_to_current_thread(&format!("worker #{id}"))?;
        let mut stream = exponents.stream(id);

        let start = Timestamp::now(Clock::ThreadCpu)?;
        let partial = reduce_slice(self.input, &mut stream);
        let end = Timestamp::now(Clock::ThreadCpu)?;

        if let Some(accumulator) = self.accumulator {
            accumulator.add(partial);
        }

        Ok(WorkerReport {
            id,
            num_items: self.input.len(),
            partial,
            start,
            end,
            priority,
        })
    }
}

/// What a worker thread reports once joined.
#[derive(Debug)]
pub struct WorkerReport {
    /// Index of the worker.
    pub id: usize,
    /// Number of elements reduced by the worker.
    pub num_items: usize,
    /// Partial sum over the worker's slice.
    pub partial: f64,
    /// CPU time of the worker when the reduction started.
    pub start: Timestamp,
    /// CPU time of the worker when the reduction ended.
    pub end: Timestamp,
    /// Outcome of elevating the worker's priority.
    pub priority: PriorityOutcome,
}

impl WorkerReport {
    /// Returns the CPU time spent on the reduction, in milliseconds.
    pub fn cpu_millis(&self) -> f64 {
        self.end.millis_since(&self.start)
    }
}

/// Result of running the pool over an input.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Sum of all the partial sums.
    pub total: f64,
    /// Reports of all the workers, ordered by index.
    pub workers: Vec<WorkerReport>,
    /// Wall-clock time before the first worker was spawned.
    pub wall_start: Timestamp,
    /// Wall-clock time after the last worker was joined.
    pub wall_end: Timestamp,
}

impl PoolOutcome {
    /// Returns the wall-clock time from the first spawn to the last join, in
    /// milliseconds.
    pub fn wall_millis(&self) -> f64 {
        self.wall_end.millis_since(&self.wall_start)
    }

    /// Returns the mean CPU time of the workers, in milliseconds.
    pub fn avg_thread_millis(&self) -> f64 {
        let sum = self.workers.iter().map(WorkerReport::cpu_millis).sum::<f64>();
        sum / self.workers.len() as f64
    }

    /// Returns the number of workers that ran without a real-time priority,
    /// although one was requested.
    pub fn num_denied_priority(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| {
                matches!(
                    w.priority,
                    PriorityOutcome::Denied(_) | PriorityOutcome::Unsupported
                )
            })
            .count()
    }
}

/// A pool that spawns one worker thread per slice of the input, and joins them
/// all before returning.
pub struct WorkerPool<'a> {
    /// Number of worker threads to spawn.
    num_threads: NonZeroUsize,
    /// Scheduling parameters applied by each worker.
    scheduler: &'a Scheduler,
    /// Strategy to merge the partial sums.
    merge: MergeStrategy,
}

impl<'a> WorkerPool<'a> {
    /// Creates a pool with the given parameters.
    pub fn new(num_threads: NonZeroUsize, scheduler: &'a Scheduler, merge: MergeStrategy) -> Self {
        Self {
            num_threads,
            scheduler,
            merge,
        }
    }

    /// Reduces the input in parallel.
    ///
    /// Every spawned worker is joined before the total is read, including when
    /// one of them fails.
    pub fn run(&self, input: &InputArray, exponents: &impl ExponentSource) -> Result<PoolOutcome> {
        let slices = input.partition(self.num_threads.get());
        let accumulator = SharedAccumulator::new();
        let shared = match self.merge {
            MergeStrategy::SharedLock => Some(&accumulator),
            MergeStrategy::Collect => None,
        };

        let wall_start = Timestamp::now(Clock::Monotonic)?;
        let results = std::thread::scope(|scope| -> Result<Vec<Result<WorkerReport>>> {
            let mut handles = Vec::with_capacity(slices.len());
            for slice in &slices {
                let item = WorkItem {
                    slice: *slice,
                    input: input.slice(slice),
                    accumulator: shared,
                };
                let scheduler = self.scheduler;
                let handle = std::thread::Builder::new()
                    .name(format!("worker-{}", slice.id))
                    .spawn_scoped(scope, move || item.run(scheduler, exponents))
                    .map_err(|source| BenchError::Spawn {
                        id: slice.id,
                        source,
                    })?;
                handles.push(handle);
            }
            log_debug!("[main thread] Spawned {} worker threads", handles.len());

            let results = handles
                .into_iter()
                .enumerate()
                .map(|(id, handle)| match handle.join() {
                    Ok(result) => result,
                    Err(_) => {
                        log_error!("[main thread] Worker thread #{id} panicked");
                        Err(BenchError::WorkerPanicked { id })
                    }
                })
                .collect();
            log_debug!("[main thread] Joined worker threads");
            Ok(results)
        })?;
        let wall_end = Timestamp::now(Clock::Monotonic)?;

        let workers = results.into_iter().collect::<Result<Vec<WorkerReport>>>()?;
        let total = match self.merge {
            MergeStrategy::SharedLock => accumulator.into_inner(),
            MergeStrategy::Collect => workers.iter().map(|w| w.partial).sum(),
        };

        Ok(PoolOutcome {
            total,
            workers,
            wall_start,
            wall_end,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sched::SchedulingConfig;
    use crate::workload::{element_term, FixedExponent, SplitExponents};

    /// Exponent source whose stream panics for one worker.
    struct PanickingExponents {
        worker_id: usize,
    }

    impl ExponentSource for PanickingExponents {
        type Stream = FixedExponent;

        fn stream(&self, worker_id: usize) -> FixedExponent {
            if worker_id == self.worker_id {
                panic!("exponent panic");
            }
            FixedExponent(1)
        }
    }

    fn run_pool(
        num_threads: usize,
        merge: MergeStrategy,
        input: &InputArray,
        exponents: &impl ExponentSource,
    ) -> Result<PoolOutcome> {
        let scheduler = Scheduler::prepare(SchedulingConfig::none()).unwrap();
        let pool = WorkerPool::new(
            NonZeroUsize::try_from(num_threads).unwrap(),
            &scheduler,
            merge,
        );
        pool.run(input, exponents)
    }

    fn serial_sum(input: &InputArray, exponent: i32) -> f64 {
        input
            .values()
            .iter()
            .map(|&x| element_term(x, exponent))
            .sum()
    }

    fn assert_close(a: f64, b: f64) {
        assert!(
            (a - b).abs() <= 1e-12 * a.abs().max(b.abs()),
            "{a} is not close to {b}"
        );
    }

    macro_rules! expand_tests {
        ( $merge:expr, ) => {};
        ( $merge:expr, $case:ident, $( $others:tt )* ) => {
            #[test]
            fn $case() {
                $crate::pool::test::$case($merge);
            }

            expand_tests!($merge, $($others)*);
        };
    }

    macro_rules! merge_tests {
        ( $mod:ident, $merge:expr ) => {
            mod $mod {
                use super::*;

                expand_tests!(
                    $merge,
                    test_four_threads_eight_elements,
                    test_thread_count_invariance,
                    test_one_element_per_thread,
                    test_worker_reports,
                    test_timing_sanity,
                    test_worker_panic,
                );
            }
        };
    }

    merge_tests!(shared_lock, MergeStrategy::SharedLock);
    merge_tests!(collect, MergeStrategy::Collect);

    fn test_four_threads_eight_elements(merge: MergeStrategy) {
        let input = InputArray::from(vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0]);
        let outcome = run_pool(4, merge, &input, &FixedExponent(3)).unwrap();

        assert_eq!(outcome.workers.len(), 4);
        for worker in &outcome.workers {
            assert_eq!(worker.num_items, 2);
        }
        assert_close(outcome.total, serial_sum(&input, 3));
    }

    fn test_thread_count_invariance(merge: MergeStrategy) {
        let input = InputArray::generate(720, 42).unwrap();
        let expected = serial_sum(&input, 2);
        for num_threads in [1, 2, 3, 4, 5, 6, 8, 9, 10, 12, 15, 16, 24, 720] {
            let outcome = run_pool(num_threads, merge, &input, &FixedExponent(2)).unwrap();
            assert_close(outcome.total, expected);
        }
    }

    fn test_one_element_per_thread(merge: MergeStrategy) {
        let input = InputArray::generate(32, 7).unwrap();
        let outcome = run_pool(32, merge, &input, &FixedExponent(1)).unwrap();
        assert_eq!(outcome.workers.len(), 32);
        assert!(outcome.workers.iter().all(|w| w.num_items == 1));
        assert_close(outcome.total, serial_sum(&input, 1));
    }

    fn test_worker_reports(merge: MergeStrategy) {
        let input = InputArray::generate(1_000, 3).unwrap();
        let outcome = run_pool(10, merge, &input, &SplitExponents::new(3)).unwrap();

        assert_eq!(outcome.workers.len(), 10);
        for (i, worker) in outcome.workers.iter().enumerate() {
            assert_eq!(worker.id, i);
            assert_eq!(worker.num_items, 100);
            assert!(matches!(worker.priority, PriorityOutcome::Unchanged));
        }
        assert_eq!(outcome.num_denied_priority(), 0);
        let partials = outcome.workers.iter().map(|w| w.partial).sum::<f64>();
        assert_close(outcome.total, partials);
    }

    fn test_timing_sanity(merge: MergeStrategy) {
        let input = InputArray::generate(100_000, 5).unwrap();
        let num_threads = 4;
        let outcome = run_pool(num_threads, merge, &input, &SplitExponents::new(5)).unwrap();

        for worker in &outcome.workers {
            assert!(worker.cpu_millis() >= 0.0);
        }
        let avg = outcome.avg_thread_millis();
        assert!(avg >= 0.0);
        assert!(avg <= outcome.wall_millis() * num_threads as f64);
    }

    fn test_worker_panic(merge: MergeStrategy) {
        let input = InputArray::generate(16, 1).unwrap();
        let result = run_pool(4, merge, &input, &PanickingExponents { worker_id: 2 });
        assert!(matches!(result, Err(BenchError::WorkerPanicked { id: 2 })));
    }

    #[test]
    fn test_collect_is_reproducible() {
        let input = InputArray::generate(4_096, 11).unwrap();
        let a = run_pool(8, MergeStrategy::Collect, &input, &SplitExponents::new(11)).unwrap();
        let b = run_pool(8, MergeStrategy::Collect, &input, &SplitExponents::new(11)).unwrap();
        assert_eq!(a.total, b.total);
    }

    #[test]
    fn test_shared_accumulator() {
        let accumulator = SharedAccumulator::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let accumulator = &accumulator;
                scope.spawn(move || accumulator.add(i as f64));
            }
        });
        assert_eq!(accumulator.into_inner(), 28.0);
    }
}
