// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! CPU affinity and real-time priority of the benchmark threads.
//!
//! Pinning every thread to all the online cores and running it under the
//! `SCHED_FIFO` policy keeps unrelated work from preempting the workers, so
//! that the measured times reflect the computation.

#![allow(unsafe_code)]

use crate::error::{BenchError, Result};
use crate::macros::{log_debug, log_warn};
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_getaffinity, sched_setaffinity, CpuSet},
    unistd::{sysconf, Pid, SysconfVar},
};

/// Policy to set the CPU affinity of the benchmark threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AffinityPolicy {
    /// Leave the affinity of the threads unchanged.
    No,
    /// Allow each thread to run on all the online CPUs. Failing to do so aborts
    /// the run, except on platforms where this isn't implemented, where a
    /// warning is logged instead.
    AllCores,
}

/// Policy to set the scheduling priority of the benchmark threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityPolicy {
    /// Leave the scheduling policy of the threads unchanged.
    No,
    /// Run each thread at the maximum `SCHED_FIFO` priority if the process is
    /// permitted to. Otherwise, the thread keeps its priority and the failure
    /// is reported as a [`PriorityOutcome::Denied`].
    RealtimeIfPermitted,
    /// Run each thread at the maximum `SCHED_FIFO` priority, aborting the run
    /// if that isn't permitted.
    Realtime,
}

/// Scheduling configuration of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Policy to set the CPU affinity of the threads.
    pub affinity: AffinityPolicy,
    /// Policy to set the scheduling priority of the threads.
    pub priority: PriorityPolicy,
}

impl SchedulingConfig {
    /// A configuration that leaves the OS scheduling untouched.
    pub fn none() -> Self {
        Self {
            affinity: AffinityPolicy::No,
            priority: PriorityPolicy::No,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            affinity: AffinityPolicy::AllCores,
            priority: PriorityPolicy::RealtimeIfPermitted,
        }
    }
}

/// Result of elevating the priority of a thread.
#[derive(Debug)]
pub enum PriorityOutcome {
    /// The priority wasn't changed, as configured.
    Unchanged,
    /// The thread now runs under `SCHED_FIFO` with the given priority.
    Elevated(i32),
    /// The OS refused to elevate the priority.
    Denied(std::io::Error),
    /// Real-time priorities aren't implemented on this platform.
    Unsupported,
}

impl PriorityOutcome {
    /// Returns whether the thread runs at a real-time priority.
    pub fn is_elevated(&self) -> bool {
        matches!(self, PriorityOutcome::Elevated(_))
    }
}

/// Scheduling parameters resolved once on the main thread, then applied to it
/// and to every worker thread.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulingConfig,
    /// Mask spanning all the online CPUs.
    #[cfg(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))]
    cpu_set: Option<CpuSet>,
    /// Maximum `SCHED_FIFO` priority, if it could be queried.
    #[cfg(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))]
    priority: Option<i32>,
}

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
impl Scheduler {
    /// Resolves the affinity mask and priority level for the given
    /// configuration.
    pub fn prepare(config: SchedulingConfig) -> Result<Self> {
        let cpu_set = match config.affinity {
            AffinityPolicy::No => None,
            AffinityPolicy::AllCores => {
                let num_cpus = online_cpus()?;
                let cpu_set = all_cores(num_cpus)?;
                log_debug!("Prepared an affinity mask spanning {num_cpus} online CPUs");
                Some(cpu_set)
            }
        };

        let priority = match config.priority {
            PriorityPolicy::No => None,
            PriorityPolicy::RealtimeIfPermitted => match max_fifo_priority() {
                Ok(priority) => Some(priority),
                Err(_e) => {
                    log_warn!("Cannot query the maximum real-time priority: {_e}");
                    None
                }
            },
            PriorityPolicy::Realtime => {
                Some(max_fifo_priority().map_err(|source| BenchError::Priority {
                    thread: "main".to_owned(),
                    source,
                })?)
            }
        };

        Ok(Self {
            config,
            cpu_set,
            priority,
        })
    }

    /// Returns the number of CPUs in the affinity mask, if one is applied.
    pub fn num_cpus(&self) -> Option<usize> {
        self.cpu_set.map(|cpu_set| {
            (0..CpuSet::count())
                .filter(|&id| cpu_set.is_set(id).unwrap_or(false))
                .count()
        })
    }

    /// Applies the affinity mask and priority to the calling thread.
    ///
    /// A failure to set the affinity is always an error. A failure to set the
    /// priority is an error only under [`PriorityPolicy::Realtime`].
    pub fn apply_to_current_thread(&self, thread: &str) -> Result<PriorityOutcome> {
        if let Some(cpu_set) = &self.cpu_set {
            sched_setaffinity(Pid::from_raw(0), cpu_set).map_err(|e| BenchError::Affinity {
                thread: thread.to_owned(),
                source: e.into(),
            })?;
            log_debug!("Pinned the {thread} thread to all online CPUs");
        }

        let outcome = match (self.config.priority, self.priority) {
            (PriorityPolicy::No, _) => PriorityOutcome::Unchanged,
            (PriorityPolicy::RealtimeIfPermitted, None) => {
                PriorityOutcome::Denied(std::io::Error::from(std::io::ErrorKind::Unsupported))
            }
            (PriorityPolicy::RealtimeIfPermitted, Some(priority)) => {
                match set_fifo_priority(priority) {
                    Ok(()) => PriorityOutcome::Elevated(priority),
                    Err(e) => PriorityOutcome::Denied(e),
                }
            }
            (PriorityPolicy::Realtime, priority) => {
                let priority = priority.ok_or_else(|| BenchError::Priority {
                    thread: thread.to_owned(),
                    source: std::io::Error::from(std::io::ErrorKind::Unsupported),
                })?;
                set_fifo_priority(priority).map_err(|source| BenchError::Priority {
                    thread: thread.to_owned(),
                    source,
                })?;
                PriorityOutcome::Elevated(priority)
            }
        };
        log_debug!("Priority of the {thread} thread: {outcome:?}");
        Ok(outcome)
    }
}

#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
impl Scheduler {
    /// Resolves the affinity mask and priority level for the given
    /// configuration.
    pub fn prepare(config: SchedulingConfig) -> Result<Self> {
        if config.affinity == AffinityPolicy::AllCores {
            log_warn!("Setting the CPU affinity is not implemented on this platform.");
        }
        if config.priority == PriorityPolicy::Realtime {
            return Err(BenchError::Priority {
                thread: "main".to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::Unsupported),
            });
        }
        Ok(Self { config })
    }

    /// Returns the number of CPUs in the affinity mask, if one is applied.
    pub fn num_cpus(&self) -> Option<usize> {
        None
    }

    /// Applies the affinity mask and priority to the calling thread.
    pub fn apply_to_current_thread(&self, _thread: &str) -> Result<PriorityOutcome> {
        let outcome = match self.config.priority {
            PriorityPolicy::No => PriorityOutcome::Unchanged,
            _ => PriorityOutcome::Unsupported,
        };
        log_debug!("Priority of the {_thread} thread: {outcome:?}");
        Ok(outcome)
    }
}

/// Returns the number of online logical CPUs.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
pub fn online_cpus() -> Result<usize> {
    match sysconf(SysconfVar::_NPROCESSORS_ONLN) {
        Ok(Some(count)) if count > 0 => Ok(count as usize),
        Ok(_) => Err(BenchError::CpuCount(std::io::Error::other(
            "sysconf(_SC_NPROCESSORS_ONLN) returned no value",
        ))),
        Err(e) => Err(BenchError::CpuCount(e.into())),
    }
}

/// Returns the number of online logical CPUs.
#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
pub fn online_cpus() -> Result<usize> {
    std::thread::available_parallelism()
        .map(usize::from)
        .map_err(BenchError::CpuCount)
}

/// Extends the affinity mask of the calling thread with the CPUs
/// `0..num_cpus`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn all_cores(num_cpus: usize) -> Result<CpuSet> {
    let affinity_error = |e: nix::Error| BenchError::Affinity {
        thread: "main".to_owned(),
        source: e.into(),
    };
    let mut cpu_set = sched_getaffinity(Pid::from_raw(0)).map_err(affinity_error)?;
    for id in 0..capped_cpu_count(num_cpus, CpuSet::count()) {
        cpu_set.set(id).map_err(affinity_error)?;
    }
    Ok(cpu_set)
}

/// Caps the number of CPUs to the capacity of an affinity mask.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn capped_cpu_count(num_cpus: usize, capacity: usize) -> usize {
    if num_cpus > capacity {
        log_warn!(
            "{num_cpus} CPUs are online but an affinity mask holds at most {capacity}: \
            using the first {capacity}"
        );
        capacity
    } else {
        num_cpus
    }
}

/// Queries the maximum priority of the `SCHED_FIFO` policy.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn max_fifo_priority() -> std::io::Result<i32> {
    // SAFETY: This function has no preconditions and doesn't touch memory.
    let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if priority < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(priority)
    }
}

/// Switches the calling thread to the `SCHED_FIFO` policy at the given
/// priority.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn set_fifo_priority(priority: i32) -> std::io::Result<()> {
    // SAFETY: `sched_param` is a plain C struct, for which all-zeros is a valid
    // value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: `pthread_self()` is always a valid handle to the calling thread,
    // and `param` is a valid pointer for the duration of the call.
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::from_raw_os_error(ret))
    }
}
