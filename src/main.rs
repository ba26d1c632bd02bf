// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! CLI tool to benchmark a parallel floating-point reduction.

use clap::{Parser, ValueEnum};
use parabench::{
    AffinityPolicy, BenchConfig, BenchError, MergeStrategy, PriorityPolicy, Report,
    SchedulingConfig, SeedSource,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if std::env::args_os().len() <= 1 {
        println!("Too few arguments, add more (see --help)");
        return ExitCode::SUCCESS;
    }
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<Report, BenchError> {
    let config = BenchConfig {
        seed: cli.seed.map_or(SeedSource::Entropy, SeedSource::Fixed),
        scheduling: SchedulingConfig {
            affinity: cli.affinity.into(),
            priority: cli.priority.into(),
        },
        merge: cli.merge.into(),
        ..BenchConfig::new(cli.threads, cli.elements)?
    };
    log::debug!("Running with {config:?}");
    parabench::run(&config)
}

/// CLI tool to benchmark a parallel floating-point reduction.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
struct Cli {
    /// Number of worker threads.
    #[arg(short = 't', allow_negative_numbers = true)]
    threads: i64,

    /// Number of elements in the input. Must be a multiple of the number of
    /// threads.
    #[arg(short = 'n', allow_negative_numbers = true)]
    elements: i64,

    /// Seed of the input and exponents. Default to a seed read from the OS
    /// entropy source.
    #[arg(long)]
    seed: Option<u64>,

    /// Strategy to merge the partial sums of the threads.
    #[arg(long, value_enum, default_value_t = MergeCli::SharedLock)]
    merge: MergeCli,

    /// Policy to set the CPU affinity of the threads.
    #[arg(long, value_enum, default_value_t = AffinityCli::AllCores)]
    affinity: AffinityCli,

    /// Policy to set the scheduling priority of the threads.
    #[arg(long, value_enum, default_value_t = PriorityCli::RealtimeIfPermitted)]
    priority: PriorityCli,
}

/// Strategy to merge the partial sums of the threads.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MergeCli {
    /// Each thread adds its partial sum to a total shared under a lock.
    SharedLock,
    /// Partial sums are collected when joining the threads.
    Collect,
}

impl From<MergeCli> for MergeStrategy {
    fn from(merge: MergeCli) -> Self {
        match merge {
            MergeCli::SharedLock => MergeStrategy::SharedLock,
            MergeCli::Collect => MergeStrategy::Collect,
        }
    }
}

/// Policy to set the CPU affinity of the threads.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AffinityCli {
    /// Allow the threads to run on all the online CPUs.
    AllCores,
    /// Leave the affinity unchanged.
    No,
}

impl From<AffinityCli> for AffinityPolicy {
    fn from(affinity: AffinityCli) -> Self {
        match affinity {
            AffinityCli::AllCores => AffinityPolicy::AllCores,
            AffinityCli::No => AffinityPolicy::No,
        }
    }
}

/// Policy to set the scheduling priority of the threads.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PriorityCli {
    /// Use the maximum real-time priority if permitted, otherwise warn.
    RealtimeIfPermitted,
    /// Use the maximum real-time priority, or fail.
    Realtime,
    /// Leave the priority unchanged.
    No,
}

impl From<PriorityCli> for PriorityPolicy {
    fn from(priority: PriorityCli) -> Self {
        match priority {
            PriorityCli::RealtimeIfPermitted => PriorityPolicy::RealtimeIfPermitted,
            PriorityCli::Realtime => PriorityPolicy::Realtime,
            PriorityCli::No => PriorityPolicy::No,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["parabench", "-t", "4", "-n", "8"]).unwrap();
        assert_eq!(
            cli,
            Cli {
                threads: 4,
                elements: 8,
                seed: None,
                merge: MergeCli::SharedLock,
                affinity: AffinityCli::AllCores,
                priority: PriorityCli::RealtimeIfPermitted,
            }
        );
    }

    #[test]
    fn test_parse_all_options() {
        let cli = Cli::try_parse_from([
            "parabench",
            "-n",
            "100",
            "-t",
            "5",
            "--seed",
            "42",
            "--merge",
            "collect",
            "--affinity",
            "no",
            "--priority",
            "realtime",
        ])
        .unwrap();
        assert_eq!(cli.threads, 5);
        assert_eq!(cli.elements, 100);
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.merge, MergeCli::Collect);
        assert_eq!(cli.affinity, AffinityCli::No);
        assert_eq!(cli.priority, PriorityCli::Realtime);
    }

    #[test]
    fn test_parse_negative_numbers() {
        let cli = Cli::try_parse_from(["parabench", "-t", "-3", "-n", "9"]).unwrap();
        assert_eq!(cli.threads, -3);
        let err = run(&cli).unwrap_err();
        assert!(matches!(err, BenchError::Usage(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_unknown_flag() {
        assert!(Cli::try_parse_from(["parabench", "-t", "1", "-n", "1", "-x"]).is_err());
        assert!(Cli::try_parse_from(["parabench", "-t", "1"]).is_err());
        assert!(Cli::try_parse_from(["parabench", "-t", "one", "-n", "1"]).is_err());
    }

    #[test]
    fn test_run_rejects_invalid_sizes() {
        for args in [
            ["parabench", "-t", "0", "-n", "10"],
            ["parabench", "-t", "2", "-n", "0"],
            ["parabench", "-t", "3", "-n", "10"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(matches!(run(&cli), Err(BenchError::Usage(_))));
        }
    }
}
