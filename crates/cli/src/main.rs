//! Fuzzing harness CLI.
//!
//! This binary provides a single entry point for all campaign modes. It
//! performs:
//! 1. **Differential fuzzing:** Generate programs, compare reference vs.
//!    DUT, reduce and minimize failures, archive witnesses (`fuzz`).
//! 2. **Coverage-guided evolution:** Extend/reduce a persistent seed
//!    program against live coverage metrics (`cov`).
//! 3. **Corpus replay:** Re-run persisted code blocks through the
//!    minimizer (`replay`).

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use rvvfuzz_core::Config;
use rvvfuzz_core::fuzz::testset::{TestsetRequest, TestsetStage};
use rvvfuzz_core::fuzz::{CovFuzzStage, FuzzRequest};
use rvvfuzz_core::reduce::{FuzzMinimizeRequest, FuzzMinimizeStage};
use rvvfuzz_core::runner::{ArchiveStage, RunnerOutcome, Stage, run_bench};

#[derive(Parser, Debug)]
#[command(
    name = "rvvfuzz",
    author,
    version,
    about = "Differential-testing and coverage-guided fuzzing for RISC-V simulators",
    long_about = "Run differential fuzzing campaigns against a reference simulator and a \
                  device under test, evolve coverage-maximizing seed programs, or replay a \
                  corpus of persisted test cases.\n\nExamples:\n  \
                  rvvfuzz -c campaign.json fuzz -i 1000\n  \
                  rvvfuzz -c campaign.json cov -i 100000\n  \
                  rvvfuzz -c campaign.json replay"
)]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-subprocess deadline in seconds.
    #[arg(short, long, default_value_t = 1.0)]
    timeout: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Differential fuzzing with automatic reduction and archiving.
    Fuzz {
        /// Number of iterations.
        #[arg(short, long, default_value_t = 1000)]
        iterations: u64,

        /// Minimum payload fragments per generated program.
        #[arg(long, default_value_t = 2)]
        min_fragments: usize,

        /// Maximum payload fragments per generated program.
        #[arg(long, default_value_t = 100)]
        max_fragments: usize,

        /// Stop the campaign on the first ERROR.
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Coverage-guided extend/reduce evolution of a persistent seed.
    Cov {
        /// Number of state machine steps.
        #[arg(short, long, default_value_t = 100000)]
        iterations: u64,

        /// State machine steps per progress report.
        #[arg(long, default_value_t = 10)]
        subiterations: u64,

        /// Minimum payload fragments of a fresh seed.
        #[arg(long, default_value_t = 2)]
        min_fragments: usize,

        /// Maximum payload fragments of a fresh seed.
        #[arg(long, default_value_t = 20)]
        max_fragments: usize,
    },

    /// Replay a corpus of persisted code blocks through the minimizer.
    Replay {
        /// Print corpus statistics and exit.
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    let timeout = Duration::from_secs_f64(cli.timeout);

    match cli.command {
        Commands::Fuzz {
            iterations,
            min_fragments,
            max_fragments,
            stop_on_error,
        } => cmd_fuzz(
            &config,
            timeout,
            iterations,
            min_fragments,
            max_fragments,
            stop_on_error,
        ),
        Commands::Cov {
            iterations,
            subiterations,
            min_fragments,
            max_fragments,
        } => cmd_cov(
            &config,
            timeout,
            iterations,
            subiterations,
            min_fragments,
            max_fragments,
        ),
        Commands::Replay { stats } => cmd_replay(&config, timeout, stats),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Config {
    match path {
        Some(path) => Config::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("Error reading config {}: {e}", path.display());
            process::exit(1);
        }),
        None => Config::default(),
    }
}

/// Runs the differential campaign: generate, compare, minimize, archive.
fn cmd_fuzz(
    config: &Config,
    timeout: Duration,
    iterations: u64,
    min_fragments: usize,
    max_fragments: usize,
    stop_on_error: bool,
) {
    let mut stage = ArchiveStage::new(config, FuzzMinimizeStage::new).unwrap_or_else(|e| {
        eprintln!("Error setting up the fuzzing pipeline: {e}");
        process::exit(1);
    });

    let stats = run_bench(
        &mut stage,
        iterations,
        |_| FuzzMinimizeRequest {
            min_fragments,
            max_fragments,
            timeout,
        },
        false,
        stop_on_error,
    );

    println!("{stats}");
    println!("{}", stage.inner().stats());
}

/// Runs the coverage-guided loop, reporting progress per batch.
fn cmd_cov(
    config: &Config,
    timeout: Duration,
    iterations: u64,
    subiterations: u64,
    min_fragments: usize,
    max_fragments: usize,
) {
    let mut stage = CovFuzzStage::from_config(config).unwrap_or_else(|e| {
        eprintln!("Error setting up the coverage-guided loop: {e}");
        process::exit(1);
    });

    let batches = iterations.div_ceil(subiterations.max(1));
    for batch in 0..batches {
        let ret = stage.run(FuzzRequest {
            subiterations,
            min_start_fragments: min_fragments,
            max_start_fragments: max_fragments,
            timeout,
        });
        if let Some(progress) = ret.payload {
            info!(
                batch,
                batches,
                code_len = progress.code_len,
                coverage_points = progress.coverage_points,
                coverage_percent = progress.coverage_percent,
                "progress"
            );
        }
    }

    println!("{}", stage.stats());
    println!("seed: {}", stage.seed_path().display());
}

/// Replays the configured corpus until exhausted.
fn cmd_replay(config: &Config, timeout: Duration, stats_only: bool) {
    let mut stage = TestsetStage::new(config).unwrap_or_else(|e| {
        eprintln!("Error setting up the replay stage: {e}");
        process::exit(1);
    });

    if stage.is_empty() {
        eprintln!(
            "No testcases matching {}/**/{}",
            config.testset.dir.display(),
            config.testset.pattern
        );
        process::exit(1);
    }

    if stats_only {
        match stage.corpus_stats() {
            Ok(stats) => println!("{stats:#?}"),
            Err(e) => {
                eprintln!("Error reading corpus: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let mut errors = 0u64;
    loop {
        let ret = stage.run(TestsetRequest { timeout });
        match ret.outcome {
            RunnerOutcome::Ignore => break,
            RunnerOutcome::Error => {
                errors += 1;
                info!(cause = %stage.error_cause(), "testcase failed");
            }
            _ => {}
        }
    }
    println!("replay finished, {errors} failing testcases");
}
