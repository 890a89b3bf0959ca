//! Stage framework: lifecycle, outcomes, work directories.
//!
//! Every step of the pipeline — building a program, running a simulator,
//! comparing states, archiving — is a *stage*. This module provides:
//! 1. **Outcome taxonomy:** [`RunnerOutcome`] with a total severity order
//!    used when composing parallel sub-stage results.
//! 2. **Lifecycle:** The [`Stage`] trait (`task_pre → task → task_post`)
//!    with per-iteration result logging.
//! 3. **Work directories:** Each stage owns a unique indexed directory under
//!    its parent, or a fixed-name one when a stage must be resumable.
//! 4. **Benchmark driver:** [`run_bench`] iterates a stage and tallies
//!    outcomes.

pub mod archive;
pub mod process;
pub mod worker;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::stats::BenchStats;

pub use archive::ArchiveStage;
pub use process::{AbortHandle, ProcessOutput, ProcessRequest, ProcessStage};
pub use worker::Worker;

/// Terminal classification of one stage iteration.
///
/// The declaration order is the composition priority: when folding several
/// sub-stage outcomes into one, the maximum wins (TIMEOUT dominates ERROR
/// dominates IGNORE, and so on down to INVALID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunnerOutcome {
    /// Never run.
    Invalid,
    /// A nonblocking caller found the stage still running.
    Busy,
    /// The stage succeeded.
    Complete,
    /// The stage chose to skip this iteration.
    Ignore,
    /// A failure worth investigating.
    Error,
    /// A subprocess exceeded its deadline.
    Timeout,
}

impl fmt::Display for RunnerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerOutcome::Invalid => "INVALID",
            RunnerOutcome::Busy => "BUSY",
            RunnerOutcome::Complete => "COMPLETE",
            RunnerOutcome::Ignore => "IGNORE",
            RunnerOutcome::Error => "ERROR",
            RunnerOutcome::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Outcome plus payload of one stage iteration.
///
/// `payload` carries the stage's product on success (and, where useful for
/// diagnosis, on failure too); `detail` is the human-readable failure
/// context that lands in the result logs.
#[derive(Debug, Clone)]
pub struct StageResult<T> {
    /// The outcome classification.
    pub outcome: RunnerOutcome,
    /// The stage product, if any.
    pub payload: Option<T>,
    /// Failure context or auxiliary report text.
    pub detail: String,
}

impl<T> StageResult<T> {
    /// The initial, never-run result.
    pub fn invalid() -> Self {
        Self {
            outcome: RunnerOutcome::Invalid,
            payload: None,
            detail: String::new(),
        }
    }

    /// A BUSY result for nonblocking reentry.
    pub fn busy() -> Self {
        Self {
            outcome: RunnerOutcome::Busy,
            payload: None,
            detail: String::new(),
        }
    }

    /// A successful result carrying `payload`.
    pub fn complete(payload: T) -> Self {
        Self {
            outcome: RunnerOutcome::Complete,
            payload: Some(payload),
            detail: String::new(),
        }
    }

    /// A result with explicit outcome, payload and detail.
    pub fn new(outcome: RunnerOutcome, payload: Option<T>, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            payload,
            detail: detail.into(),
        }
    }

    /// An ERROR result with context.
    pub fn error(detail: impl Into<String>) -> Self {
        Self::new(RunnerOutcome::Error, None, detail)
    }

    /// A TIMEOUT result with context.
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(RunnerOutcome::Timeout, None, detail)
    }

    /// An IGNORE result with context.
    pub fn ignore(detail: impl Into<String>) -> Self {
        Self::new(RunnerOutcome::Ignore, None, detail)
    }

    /// True when the outcome is COMPLETE.
    pub fn is_complete(&self) -> bool {
        self.outcome == RunnerOutcome::Complete
    }

    /// Re-types a failure result, dropping the payload.
    pub fn cast_failure<U>(&self) -> StageResult<U> {
        StageResult {
            outcome: self.outcome,
            payload: None,
            detail: self.detail.clone(),
        }
    }
}

/// A stage's work directory plus its logging switch.
#[derive(Debug, Clone)]
pub struct StageDir {
    path: PathBuf,
    log: bool,
}

impl StageDir {
    /// Allocates `<parent>/<name>_<i>` with the first free index.
    pub fn indexed(parent: &Path, name: &str, log: bool) -> Result<Self> {
        let mut i = 0;
        let path = loop {
            let candidate = parent.join(format!("{name}_{i}"));
            if !candidate.exists() {
                break candidate;
            }
            i += 1;
        };
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, log })
    }

    /// Uses the fixed directory `<parent>/<name>`, creating it if needed.
    ///
    /// Fixed names make a stage resumable across campaigns (the
    /// coverage-guided loop finds its seed file again).
    pub fn fixed(parent: &Path, name: &str, log: bool) -> Result<Self> {
        let path = parent.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, log })
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when log artifacts are written.
    pub fn log_enabled(&self) -> bool {
        self.log
    }

    /// Writes a file in the work directory unconditionally.
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Writes a log artifact; a no-op when logging is off.
    pub fn log_write(&self, name: &str, content: &str) {
        if !self.log {
            return;
        }
        if let Err(e) = std::fs::write(self.path.join(name), content) {
            tracing::warn!(name, error = %e, "cannot write log artifact");
        }
    }

    /// Writes a stage result log artifact.
    pub fn log_result<T: fmt::Debug>(&self, name: &str, result: &StageResult<T>) {
        if !self.log {
            return;
        }
        let content = format!(
            "OUTCOME: {}\nRESULTS:\n{:?}\n{}\n",
            result.outcome, result.payload, result.detail
        );
        self.log_write(name, &content);
    }
}

/// One step of the pipeline.
///
/// Implement `task` (and optionally `task_pre`/`task_post`); call [`run`]
/// (never override its behavior) so the per-iteration logs stay uniform.
///
/// [`run`]: Stage::run
pub trait Stage {
    /// Per-iteration input.
    type Input: fmt::Debug;
    /// Stage product.
    type Output: fmt::Debug + Clone + Send + 'static;

    /// The stage's work directory.
    fn dir(&self) -> &StageDir;

    /// Preparation before the task body (delete stale artifacts, ...).
    fn task_pre(&mut self, _input: &Self::Input) {}

    /// The task body.
    fn task(&mut self, input: Self::Input) -> StageResult<Self::Output>;

    /// Post-processing of the task result (parsing, stats, archiving).
    fn task_post(&mut self, result: StageResult<Self::Output>) -> StageResult<Self::Output> {
        result
    }

    /// Cause tag used in archive directory names on ERROR.
    fn error_cause(&self) -> String {
        "unknown".to_string()
    }

    /// Handle to interrupt the stage's current subprocess, if it has one.
    fn abort_handle(&self) -> Option<AbortHandle> {
        None
    }

    /// Runs one full iteration: `task_pre → task → task_post`, with logs.
    fn run(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        self.dir().log_write("run_args.log", &format!("{input:?}\n"));
        self.task_pre(&input);
        let task_result = self.task(input);
        self.dir().log_result("task_pre_result.log", &task_result);
        let result = self.task_post(task_result);
        self.dir().log_result("task_result.log", &result);
        result
    }
}

/// Iterates a stage and tallies outcomes.
///
/// `make_input` builds the input of each iteration. Stops early on IGNORE or
/// ERROR when the respective flag is set. Progress is reported through
/// `tracing` at info level.
pub fn run_bench<S: Stage>(
    stage: &mut S,
    iterations: u64,
    mut make_input: impl FnMut(u64) -> S::Input,
    stop_on_ignore: bool,
    stop_on_error: bool,
) -> BenchStats {
    let mut stats = BenchStats::default();
    let start = std::time::Instant::now();

    for i in 0..iterations {
        let ret = stage.run(make_input(i));
        match ret.outcome {
            RunnerOutcome::Complete => stats.completes += 1,
            RunnerOutcome::Timeout => stats.timeouts += 1,
            RunnerOutcome::Ignore => {
                stats.ignores += 1;
                if stop_on_ignore {
                    break;
                }
            }
            _ => {
                stats.errors += 1;
                if stop_on_error {
                    break;
                }
            }
        }
        tracing::info!(
            iteration = i + 1,
            total = iterations,
            completes = stats.completes,
            ignores = stats.ignores,
            errors = stats.errors,
            timeouts = stats.timeouts,
            "bench"
        );
    }

    stats.elapsed = start.elapsed();
    stats
}
