//! Outcome-conditional archiving of a wrapped stage's work directory.
//!
//! Wraps any stage and, after each iteration whose outcome is in the
//! configured trigger set, deep-copies the inner stage's work directory to
//! `<OUTCOME>[_<cause>]_iteration_<NNNNNNNNNN>` under the archiver's own
//! directory. The iteration index increases strictly monotonically, so a
//! campaign's failures stay ordered and addressable.

use std::path::Path;

use tracing::info;

use crate::common::Result;
use crate::config::{ArchiveConfig, Config};
use crate::runner::{RunnerOutcome, Stage, StageDir, StageResult};
use crate::stats::ArchiveStats;

/// Stage wrapper copying the inner work directory on selected outcomes.
pub struct ArchiveStage<S: Stage> {
    dir: StageDir,
    inner: S,
    triggers: ArchiveConfig,
    iteration: u64,
    stats: ArchiveStats,
}

impl<S: Stage> ArchiveStage<S> {
    /// Wraps the stage built by `build_inner` under a fresh archive dir.
    ///
    /// `build_inner` receives the configuration re-rooted at the archive
    /// directory, so the inner stage's work dir nests underneath it.
    pub fn new(
        config: &Config,
        build_inner: impl FnOnce(&Config) -> Result<S>,
    ) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Archive", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let inner = build_inner(&config.with_dir(dir.path()))?;
        Ok(Self {
            dir,
            inner,
            triggers: config.archive.clone(),
            iteration: 0,
            stats: ArchiveStats::default(),
        })
    }

    /// The wrapped stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Archive statistics so far.
    pub fn stats(&self) -> &ArchiveStats {
        &self.stats
    }
}

impl<S: Stage> Stage for ArchiveStage<S> {
    type Input = S::Input;
    type Output = S::Output;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, input: S::Input) -> StageResult<S::Output> {
        self.inner.run(input)
    }

    fn task_post(&mut self, result: StageResult<S::Output>) -> StageResult<S::Output> {
        let archive_name = match result.outcome {
            RunnerOutcome::Timeout => {
                self.stats.timeouts += 1;
                self.triggers
                    .on_timeout
                    .then(|| format!("TIMEOUT_iteration_{:010}", self.iteration))
            }
            RunnerOutcome::Ignore => {
                self.stats.ignores += 1;
                self.triggers
                    .on_ignore
                    .then(|| format!("IGNORE_iteration_{:010}", self.iteration))
            }
            RunnerOutcome::Error => {
                self.stats.errors += 1;
                self.triggers.on_error.then(|| {
                    format!(
                        "ERROR_{}_iteration_{:010}",
                        self.inner.error_cause(),
                        self.iteration
                    )
                })
            }
            RunnerOutcome::Complete => {
                self.stats.completes += 1;
                self.triggers
                    .on_complete
                    .then(|| format!("COMPLETE_iteration_{:010}", self.iteration))
            }
            _ => None,
        };

        if let Some(name) = archive_name {
            let target = self.dir.path().join(&name);
            match copy_dir_recursive(self.inner.dir().path(), &target) {
                Ok(()) => info!(archive = %target.display(), "archived work directory"),
                Err(e) => tracing::warn!(archive = %target.display(), error = %e, "archive copy failed"),
            }
        }

        self.iteration += 1;
        self.stats.iterations = self.iteration;
        self.dir.log_write("stats.log", &self.stats.to_string());

        result
    }

    fn error_cause(&self) -> String {
        self.inner.error_cause()
    }
}

/// Copies a directory tree verbatim.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            let _ = std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
