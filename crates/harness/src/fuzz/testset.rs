//! Corpus replay through the minimizer.
//!
//! Walks a corpus of persisted code blocks (`<dir>/**/<pattern>`), runs
//! each through the reduce/minimize pipeline and, when configured, splits
//! long blocks into chunks of bounded fragment count. Between chunks the
//! previous chunk's terminal reference state becomes the next chunk's
//! init fragments, so a split run observes the same architectural states
//! as the original program.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::code::{CodeBlock, CodeStats};
use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::pipeline::CompareOutput;
use crate::reduce::{MinimizeRequest, MinimizeStage};
use crate::runner::{Stage, StageDir, StageResult};
use crate::state::MachineState;

/// Per-iteration input of the replay stage.
#[derive(Debug, Clone)]
pub struct TestsetRequest {
    /// Deadline applied to each subprocess.
    pub timeout: Duration,
}

/// Corpus-wide size statistics.
#[derive(Debug, Clone, Default)]
pub struct TestsetStats {
    /// Number of corpus entries.
    pub testcases: u64,
    /// Aggregate over all entries.
    pub total: CodeStats,
    /// (min, max, avg) fragments per entry.
    pub fragments: (u64, u64, f64),
    /// (min, max, avg) lines per entry.
    pub lines: (u64, u64, f64),
    /// (min, max, avg) instructions per entry.
    pub ins: (u64, u64, f64),
    /// (min, max, avg) vector instructions per entry.
    pub vins: (u64, u64, f64),
}

/// Replays a corpus of persisted blocks through the minimizer.
pub struct TestsetStage {
    dir: StageDir,
    minimize: MinimizeStage,
    testset: Vec<PathBuf>,
    next_test: usize,
    current: Option<CodeBlock>,
    current_name: String,
    chunk: usize,
    chunks: usize,
    max_fragments_per_run: i64,
    last_state: Option<MachineState>,
}

impl TestsetStage {
    /// Globs the corpus and builds the nested minimize stage.
    pub fn new(config: &Config) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Testset", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let pattern = format!(
            "{}/**/{}",
            config.testset.dir.display(),
            config.testset.pattern
        );
        let testset: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| HarnessError::Config(format!("bad testset pattern {pattern:?}: {e}")))?
            .filter_map(std::result::Result::ok)
            .collect();
        info!(count = testset.len(), pattern, "testset loaded");

        Ok(Self {
            dir,
            minimize: MinimizeStage::new(&subconfig)?,
            testset,
            next_test: 0,
            current: None,
            current_name: String::new(),
            chunk: 0,
            chunks: 0,
            max_fragments_per_run: config.testset.max_fragments_per_run,
            last_state: None,
        })
    }

    /// Number of corpus entries.
    pub fn len(&self) -> usize {
        self.testset.len()
    }

    /// True when the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.testset.is_empty()
    }

    /// Size statistics over the whole corpus.
    pub fn corpus_stats(&self) -> Result<TestsetStats> {
        let mut stats = TestsetStats {
            fragments: (u64::MAX, 0, 0.0),
            lines: (u64::MAX, 0, 0.0),
            ins: (u64::MAX, 0, 0.0),
            vins: (u64::MAX, 0, 0.0),
            ..TestsetStats::default()
        };
        fn update(slot: &mut (u64, u64, f64), value: u64) {
            slot.0 = slot.0.min(value);
            slot.1 = slot.1.max(value);
            slot.2 += value as f64;
        }
        for path in &self.testset {
            let block = CodeBlock::load(path)?;
            let s = block.stats_all();
            stats.testcases += 1;
            stats.total.add(&s);
            update(&mut stats.fragments, s.fragments);
            update(&mut stats.lines, s.lines);
            update(&mut stats.ins, s.ins);
            update(&mut stats.vins, s.vins);
        }
        if stats.testcases > 0 {
            let n = stats.testcases as f64;
            stats.fragments.2 /= n;
            stats.lines.2 /= n;
            stats.ins.2 /= n;
            stats.vins.2 /= n;
        }
        Ok(stats)
    }

    /// Advances to the next corpus entry; `false` when exhausted.
    fn advance(&mut self) -> Result<bool> {
        loop {
            if self.next_test >= self.testset.len() {
                return Ok(false);
            }
            let path = &self.testset[self.next_test];
            self.next_test += 1;
            match CodeBlock::load(path) {
                Ok(block) => {
                    self.chunks = if self.max_fragments_per_run > 0 {
                        block
                            .main_len()
                            .div_ceil(self.max_fragments_per_run as usize)
                            .max(1)
                    } else {
                        1
                    };
                    self.chunk = 0;
                    self.last_state = None;
                    self.current_name = path.display().to_string();
                    self.current = Some(block);
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable testcase");
                }
            }
        }
    }
}

impl Stage for TestsetStage {
    type Input = TestsetRequest;
    type Output = CompareOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: TestsetRequest) -> StageResult<CompareOutput> {
        if self.current.is_none() || self.chunk >= self.chunks {
            match self.advance() {
                Ok(true) => {}
                Ok(false) => return StageResult::ignore("testset exhausted"),
                Err(e) => return StageResult::error(format!("cannot load testcase: {e}")),
            }
        }
        let Some(full) = self.current.clone() else {
            return StageResult::ignore("testset exhausted");
        };

        let block = if self.max_fragments_per_run > 0 {
            let size = self.max_fragments_per_run as usize;
            let begin = self.chunk * size;
            let mut part = full.part(begin, begin + size);
            // thread the architectural state across the chunk boundary
            if let Some(state) = &self.last_state {
                part.init = state.as_assembly();
            }
            part
        } else {
            full
        };
        self.chunk += 1;

        let ret = self.minimize.run(MinimizeRequest {
            block,
            timeout: request.timeout,
        });

        if let Some(output) = &ret.payload {
            self.last_state = Some(output.ref_state.clone());
        }

        ret
    }

    fn task_post(&mut self, ret: StageResult<CompareOutput>) -> StageResult<CompareOutput> {
        let stats = format!(
            "testset_len: {}\ntestset_idx: {}\nsubruns: {}\nsubrun: {}\ntestname: {}\n",
            self.testset.len(),
            self.next_test,
            self.chunks,
            self.chunk,
            self.current_name
        );
        self.dir.log_write("stats.log", &stats);
        ret
    }

    fn error_cause(&self) -> String {
        self.minimize.error_cause()
    }
}
