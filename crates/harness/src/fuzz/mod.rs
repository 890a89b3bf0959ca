//! Coverage-guided program evolution.
//!
//! A state machine over a persistent seed program, driven by the coverage
//! points the coverage engine reports for each candidate:
//! - **Init** loads the persisted seed (the stage works in a fixed-name
//!   directory precisely so a later campaign finds it again) or generates a
//!   fresh block.
//! - **Extend** inserts one freshly generated fragment at a random payload
//!   position and keeps it when coverage does not drop. Repeated successes
//!   eventually hand over to Reduce; long droughts first allow a coverage
//!   regression (escaping local maxima), then force Reduce.
//! - **Reduce** deletes a random 1–2 fragment slice and keeps the result
//!   when coverage is not reduced, handing back to Extend after a bounded
//!   number of attempts.
//!
//! The seed is rewritten whenever the coverage points strictly increase, so
//! an interrupted campaign never loses progress.

pub mod testset;

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::code::CodeBlock;
use crate::common::Result;
use crate::config::Config;
use crate::isg::MultiGenerator;
use crate::pipeline::{CodeCheckStage, CodeRequest, RefCovOutput};
use crate::runner::{RunnerOutcome, Stage, StageDir, StageResult};
use crate::stats::FuzzStats;

/// Extend successes before switching to Reduce.
const THRESH_REPEAT_EXTEND: u64 = 10;
/// Failed extensions before a coverage regression is accepted.
const THRESH_NO_EXTEND_ALLOW_REDUCE_COV: u64 = 100;
/// Failed extensions before Reduce is forced.
const THRESH_NO_EXTEND_TRY_REDUCE: u64 = 110;
/// Reduce attempts before handing back to Extend.
const THRESH_TRY_REDUCE: u64 = 10;

/// Name of the persisted seed program.
const SEED_FILENAME: &str = "testcase_code.json";

/// The state machine's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuzzState {
    Init,
    Extend,
    Reduce,
}

/// Per-iteration input of the coverage-guided loop.
#[derive(Debug, Clone)]
pub struct FuzzRequest {
    /// State machine steps per stage iteration.
    pub subiterations: u64,
    /// Minimum payload length of a freshly generated seed.
    pub min_start_fragments: usize,
    /// Maximum payload length of a freshly generated seed.
    pub max_start_fragments: usize,
    /// Deadline applied to each subprocess.
    pub timeout: Duration,
}

/// Progress snapshot returned after each stage iteration.
#[derive(Debug, Clone)]
pub struct FuzzProgress {
    /// Current payload length in fragments.
    pub code_len: u64,
    /// Current coverage points.
    pub coverage_points: u64,
    /// Current coverage percentage.
    pub coverage_percent: f64,
}

/// The coverage-guided extend/reduce loop.
///
/// Generic over the validation stage so the state machine can be exercised
/// without external simulators; production campaigns use
/// [`CodeCheckStage`] via [`from_config`](CovFuzzStage::from_config).
pub struct CovFuzzStage<V: Stage<Input = CodeRequest, Output = RefCovOutput>> {
    dir: StageDir,
    validator: V,
    generator: MultiGenerator,
    allow_exceptions: bool,
    seed_path: PathBuf,
    state: FuzzState,
    cnt_state: u64,
    cnt_no_extend: u64,
    code: Option<CodeBlock>,
    coverage: (u64, f64),
    coverage_last: (u64, f64),
    stats: FuzzStats,
    rng: StdRng,
    timeout: Duration,
    min_start_fragments: usize,
    max_start_fragments: usize,
}

impl CovFuzzStage<CodeCheckStage> {
    /// The production loop: a check pipeline with coverage forced on and
    /// aggregation off, trap handling per the exception policy.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut subconfig = config.clone();
        subconfig.coverage.sum_enable = false;
        if config.general.allow_exceptions {
            subconfig.general.stop_on_exception = false;
            subconfig.general.skip_on_exception = true;
        } else {
            // bail out early so exception-raising candidates stay cheap
            subconfig.general.stop_on_exception = true;
            subconfig.general.skip_on_exception = false;
        }

        let dir = StageDir::fixed(&config.general.dir, "CovFuzz", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let stage_config = subconfig.with_dir(dir.path());

        let validator = CodeCheckStage::new(&stage_config, true)?;
        let generator = MultiGenerator::for_config(config)?;
        Ok(Self::with_parts(dir, validator, generator, config))
    }
}

impl<V: Stage<Input = CodeRequest, Output = RefCovOutput>> CovFuzzStage<V> {
    /// Assembles a loop from explicit parts (the test seam).
    pub fn with_parts(dir: StageDir, validator: V, generator: MultiGenerator, config: &Config) -> Self {
        let seed_path = dir.path().join(SEED_FILENAME);
        Self {
            dir,
            validator,
            generator,
            allow_exceptions: config.general.allow_exceptions,
            seed_path,
            state: FuzzState::Init,
            cnt_state: 0,
            cnt_no_extend: 0,
            code: None,
            coverage: (0, 0.0),
            coverage_last: (0, 0.0),
            stats: FuzzStats::default(),
            rng: StdRng::from_os_rng(),
            timeout: Duration::from_secs(1),
            min_start_fragments: 0,
            max_start_fragments: 10,
        }
    }

    /// Loop statistics so far.
    pub fn stats(&self) -> &FuzzStats {
        &self.stats
    }

    /// The current evolved block, if any.
    pub fn code(&self) -> Option<&CodeBlock> {
        self.code.as_ref()
    }

    /// Path of the persisted seed.
    pub fn seed_path(&self) -> &std::path::Path {
        &self.seed_path
    }

    /// Validates a candidate; `Some((points, percent))` when accepted.
    fn check_code(&mut self, block: &CodeBlock) -> Option<(u64, f64)> {
        let ret = self
            .validator
            .run(CodeRequest::new(block.as_code(), self.timeout));
        self.stats.generates += 1;

        match ret.outcome {
            RunnerOutcome::Complete => self.stats.completes += 1,
            RunnerOutcome::Ignore => {
                self.stats.ignores += 1;
                return None;
            }
            RunnerOutcome::Timeout => {
                self.stats.timeouts += 1;
                return None;
            }
            RunnerOutcome::Error => {
                debug!(detail = %ret.detail, "candidate errored");
                self.stats.errors += 1;
                return None;
            }
            _ => {
                // paranoia fallback
                self.stats.unknown_faults += 1;
                return None;
            }
        }

        let refcov = ret.payload?;
        if refcov.state.extras.exceptions != 0 {
            self.stats.exceptions += 1;
            if !self.allow_exceptions {
                return None;
            }
        }
        self.stats.valids += 1;

        let coverage = refcov.coverage?;
        Some((coverage.points()?, coverage.percent()?))
    }

    fn adopt(&mut self, block: CodeBlock, coverage: (u64, f64)) {
        self.stats.code_len = block.main_len() as u64;
        self.code = Some(block);
        self.coverage = coverage;
    }

    fn clear(&mut self) {
        self.code = None;
        self.stats.code_len = 0;
        self.coverage = (0, 0.0);
    }

    fn gen_code(&mut self) -> bool {
        let block = match self
            .generator
            .gen_block(self.min_start_fragments, self.max_start_fragments)
        {
            Ok(block) => block,
            Err(e) => {
                debug!(error = %e, "seed generation failed");
                self.clear();
                return false;
            }
        };
        match self.check_code(&block) {
            Some(coverage) => {
                self.adopt(block, coverage);
                true
            }
            None => {
                self.clear();
                false
            }
        }
    }

    fn load_code(&mut self) -> bool {
        let Ok(block) = CodeBlock::load(&self.seed_path) else {
            self.clear();
            return false;
        };
        match self.check_code(&block) {
            Some(coverage) => {
                info!(seed = %self.seed_path.display(), "resumed persisted seed");
                self.adopt(block, coverage);
                true
            }
            None => {
                self.clear();
                false
            }
        }
    }

    fn save_code(&self) {
        if let Some(code) = &self.code {
            if let Err(e) = code.save(&self.seed_path) {
                tracing::warn!(error = %e, "cannot persist seed");
            }
        }
    }

    /// Init step; `false` stops the subiteration batch for an early result.
    fn step_init(&mut self) -> bool {
        let ok = self.load_code() || self.gen_code();
        if ok {
            self.state = FuzzState::Extend;
            return false;
        }
        true
    }

    fn step_extend(&mut self) -> bool {
        let Some(code) = self.code.clone() else {
            self.state = FuzzState::Init;
            return true;
        };

        let fresh = match self.generator.gen_block(1, 1) {
            Ok(block) => block.main,
            Err(e) => {
                debug!(error = %e, "fragment generation failed");
                return true;
            }
        };

        let mut candidate = code;
        let len = candidate.main.len();
        let at = if len <= 1 {
            len
        } else {
            self.rng.random_range(0..=len)
        };
        for (i, fragment) in fresh.as_slice().iter().enumerate() {
            candidate.main.insert(at + i, fragment.clone());
        }

        let coverage = self.check_code(&candidate);

        if let Some(coverage) = coverage.filter(|c| c.0 >= self.coverage.0) {
            // valid and coverage did not drop -> accepted
            self.stats.extensions += 1;
            self.adopt(candidate, coverage);
            self.cnt_no_extend = 0;

            self.cnt_state += 1;
            if self.cnt_state >= THRESH_REPEAT_EXTEND {
                self.cnt_state = 0;
                self.state = FuzzState::Reduce;
            }
        } else {
            self.cnt_no_extend += 1;
            if let Some(coverage) =
                coverage.filter(|_| self.cnt_no_extend >= THRESH_NO_EXTEND_ALLOW_REDUCE_COV)
            {
                // stuck in a local maximum -> accept the regression
                self.stats.extensions_redcov += 1;
                self.adopt(candidate, coverage);
                self.cnt_no_extend = 0;
            } else if self.cnt_no_extend >= THRESH_NO_EXTEND_TRY_REDUCE {
                self.cnt_no_extend = 0;
                self.cnt_state = 0;
                self.state = FuzzState::Reduce;
            }
        }

        true
    }

    fn step_reduce(&mut self) -> bool {
        let Some(code) = self.code.clone() else {
            self.state = FuzzState::Init;
            return true;
        };

        let len = code.main.len();
        if len <= 1 {
            // too small to shrink
            self.cnt_state = 0;
            self.state = FuzzState::Extend;
            return true;
        }

        let a = self.rng.random_range(0..len);
        let b = a + self.rng.random_range(1..=2usize);

        let mut candidate = CodeBlock {
            init: code.init.clone(),
            main: code.main.part(0, a),
            deinit: code.deinit.clone(),
        };
        candidate.main.add_list(&code.main.part(b, len));

        let coverage = self.check_code(&candidate);

        // reduce as long as it keeps succeeding
        self.cnt_state += 1;
        if let Some(coverage) = coverage.filter(|c| c.0 >= self.coverage.0) {
            self.stats.reductions += 1;
            self.adopt(candidate, coverage);
            self.cnt_state = 0;
        }
        if self.cnt_state >= THRESH_TRY_REDUCE {
            self.cnt_state = 0;
            self.state = FuzzState::Extend;
        }

        true
    }

    fn iteration(&mut self) -> bool {
        let keep_going = match self.state {
            FuzzState::Init => self.step_init(),
            FuzzState::Extend => self.step_extend(),
            FuzzState::Reduce => self.step_reduce(),
        };
        self.stats.code_len = self.code.as_ref().map_or(0, |c| c.main_len() as u64);
        keep_going
    }
}

impl<V: Stage<Input = CodeRequest, Output = RefCovOutput>> Stage for CovFuzzStage<V> {
    type Input = FuzzRequest;
    type Output = FuzzProgress;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: FuzzRequest) -> StageResult<FuzzProgress> {
        self.timeout = request.timeout;
        self.min_start_fragments = request.min_start_fragments;
        self.max_start_fragments = request.max_start_fragments;

        for _ in 0..request.subiterations {
            if !self.iteration() {
                break;
            }
        }

        StageResult::complete(FuzzProgress {
            code_len: self.stats.code_len,
            coverage_points: self.coverage.0,
            coverage_percent: self.coverage.1,
        })
    }

    fn task_post(&mut self, ret: StageResult<FuzzProgress>) -> StageResult<FuzzProgress> {
        self.stats.coverage_points = self.coverage.0;
        self.stats.coverage_percent = self.coverage.1;
        self.dir.log_write("stats.log", &self.stats.to_string());

        // persist only on strict improvement
        if self.coverage.0 > self.coverage_last.0 {
            self.save_code();
        }
        self.coverage_last = self.coverage;
        ret
    }
}
