//! Failure reduction and minimization.
//!
//! When a differential test fails, two passes shrink it to a witness:
//! 1. **Delta reduction:** Binary search over the payload prefix length for
//!    the shortest prefix that still fails. The invariant throughout is
//!    `good < bad` with `prefix[0..good]` known (or trivially) passing and
//!    `prefix[0..bad]` known failing; timeouts count as failing.
//! 2. **Minimization:** Run the passing prefix once on the reference to
//!    capture the machine state right before the failure, then rebuild the
//!    program as state-restore + the single failing fragment range. When
//!    that still fails, the witness is usually one instruction long and its
//!    mnemonic feeds the error histogram.

use std::time::Duration;

use tracing::debug;

use crate::code::{CodeBlock, CodeFragment};
use crate::common::Result;
use crate::config::Config;
use crate::isg::MultiGenerator;
use crate::pipeline::{CodeCheckStage, CodeCompareStage, CodeRequest, CompareOutput, RefCovOutput};
use crate::runner::{RunnerOutcome, Stage, StageDir, StageResult};
use crate::stats::MinimizeStats;

/// Deadline used for the individual probe runs during reduction.
const REDUCE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a delta reduction.
#[derive(Debug, Clone)]
pub struct Reduction<T> {
    /// Longest known-passing prefix length.
    pub good: usize,
    /// Shortest known-failing prefix length.
    pub bad: usize,
    /// The block of the failing prefix.
    pub bad_code: CodeBlock,
    /// The stage result observed on the failing prefix.
    pub bad_result: StageResult<T>,
}

/// Bisects the shortest failing payload prefix.
///
/// `check` runs a candidate block and classifies it; any non-COMPLETE
/// outcome counts as failing. `good == 0` does not mean the reduction
/// failed — it means the very first fragment is the culprit.
pub fn delta_code_reduction<T, F>(mut check: F, code: &CodeBlock) -> Reduction<T>
where
    F: FnMut(&CodeBlock) -> StageResult<T>,
{
    let end = code.main_len();
    let mut good = 0usize;
    let mut bad = end;
    let mut test = bad / 2;

    let mut bad_code = code.clone();
    let mut bad_result = StageResult::invalid();

    while bad - good > 1 {
        debug_assert!(test <= end);
        let test_code = code.part(0, test);
        let ret = check(&test_code);
        if ret.is_complete() {
            debug!(good, bad, test, "prefix passes");
            good = test;
            test += (bad - good) / 2;
        } else {
            debug!(good, bad, test, "prefix fails");
            bad = test;
            bad_code = test_code;
            bad_result = ret;
            test -= (bad - good) / 2;
        }
    }

    Reduction {
        good,
        bad,
        bad_code,
        bad_result,
    }
}

/// Builds and tests the minimized witness for a reduced failure.
///
/// `check` must yield the reference machine state of the passing prefix;
/// `compare` runs the rebuilt block through the differential pipeline. The
/// caller adopts the minimized block only when the returned result is
/// ERROR (the witness still fails, as wanted).
pub fn code_minimize<C, V>(
    mut check: C,
    mut compare: V,
    code: &CodeBlock,
    good: usize,
    bad: usize,
) -> (StageResult<CompareOutput>, CodeBlock)
where
    C: FnMut(&CodeBlock) -> StageResult<RefCovOutput>,
    V: FnMut(&CodeBlock) -> StageResult<CompareOutput>,
{
    // the passing prefix reproduces the pre-failure machine state
    let good_code = code.part(0, good);
    let probe = check(&good_code);
    let Some(refcov) = probe.payload else {
        // no reference state, no minimization; INVALID keeps the caller on
        // the reduction result
        return (
            StageResult::new(
                RunnerOutcome::Invalid,
                None,
                format!("state probe failed: {} {}", probe.outcome, probe.detail),
            ),
            code.clone(),
        );
    };

    let mut minimized = CodeBlock {
        init: refcov.state.as_assembly(),
        main: Default::default(),
        deinit: good_code.deinit.clone(),
    };
    minimized.add(CodeFragment::new("    // INSTRUCTION"));
    for fragment in code.main.part(good, bad).as_slice() {
        minimized.add(fragment.clone());
    }

    let ret = compare(&minimized);
    (ret, minimized)
}

/// Per-iteration input of the minimize stage.
#[derive(Debug, Clone)]
pub struct MinimizeRequest {
    /// The program under test.
    pub block: CodeBlock,
    /// Deadline applied to the primary run.
    pub timeout: Duration,
}

/// How far a block got through the reduction funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeStatus {
    Executed,
    Reduced,
    Minimized,
}

impl CodeStatus {
    fn as_str(self) -> &'static str {
        match self {
            CodeStatus::Executed => "0: executed",
            CodeStatus::Reduced => "1: reduced",
            CodeStatus::Minimized => "2: minimized",
        }
    }
}

/// Differential test of a block, with automatic reduction and minimization
/// of failures.
pub struct MinimizeStage {
    dir: StageDir,
    compare: CodeCompareStage,
    check: CodeCheckStage,
    stats: MinimizeStats,
    status: CodeStatus,
    error_cause: String,
    block: CodeBlock,
    result_block: CodeBlock,
    timeout: Duration,
}

impl MinimizeStage {
    /// Builds the nested compare and check pipelines.
    ///
    /// The state-probe check pipeline runs without coverage; it only exists
    /// to capture reference register values.
    pub fn new(config: &Config) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Minimize", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let compare = CodeCompareStage::new(&subconfig)?;
        let check = CodeCheckStage::new(&subconfig, false)?;
        Ok(Self {
            dir,
            compare,
            check,
            stats: MinimizeStats::default(),
            status: CodeStatus::Executed,
            error_cause: "unknown".to_string(),
            block: CodeBlock::new(),
            result_block: CodeBlock::new(),
            timeout: REDUCE_TIMEOUT,
        })
    }

    /// The block the last iteration settled on (reduced or minimized).
    pub fn result_block(&self) -> &CodeBlock {
        &self.result_block
    }

    /// Funnel statistics so far.
    pub fn stats(&self) -> &MinimizeStats {
        &self.stats
    }

    /// The mnemonic of the offending instruction: first token of the last
    /// line of the first failing fragment.
    fn extract_bad_mnemonic(block: &CodeBlock, good: usize) -> Option<String> {
        let fragment = block.main.as_slice().get(good)?;
        let last_line = fragment.as_code().trim().lines().next_back()?;
        last_line.split_whitespace().next().map(str::to_string)
    }
}

impl Stage for MinimizeStage {
    type Input = MinimizeRequest;
    type Output = CompareOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: MinimizeRequest) -> StageResult<CompareOutput> {
        self.block = request.block;
        self.timeout = request.timeout;
        self.error_cause = "unknown".to_string();
        self.result_block = self.block.clone();
        self.status = CodeStatus::Executed;
        self.stats.tests += 1;

        let ret = self
            .compare
            .run(CodeRequest::new(self.block.as_code(), request.timeout));

        match ret.outcome {
            RunnerOutcome::Complete => {
                self.stats.completes += 1;
                return ret;
            }
            RunnerOutcome::Ignore => {
                self.stats.ignores += 1;
                return ret;
            }
            RunnerOutcome::Timeout => {
                self.stats.timeouts += 1;
                return ret;
            }
            RunnerOutcome::Error => {}
            _ => {
                // paranoia fallback: surface unknown outcomes untouched
                self.stats.unknown_faults += 1;
                return ret;
            }
        }
        self.stats.errors += 1;

        // shrink the failing payload to the shortest failing prefix
        let compare = &mut self.compare;
        let reduction = delta_code_reduction(
            |candidate| compare.run(CodeRequest::new(candidate.as_code(), REDUCE_TIMEOUT)),
            &self.block,
        );
        self.stats.reductions += 1;
        self.status = CodeStatus::Reduced;
        self.result_block = reduction.bad_code.clone();

        // rebuild as state-restore + failing fragment
        let check = &mut self.check;
        let compare = &mut self.compare;
        let timeout = request.timeout;
        let (ret_minimize, minimized) = code_minimize(
            |candidate| check.run(CodeRequest::new(candidate.as_code(), timeout)),
            |candidate| compare.run(CodeRequest::new(candidate.as_code(), timeout)),
            &self.block,
            reduction.good,
            reduction.bad,
        );
        if ret_minimize.outcome != RunnerOutcome::Error {
            // minimization lost the failure; keep the reduced form
            return reduction.bad_result;
        }
        self.stats.minimizations += 1;
        self.status = CodeStatus::Minimized;
        self.result_block = minimized;

        if let Some(mnemonic) = Self::extract_bad_mnemonic(&self.block, reduction.good) {
            *self.stats.instr_errors.entry(mnemonic.clone()).or_insert(0) += 1;
            self.error_cause = mnemonic;
        }

        ret_minimize
    }

    fn task_post(&mut self, ret: StageResult<CompareOutput>) -> StageResult<CompareOutput> {
        self.dir
            .log_write("code_status.log", &format!("{}\n", self.status.as_str()));
        self.dir.log_write("stats.log", &self.stats.to_string());

        if let Err(e) = self.block.save(&self.dir.path().join("code_block.json")) {
            tracing::warn!(error = %e, "cannot persist code block");
        }
        if let Err(e) = self
            .result_block
            .save(&self.dir.path().join("res_code_block.json"))
        {
            tracing::warn!(error = %e, "cannot persist result block");
        }

        if ret.outcome != RunnerOutcome::Error {
            return ret;
        }

        // re-run the winning block so the archiver captures a matching tree
        self.compare
            .run(CodeRequest::new(self.result_block.as_code(), self.timeout))
    }

    fn error_cause(&self) -> String {
        self.error_cause.clone()
    }
}

/// Per-iteration input of the one-shot fuzz-and-minimize stage.
#[derive(Debug, Clone)]
pub struct FuzzMinimizeRequest {
    /// Minimum payload fragments of the generated block.
    pub min_fragments: usize,
    /// Maximum payload fragments of the generated block.
    pub max_fragments: usize,
    /// Deadline applied to each subprocess.
    pub timeout: Duration,
}

/// Generates one random block per iteration and feeds it to the minimizer.
pub struct FuzzMinimizeStage {
    dir: StageDir,
    generator: MultiGenerator,
    minimize: MinimizeStage,
}

impl FuzzMinimizeStage {
    /// Builds the generator set and the nested minimize stage.
    pub fn new(config: &Config) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "FuzzMinimize", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        Ok(Self {
            dir,
            generator: MultiGenerator::for_config(config)?,
            minimize: MinimizeStage::new(&subconfig)?,
        })
    }

    /// The block the last iteration settled on.
    pub fn result_block(&self) -> &CodeBlock {
        self.minimize.result_block()
    }

    /// Funnel statistics so far.
    pub fn stats(&self) -> &MinimizeStats {
        self.minimize.stats()
    }
}

impl Stage for FuzzMinimizeStage {
    type Input = FuzzMinimizeRequest;
    type Output = CompareOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: FuzzMinimizeRequest) -> StageResult<CompareOutput> {
        let block = match self
            .generator
            .gen_block(request.min_fragments, request.max_fragments)
        {
            Ok(block) => block,
            Err(e) => return StageResult::error(format!("generation failed: {e}")),
        };
        self.minimize.run(MinimizeRequest {
            block,
            timeout: request.timeout,
        })
    }

    fn error_cause(&self) -> String {
        self.minimize.error_cause()
    }
}
