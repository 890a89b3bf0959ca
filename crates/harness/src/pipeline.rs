//! Stage compositions: build, run, compare.
//!
//! Four composed stages connect the leaf adapters into the pipelines the
//! fuzzer and minimizer drive:
//! 1. **`RefCovStage`:** Reference simulator and coverage engine on the
//!    same binary, in parallel.
//! 2. **`CompareStage`:** `RefCovStage` and the DUT in parallel, then
//!    machine-state comparison with the coverage table folded into the
//!    report.
//! 3. **`CodeCheckStage`:** Build → `RefCovStage`; validates a program and
//!    yields the reference state plus coverage.
//! 4. **`CodeCompareStage`:** Build → `CompareStage`; the full differential
//!    test of one program, with build failures optionally downgraded to
//!    IGNORE.
//!
//! Parallel sub-results fold set-wise by outcome priority: any TIMEOUT wins
//! over ERROR, which wins over everything below.

use std::path::PathBuf;
use std::time::Duration;

use crate::build::{BuildRequest, BuildStage};
use crate::common::Result;
use crate::config::Config;
use crate::runner::{RunnerOutcome, Stage, StageDir, StageResult, Worker};
use crate::sim::{Coverage, CoverageStage, DutGdbStage, RunBinary, SpikeStage};
use crate::state::MachineState;

/// Reference state plus coverage of one run.
#[derive(Debug, Clone)]
pub struct RefCovOutput {
    /// Terminal state on the reference simulator.
    pub state: MachineState,
    /// Coverage results, when the engine is enabled.
    pub coverage: Option<Coverage>,
}

/// Folds two sub-outcomes by severity: TIMEOUT > ERROR.
fn compose_failure(a: RunnerOutcome, b: RunnerOutcome) -> RunnerOutcome {
    if a == RunnerOutcome::Timeout || b == RunnerOutcome::Timeout {
        RunnerOutcome::Timeout
    } else {
        RunnerOutcome::Error
    }
}

/// Reference and coverage engine running the same binary in parallel.
pub struct RefCovStage {
    dir: StageDir,
    reference: Worker<SpikeStage>,
    coverage: Option<Worker<CoverageStage>>,
}

impl RefCovStage {
    /// Builds the reference worker, and the coverage worker when enabled.
    pub fn new(config: &Config, breakpoint: u64, with_coverage: bool) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "RefCov", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let reference = Worker::spawn(SpikeStage::new(&subconfig, breakpoint)?);
        let coverage = if with_coverage {
            Some(Worker::spawn(CoverageStage::new(&subconfig, breakpoint)?))
        } else {
            None
        };
        Ok(Self {
            dir,
            reference,
            coverage,
        })
    }
}

impl Stage for RefCovStage {
    type Input = RunBinary;
    type Output = RefCovOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: RunBinary) -> StageResult<RefCovOutput> {
        let _ = self.reference.start(request.clone());
        if let Some(coverage) = &self.coverage {
            let _ = coverage.start(request);
        }
        self.reference.wait();
        if let Some(coverage) = &self.coverage {
            coverage.wait();
        }

        let ref_result = self.reference.result();
        let cov_result = self
            .coverage
            .as_ref()
            .map(|coverage| coverage.result())
            .unwrap_or_else(|| StageResult::complete(Coverage::default()));

        if !ref_result.is_complete() || !cov_result.is_complete() {
            return StageResult::new(
                compose_failure(ref_result.outcome, cov_result.outcome),
                None,
                format!(
                    "ref: {} {}\ncov: {} {}",
                    ref_result.outcome, ref_result.detail, cov_result.outcome, cov_result.detail
                ),
            );
        }

        let Some(state) = ref_result.payload else {
            return StageResult::error("reference produced no state");
        };
        let coverage = if self.coverage.is_some() {
            cov_result.payload
        } else {
            None
        };
        StageResult::complete(RefCovOutput { state, coverage })
    }
}

/// Product of a full differential comparison.
#[derive(Debug, Clone)]
pub struct CompareOutput {
    /// True when reference and DUT agree on every field.
    pub equal: bool,
    /// The diff table, with the coverage table appended.
    pub report: String,
    /// Coverage results of the run.
    pub coverage: Option<Coverage>,
    /// Terminal state on the reference.
    pub ref_state: MachineState,
    /// Terminal state on the DUT.
    pub dut_state: MachineState,
}

/// Reference+coverage and DUT in parallel, then state comparison.
pub struct CompareStage {
    dir: StageDir,
    refcov: Worker<RefCovStage>,
    dut: Worker<DutGdbStage>,
}

impl CompareStage {
    /// Builds both pipeline halves as worker threads.
    pub fn new(config: &Config, breakpoint: u64, with_coverage: bool) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Compare", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let refcov = Worker::spawn(RefCovStage::new(&subconfig, breakpoint, with_coverage)?);
        let dut = Worker::spawn(DutGdbStage::new(&subconfig, breakpoint)?);
        Ok(Self { dir, refcov, dut })
    }
}

impl Stage for CompareStage {
    type Input = RunBinary;
    type Output = CompareOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: RunBinary) -> StageResult<CompareOutput> {
        let _ = self.refcov.start(request.clone());
        let _ = self.dut.start(request);
        self.refcov.wait();
        self.dut.wait();

        let refcov_result = self.refcov.result();
        let dut_result = self.dut.result();

        if !refcov_result.is_complete() || !dut_result.is_complete() {
            return StageResult::new(
                compose_failure(refcov_result.outcome, dut_result.outcome),
                None,
                format!(
                    "refcov: {} {}\ndut: {} {}",
                    refcov_result.outcome,
                    refcov_result.detail,
                    dut_result.outcome,
                    dut_result.detail
                ),
            );
        }

        let (Some(refcov), Some(dut_state)) = (refcov_result.payload, dut_result.payload) else {
            return StageResult::error("comparison inputs missing");
        };

        let (equal, mut report) = refcov.state.compare(&dut_state);
        if let Some(coverage) = &refcov.coverage {
            report.push_str(&coverage.render_table());
        }

        let outcome = if equal {
            RunnerOutcome::Complete
        } else {
            RunnerOutcome::Error
        };
        StageResult::new(
            outcome,
            Some(CompareOutput {
                equal,
                report: report.clone(),
                coverage: refcov.coverage,
                ref_state: refcov.state,
                dut_state,
            }),
            report,
        )
    }
}

/// Per-iteration input of the code-level stages.
#[derive(Debug, Clone)]
pub struct CodeRequest {
    /// The program body to build and run.
    pub code: String,
    /// Deadline applied to each subprocess.
    pub timeout: Duration,
}

impl CodeRequest {
    /// A request for `code`.
    pub fn new(code: impl Into<String>, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            timeout,
        }
    }
}

/// Build → reference+coverage: validates a program.
pub struct CodeCheckStage {
    dir: StageDir,
    binary: PathBuf,
    build: BuildStage,
    refcov: RefCovStage,
}

impl CodeCheckStage {
    /// Builds the nested build and run stages.
    pub fn new(config: &Config, with_coverage: bool) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "CodeCheck", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let binary = dir.path().join("out.bin");
        let build = BuildStage::new(&subconfig, &binary)?;
        let refcov = RefCovStage::new(&subconfig, build.breakpoint(), with_coverage)?;
        Ok(Self {
            dir,
            binary,
            build,
            refcov,
        })
    }
}

impl Stage for CodeCheckStage {
    type Input = CodeRequest;
    type Output = RefCovOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: CodeRequest) -> StageResult<RefCovOutput> {
        let build_result = self
            .build
            .run(BuildRequest::new(request.code, request.timeout));
        if !build_result.is_complete() {
            return build_result.cast_failure();
        }
        self.refcov
            .run(RunBinary::new(self.binary.clone(), request.timeout))
    }
}

/// Build → compare: the full differential test of one program.
pub struct CodeCompareStage {
    dir: StageDir,
    binary: PathBuf,
    build: BuildStage,
    compare: CompareStage,
    build_ignore_error: bool,
}

impl CodeCompareStage {
    /// Builds the nested build and compare stages.
    pub fn new(config: &Config) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "CodeCompare", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let binary = dir.path().join("out.bin");
        let build = BuildStage::new(&subconfig, &binary)?;
        let compare = CompareStage::new(&subconfig, build.breakpoint(), true)?;
        Ok(Self {
            dir,
            binary,
            build,
            compare,
            build_ignore_error: config.general.build_ignore_error,
        })
    }
}

impl Stage for CodeCompareStage {
    type Input = CodeRequest;
    type Output = CompareOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: CodeRequest) -> StageResult<CompareOutput> {
        let build_result = self
            .build
            .run(BuildRequest::new(request.code, request.timeout));
        if !build_result.is_complete() {
            if self.build_ignore_error && build_result.outcome == RunnerOutcome::Error {
                // assembler-rejected nonsense must not derail a campaign
                return StageResult::ignore(build_result.detail);
            }
            return build_result.cast_failure();
        }
        self.compare
            .run(RunBinary::new(self.binary.clone(), request.timeout))
    }
}
