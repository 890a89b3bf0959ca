//! # Coverage-Guided Loop Tests
//!
//! The extend/reduce state machine against a mock validation stage:
//! forced reduction after a long extension drought, seed persistence on
//! coverage improvement, and resumption from a persisted seed.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::common::{init_tracing, test_config};
use rvvfuzz_core::code::CodeBlock;
use rvvfuzz_core::config::{Config, IsaConfig};
use rvvfuzz_core::fuzz::{CovFuzzStage, FuzzRequest};
use rvvfuzz_core::isg::MultiGenerator;
use rvvfuzz_core::pipeline::{CodeRequest, RefCovOutput};
use rvvfuzz_core::runner::{Stage, StageDir, StageResult};
use rvvfuzz_core::sim::{Coverage, CoverageEntry, CoverageReport};
use rvvfuzz_core::state::{MachineState, ValueMode};

/// Scripted validator: maps the candidate's line count to a verdict.
struct MockValidator {
    dir: StageDir,
    verdict: Box<dyn FnMut(usize) -> Option<u64> + Send>,
}

impl MockValidator {
    fn new(parent: &std::path::Path, verdict: impl FnMut(usize) -> Option<u64> + Send + 'static) -> Self {
        let dir = StageDir::indexed(parent, "MockCheck", false).expect("dir");
        Self {
            dir,
            verdict: Box::new(verdict),
        }
    }

    fn clean_state() -> MachineState {
        let isa = IsaConfig {
            xlen: 64,
            rv_extensions: String::new(),
            vector_vlen: 128,
            vector_elen: 64,
        };
        MachineState::init(&isa, ValueMode::Zero, &mut StdRng::seed_from_u64(0))
    }
}

impl Stage for MockValidator {
    type Input = CodeRequest;
    type Output = RefCovOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: CodeRequest) -> StageResult<RefCovOutput> {
        let lines = request.code.lines().count();
        match (self.verdict)(lines) {
            Some(points) => StageResult::complete(RefCovOutput {
                state: Self::clean_state(),
                coverage: Some(Coverage {
                    current: Some(CoverageReport {
                        coverage: Some(CoverageEntry {
                            kind: "basic_V".to_string(),
                            points,
                            points_max: 10_000,
                            percent: points as f64 / 100.0,
                        }),
                        instr_coverage: None,
                    }),
                    sum: None,
                }),
            }),
            None => StageResult::error("scripted rejection"),
        }
    }
}

fn loop_with_validator(
    config: &Config,
    verdict: impl FnMut(usize) -> Option<u64> + Send + 'static,
) -> CovFuzzStage<MockValidator> {
    let dir = StageDir::fixed(&config.general.dir, "CovFuzz", config.general.log).expect("dir");
    let validator = MockValidator::new(dir.path(), verdict);
    let generator = MultiGenerator::for_config_seeded(config, 17).expect("generator");
    CovFuzzStage::with_parts(dir, validator, generator, config)
}

fn request(subiterations: u64) -> FuzzRequest {
    FuzzRequest {
        subiterations,
        min_start_fragments: 4,
        max_start_fragments: 6,
        timeout: Duration::from_secs(1),
    }
}

#[test]
fn init_stops_the_batch_early() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let mut stage = loop_with_validator(&config, |_| Some(10));

    let ret = stage.run(request(50));
    let progress = ret.payload.expect("progress");
    assert!(progress.code_len >= 4 && progress.code_len <= 6);
    assert_eq!(progress.coverage_points, 10);
    // only the init validation ran
    assert_eq!(stage.stats().generates, 1);
    assert_eq!(stage.stats().valids, 1);
}

#[test]
fn extension_drought_forces_reduction() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());

    // accept the first candidate, then only candidates at most as long;
    // every extension grows the program, so all extensions are rejected
    let mut first_len: Option<usize> = None;
    let mut stage = loop_with_validator(&config, move |lines| {
        let limit = *first_len.get_or_insert(lines);
        (lines <= limit).then_some(10)
    });

    let _ = stage.run(request(1));
    let _ = stage.run(request(150));

    let stats = stage.stats();
    assert!(stats.extensions == 0 || stats.reductions > 0);
    // after 110+ rejected extensions the machine must have reduced
    assert!(stats.reductions > 0, "never entered the reduce state");
    assert!(stage.code().expect("code").main_len() >= 1);
}

#[test]
fn seed_is_persisted_on_improvement_and_resumable() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());

    // coverage grows with program size: extensions keep being accepted
    let mut stage = loop_with_validator(&config, |lines| Some(lines as u64));
    let _ = stage.run(request(1));
    let after_init = stage.stats().coverage_points;
    assert!(after_init > 0);
    assert!(stage.seed_path().is_file(), "seed not persisted after init");

    let _ = stage.run(request(30));
    let after_extend = stage.stats().coverage_points;
    assert!(after_extend >= after_init, "coverage points regressed");
    assert!(stage.stats().extensions > 0);

    // the persisted seed matches the evolved program
    let seed = CodeBlock::load(stage.seed_path()).expect("seed");
    assert_eq!(&seed, stage.code().expect("code"));
    let seed_lines = seed.as_code().lines().count() as u64;
    assert_eq!(after_extend, seed_lines);

    // a fresh campaign in the same directory resumes from the seed
    let mut resumed = loop_with_validator(&config, |lines| Some(lines as u64));
    let ret = resumed.run(request(1));
    let progress = ret.payload.expect("progress");
    assert_eq!(progress.coverage_points, after_extend);
    assert_eq!(resumed.code().expect("code"), &seed);
    // zero further iterations: identical coverage, no churn
    assert_eq!(resumed.stats().generates, 1);
}

#[test]
fn rejected_seed_clears_the_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let mut stage = loop_with_validator(&config, |_| None);

    let ret = stage.run(request(5));
    let progress = ret.payload.expect("progress");
    assert_eq!(progress.code_len, 0);
    assert_eq!(progress.coverage_points, 0);
    assert!(stage.code().is_none());
    assert!(!stage.seed_path().exists());
}
