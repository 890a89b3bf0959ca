//! # Reduction Tests
//!
//! The bisection reducer against scripted predicates (including the
//! ten-fragment scenario with a deliberately broken seventh fragment) and
//! the state-prefix minimizer's block construction.

use rand::SeedableRng;
use rand::rngs::StdRng;

use rvvfuzz_core::code::{CodeBlock, CodeFragment};
use rvvfuzz_core::config::IsaConfig;
use rvvfuzz_core::pipeline::{CompareOutput, RefCovOutput};
use rvvfuzz_core::reduce::{code_minimize, delta_code_reduction};
use rvvfuzz_core::runner::{RunnerOutcome, StageResult};
use rvvfuzz_core::state::{MachineState, ValueMode};

fn block_of(n: usize) -> CodeBlock {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("_label0:"));
    for i in 0..n {
        block.add(CodeFragment::new(format!("    addi x1, x0, {i}")));
    }
    block.deinit.add(CodeFragment::new("_label1:"));
    block
}

fn zero_state() -> MachineState {
    let isa = IsaConfig {
        xlen: 64,
        rv_extensions: String::new(),
        vector_vlen: 128,
        vector_elen: 64,
    };
    MachineState::init(&isa, ValueMode::Zero, &mut StdRng::seed_from_u64(0))
}

/// Predicate failing exactly when the prefix includes fragment `bad_idx`.
fn failing_from(bad_idx: usize, outcome: RunnerOutcome) -> impl FnMut(&CodeBlock) -> StageResult<()> {
    move |candidate: &CodeBlock| {
        if candidate.main_len() > bad_idx {
            StageResult::new(outcome, None, "scripted failure")
        } else {
            StageResult::complete(())
        }
    }
}

#[test]
fn bisection_finds_the_seventh_fragment() {
    let block = block_of(10);
    // fragment index 6 (the seventh) is the culprit
    let reduction = delta_code_reduction(failing_from(6, RunnerOutcome::Error), &block);
    assert_eq!(reduction.good, 6);
    assert_eq!(reduction.bad, 7);
    assert_eq!(reduction.bad_code.main_len(), 7);
    assert_eq!(reduction.bad_result.outcome, RunnerOutcome::Error);
    // init/deinit survive the slicing untouched
    assert_eq!(reduction.bad_code.init, block.init);
    assert_eq!(reduction.bad_code.deinit, block.deinit);
}

#[test]
fn bisection_treats_timeout_as_failing() {
    let block = block_of(10);
    let reduction = delta_code_reduction(failing_from(6, RunnerOutcome::Timeout), &block);
    assert_eq!((reduction.good, reduction.bad), (6, 7));
    assert_eq!(reduction.bad_result.outcome, RunnerOutcome::Timeout);
}

#[test]
fn bisection_handles_a_failing_first_fragment() {
    let block = block_of(10);
    let reduction = delta_code_reduction(failing_from(0, RunnerOutcome::Error), &block);
    // good == 0 means the very first fragment fails, not that reduction failed
    assert_eq!((reduction.good, reduction.bad), (0, 1));
}

#[test]
fn bisection_maintains_the_invariant() {
    for bad_idx in 0..16 {
        let block = block_of(16);
        let mut probes: Vec<usize> = Vec::new();
        let reduction = delta_code_reduction(
            |candidate: &CodeBlock| {
                probes.push(candidate.main_len());
                if candidate.main_len() > bad_idx {
                    StageResult::<()>::error("scripted")
                } else {
                    StageResult::complete(())
                }
            },
            &block,
        );
        assert!(reduction.good < reduction.bad);
        assert_eq!((reduction.good, reduction.bad), (bad_idx, bad_idx + 1));
        // every probe stays inside the search interval
        assert!(probes.iter().all(|&p| p <= 16));
    }
}

#[test]
fn single_fragment_blocks_skip_the_loop() {
    let block = block_of(1);
    let reduction = delta_code_reduction(failing_from(0, RunnerOutcome::Error), &block);
    assert_eq!((reduction.good, reduction.bad), (0, 1));
    // the loop never ran, so the scripted result was never observed
    assert_eq!(reduction.bad_result.outcome, RunnerOutcome::Invalid);
}

#[test]
fn minimizer_builds_state_restore_plus_witness() {
    let block = block_of(10);
    let state = zero_state();

    let expected_init = state.as_assembly();
    let check = |_candidate: &CodeBlock| {
        StageResult::complete(RefCovOutput {
            state: state.clone(),
            coverage: None,
        })
    };
    let mut compared: Option<CodeBlock> = None;
    let compare = |candidate: &CodeBlock| {
        compared = Some(candidate.clone());
        StageResult::new(
            RunnerOutcome::Error,
            Some(CompareOutput {
                equal: false,
                report: String::new(),
                coverage: None,
                ref_state: zero_state(),
                dut_state: zero_state(),
            }),
            "still differs",
        )
    };

    let (ret, minimized) = code_minimize(check, compare, &block, 6, 7);
    assert_eq!(ret.outcome, RunnerOutcome::Error);

    // init is the captured state, main is marker + the failing fragment
    assert_eq!(minimized.init, expected_init);
    assert_eq!(minimized.main_len(), 2);
    assert_eq!(minimized.main.as_slice()[0].as_code(), "    // INSTRUCTION");
    assert_eq!(
        minimized.main.as_slice()[1].as_code(),
        "    addi x1, x0, 6"
    );
    assert_eq!(minimized.deinit, block.deinit);
    // the compare pipeline saw exactly this block
    assert_eq!(compared.expect("compare ran"), minimized);
}

#[test]
fn minimizer_without_reference_state_steps_aside() {
    let block = block_of(10);
    let check = |_candidate: &CodeBlock| StageResult::<RefCovOutput>::timeout("no state");
    let compare = |_candidate: &CodeBlock| -> StageResult<CompareOutput> {
        panic!("compare must not run without a reference state")
    };

    let (ret, minimized) = code_minimize(check, compare, &block, 6, 7);
    // INVALID keeps the caller on the reduction result
    assert_eq!(ret.outcome, RunnerOutcome::Invalid);
    assert_eq!(minimized, block);
}
