//! # Program Assembly Tests
//!
//! The emitted linker script and the prologue/epilogue structure of the
//! assembled program. The toolchain itself is not exercised — a bogus
//! compiler path turns the subprocess step into an immediate ERROR while
//! `program.S` is still written and inspectable.

use std::time::Duration;

use crate::common::test_config;
use rvvfuzz_core::build::{BuildRequest, BuildStage};
use rvvfuzz_core::config::Config;
use rvvfuzz_core::runner::{RunnerOutcome, Stage};

fn build_and_read_program(config: &Config, code: &str) -> String {
    let binary = config.general.dir.join("out.bin");
    let mut stage = BuildStage::new(config, &binary).expect("build stage");
    let result = stage.run(BuildRequest::new(code, Duration::from_secs(1)));
    // the configured compiler does not exist; assembly happened anyway
    assert_eq!(result.outcome, RunnerOutcome::Error);
    std::fs::read_to_string(stage.dir().path().join("program.S")).expect("program.S")
}

fn unreal_toolchain(config: &mut Config) {
    config.tools.gcc_bin = "/nonexistent/riscv64-unknown-elf-gcc".to_string();
}

#[test]
fn linker_script_covers_the_text_window() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let binary = config.general.dir.join("out.bin");
    let stage = BuildStage::new(&config, &binary).expect("build stage");

    assert_eq!(stage.breakpoint(), 0x8000_0004);

    let script =
        std::fs::read_to_string(stage.dir().path().join("linker.lds")).expect("linker.lds");
    assert!(script.contains("OUTPUT_ARCH( \"riscv\" )"));
    // text length excludes the dump reserve
    assert!(script.contains("org = 0x80000000, len = 0x1000"));
    assert!(script.contains("ENTRY(_start)"));
}

#[test]
fn program_structure_with_float_and_vector() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    unreal_toolchain(&mut config);

    let program = build_and_read_program(&config, "    addi x1, x0, 1");
    let pos = |needle: &str| {
        program
            .find(needle)
            .unwrap_or_else(|| panic!("missing {needle:?}"))
    };

    // entry slots: _start jumps to _begin, _stop (the breakpoint) to _end
    assert!(pos("_start:") < pos("_stop:"));
    assert!(program.contains("j _begin"));
    assert!(program.contains("j _end"));
    assert!(program.contains("tohost: .dword 0"));
    assert!(program.contains("fromhost: .dword 0"));

    // prologue: dump pointer, feature enables, FP init, vl reset, poison
    let begin = pos("_begin:");
    assert!(begin < pos("li gp, 0x80001000"));
    assert!(program.contains("csrw mscratch, gp"));
    assert!(program.contains("li t1, 0x6000   # MSTATUS_FS"));
    assert!(program.contains("li t1, 0x600    # MSTATUS_VS"));
    assert!(program.contains("fcvt.d.w f31, zero"));
    assert!(program.contains("vsetvli t0, zero, e8, ta, ma"));
    assert!(pos("li x1, 1\n") < pos("# start of test code"));
    assert!(program.contains("li x31, 31"));

    // the body sits between prologue and epilogue
    let body = pos("addi x1, x0, 1");
    assert!(pos("# start of test code") < body);
    assert!(body < pos("_after_last_instr:"));

    // epilogue records the last test PC and parks on the breakpoint
    let tail = pos("_after_last_instr:");
    assert!(tail < pos("la   x5, _after_last_instr"));
    assert!(program.contains("addi x5, x5, -4"));
    assert!(program.rfind("j _stop").expect("j _stop") > tail);

    // no trap handling was requested
    assert!(!program.contains("_exc_handler:"));
}

#[test]
fn skip_on_exception_installs_a_counting_handler() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    unreal_toolchain(&mut config);
    config.general.skip_on_exception = true;

    let program = build_and_read_program(&config, "    addi x1, x0, 1");
    assert!(program.contains("_exc_handler:"));
    assert!(program.contains("csrw mtvec, t0"));
    assert!(program.contains("csrw mie, t0"));
    assert!(program.contains("csrr x5, mepc"));
    assert!(program.contains("addi x6, x6, 1"));
    // skip mode resumes behind the faulting instruction
    assert!(program.contains("csrw mepc, x5"));
    assert!(program.contains("mret"));
}

#[test]
fn stop_on_exception_parks_on_the_breakpoint() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    unreal_toolchain(&mut config);
    config.general.stop_on_exception = true;

    let program = build_and_read_program(&config, "    addi x1, x0, 1");
    assert!(program.contains("_exc_handler:"));
    assert!(!program.contains("mret"));
    assert!(!program.contains("csrw mepc"));
}

#[test]
fn bare_rv32_program_skips_float_and_vector() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    unreal_toolchain(&mut config);
    config.isa.xlen = 32;
    config.isa.rv_extensions = String::new();

    let program = build_and_read_program(&config, "    addi x1, x0, 1");
    assert!(!program.contains("fcvt"));
    assert!(!program.contains("vsetvli"));
    assert!(!program.contains("MSTATUS_FS"));
    // 32-bit stores into the dump region
    assert!(program.contains("sw x5, 0(gp)"));
}

#[test]
fn regstate_override_replaces_the_body() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    unreal_toolchain(&mut config);

    let binary = config.general.dir.join("out.bin");
    let mut stage = BuildStage::new(&config, &binary).expect("build stage");
    let values: Vec<u64> = (0..32).map(|i| 0x100 + i).collect();
    let result = stage.run(BuildRequest {
        code: "    addi x1, x0, 1".to_string(),
        regstate: Some(values),
        timeout: Duration::from_secs(1),
    });
    assert_eq!(result.outcome, RunnerOutcome::Error);

    let program =
        std::fs::read_to_string(stage.dir().path().join("program.S")).expect("program.S");
    assert!(program.contains("li x31, 0x11f"));
    assert!(!program.contains("addi x1, x0, 1"));
}

#[test]
fn quad_float_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    config.isa.rv_extensions = "mafdqv".to_string();
    let binary = config.general.dir.join("out.bin");
    assert!(BuildStage::new(&config, &binary).is_err());
}
