//! # Simulator Output Parser Tests
//!
//! The stderr/stdout scrapers for the reference simulator and GDB, and the
//! coverage report fold.

use crate::common::test_config;
use rvvfuzz_core::common::reg::GPR_NAMES;
use rvvfuzz_core::runner::Stage;
use rvvfuzz_core::sim::{CoverageStage, GdbStage, SpikeStage};

/// A spike `-d` session tail: PC print followed by the register dump.
fn spike_stderr() -> String {
    let mut out = String::from(": \n0x0000000080000004\n");
    for (i, name) in GPR_NAMES.iter().enumerate() {
        // spike prints s0, not fp
        let name = if *name == "fp" { "s0" } else { name };
        out.push_str(&format!("{name}: {i:#018x}  "));
        if i % 4 == 3 {
            out.push('\n');
        }
    }
    out
}

#[test]
fn spike_register_parse() {
    let (xregs, pc) = SpikeStage::parse_registers(&spike_stderr()).expect("parse");
    assert_eq!(pc, 0x8000_0004);
    for (i, &value) in xregs.iter().enumerate() {
        assert_eq!(value, i as u64);
    }
}

#[test]
fn spike_parse_rejects_garbage() {
    assert!(SpikeStage::parse_registers("no registers here").is_err());
    assert!(SpikeStage::parse_registers("0x4\nzero: 0x0 ra: 0x1").is_err());
}

/// A `info registers general` listing: name, hex, decimal columns.
fn gdb_stdout() -> String {
    let mut out = String::from("(gdb) continuing\n");
    for (i, name) in GPR_NAMES.iter().enumerate() {
        out.push_str(&format!("{name}           {i:#x}      {i}\n"));
    }
    out.push_str("pc            0x80000004      2147483652\n");
    out
}

#[test]
fn gdb_register_parse() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let stage = GdbStage::new(&config, config.memory.breakpoint()).expect("gdb stage");

    let (xregs, pc) = stage.parse_registers(&gdb_stdout()).expect("parse");
    assert_eq!(pc, 0x8000_0004);
    for (i, &value) in xregs.iter().enumerate() {
        assert_eq!(value, i as u64);
    }
}

#[test]
fn gdb_parse_masks_to_xlen() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(tmp.path());
    config.isa.xlen = 32;
    config.isa.rv_extensions = String::new();
    let stage = GdbStage::new(&config, config.memory.breakpoint()).expect("gdb stage");

    let mut listing = gdb_stdout();
    // a sign-extended 64-bit print of a 32-bit register
    listing = listing.replace("ra           0x1      1", "ra 0xffffffff80000000 x");
    let (xregs, _) = stage.parse_registers(&listing).expect("parse");
    assert_eq!(xregs[1], 0x8000_0000);
}

#[test]
fn gdb_command_file_contract() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let stage = GdbStage::new(&config, config.memory.breakpoint()).expect("gdb stage");

    let script =
        std::fs::read_to_string(stage.dir().path().join("cmdin.gdb")).expect("cmdin.gdb");
    assert!(script.contains("set architecture riscv:rv64"));
    assert!(script.contains("target remote localhost:3333"));
    assert!(script.contains("set $pc = 0x80000000"));
    assert!(script.contains("break *0x80000004"));
    // two continues: the second lets the dump epilogue finish
    assert_eq!(script.matches("cont\n").count(), 2);
    assert!(script.contains("dump binary memory"));
    assert!(script.contains("0x80000000 0x80004000"));
}

#[test]
fn spike_command_file_contract() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let _stage = SpikeStage::new(&config, config.memory.breakpoint()).expect("spike stage");

    let dirs: Vec<_> = std::fs::read_dir(tmp.path())
        .expect("read_dir")
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("Spike"))
        .collect();
    assert_eq!(dirs.len(), 1);
    let script =
        std::fs::read_to_string(dirs[0].path().join("cmdin.spike")).expect("cmdin.spike");
    assert_eq!(script.matches("until pc 0 0x80000004").count(), 2);
    assert!(script.contains("reg 0"));
    assert!(script.contains("rs 1"));
    assert!(script.ends_with("dump\nquit\n"));
}

#[test]
fn coverage_report_fold() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let stage = CoverageStage::new(&config, config.memory.breakpoint()).expect("coverage stage");

    let report_path = tmp.path().join("cov_report.log");
    let mut report = String::new();
    // enough preamble that only the tail window reaches the parser
    for i in 0..64 {
        report.push_str(&format!("simulated block {i}\n"));
    }
    report.push_str("Coverage points hit : 123/4567 : 2.69%\n");
    report.push_str("Unique instructions : 45/200 : 22.5%\n");
    std::fs::write(&report_path, report).expect("write report");

    let parsed = stage.extract_coverage(&report_path).expect("parse");
    let coverage = parsed.coverage.expect("coverage entry");
    assert_eq!(coverage.points, 123);
    assert_eq!(coverage.points_max, 4567);
    assert!((coverage.percent - 2.69).abs() < 1e-9);
    assert_eq!(coverage.kind, "basic_V");

    let instr = parsed.instr_coverage.expect("instr entry");
    assert_eq!(instr.points, 45);
    assert_eq!(instr.kind, "uniq_instr");
}

#[test]
fn coverage_report_without_summary_is_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(tmp.path());
    let stage = CoverageStage::new(&config, config.memory.breakpoint()).expect("coverage stage");

    let report_path = tmp.path().join("cov_report.log");
    std::fs::write(&report_path, "nothing to see\n").expect("write report");
    let parsed = stage.extract_coverage(&report_path).expect("parse");
    assert!(parsed.coverage.is_none());
    assert!(parsed.instr_coverage.is_none());
}
