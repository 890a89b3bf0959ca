//! # Configuration Tests
//!
//! Defaults, derived values, validation, and JSON deserialization.

use rvvfuzz_core::Config;
use rvvfuzz_core::config::{CoverMetric, DutKind};

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.isa.xlen, 64);
    assert_eq!(config.isa.rv_extensions, "mafdcv");
    assert_eq!(config.isa.vector_vlen, 512);
    assert_eq!(config.isa.vector_elen, 64);
    assert_eq!(config.memory.memstart, 0x8000_0000);
    assert_eq!(config.memory.dumpfile_reserve, 0x1000);
    assert_eq!(config.coverage.metric, CoverMetric::Basic);
    assert_eq!(config.dut, DutKind::Qemu);
    assert!(config.general.build_ignore_error);
    assert!(config.isa.validate().is_ok());
}

#[test]
fn derived_values() {
    let config = Config::default();
    assert_eq!(config.isa.xlenb(), 8);
    assert_eq!(config.isa.vlenb(), 64);
    assert_eq!(config.isa.flen(), 64);
    assert!(config.isa.has_float());
    assert!(config.isa.has_vector());

    assert_eq!(
        config.memory.dump_addr(),
        config.memory.xmemstart + config.memory.xmemlen - config.memory.dumpfile_reserve
    );
    assert_eq!(config.memory.breakpoint(), config.memory.xmemstart + 4);
}

#[test]
fn flen_follows_widest_extension() {
    let mut config = Config::default();
    config.isa.rv_extensions = "f".to_string();
    assert_eq!(config.isa.flen(), 32);
    config.isa.rv_extensions = "fd".to_string();
    assert_eq!(config.isa.flen(), 64);
    config.isa.rv_extensions = "m".to_string();
    assert_eq!(config.isa.flen(), 0);
    assert!(!config.isa.has_float());
}

#[test]
fn validation_rejects_unsupported() {
    let mut config = Config::default();
    config.isa.xlen = 128;
    assert!(config.isa.validate().is_err());

    let mut config = Config::default();
    config.isa.rv_extensions = "mafdqv".to_string();
    assert!(config.isa.validate().is_err());

    let mut config = Config::default();
    config.isa.rv_extensions = "mz".to_string();
    assert!(config.isa.validate().is_err());
}

#[test]
fn json_roundtrip_with_partial_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "isa": { "xlen": 32, "rv_extensions": "m" },
            "coverage": { "metric": "mnemonic" },
            "dut": "TinyVp"
        }"#,
    )
    .expect("write config");

    let config = Config::from_json_file(&path).expect("load config");
    assert_eq!(config.isa.xlen, 32);
    assert_eq!(config.isa.rv_extensions, "m");
    // unspecified sections keep their defaults
    assert_eq!(config.memory.memstart, 0x8000_0000);
    assert_eq!(config.coverage.metric, CoverMetric::Mnemonic);
    assert_eq!(config.dut, DutKind::TinyVp);
}

#[test]
fn json_rejects_invalid_isa() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "isa": { "rv_extensions": "q" } }"#).expect("write config");
    assert!(Config::from_json_file(&path).is_err());
}

#[test]
fn with_dir_reroots_only_the_dir() {
    let config = Config::default();
    let rerooted = config.with_dir(std::path::Path::new("/tmp/sub"));
    assert_eq!(rerooted.general.dir, std::path::PathBuf::from("/tmp/sub"));
    assert_eq!(rerooted.isa.xlen, config.isa.xlen);
}
