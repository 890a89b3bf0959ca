//! Shared test infrastructure.

use std::path::Path;

use rvvfuzz_core::Config;

/// Installs a test-local tracing subscriber (once per process).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A campaign configuration with small memory windows, rooted at `dir`.
///
/// RV64 with the full `mafdcv` extension set and a 128-bit VLEN, so every
/// state block (FP and vector included) stays tiny and fast to hash.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.dir = dir.to_path_buf();
    config.general.log = true;

    config.isa.xlen = 64;
    config.isa.rv_extensions = "mafdcv".to_string();
    config.isa.vector_vlen = 128;
    config.isa.vector_elen = 64;

    config.memory.memstart = 0x8000_0000;
    config.memory.memlen = 0x4000;
    config.memory.xmemstart = 0x8000_0000;
    config.memory.xmemlen = 0x2000;
    config.memory.dmemstart = 0x8000_2000;
    config.memory.dmemlen = 0x2000;
    config.memory.dumpfile_reserve = 0x1000;

    config
}

/// The test configuration restricted to the base integer ISA.
pub fn test_config_rv32i(dir: &Path) -> Config {
    let mut config = test_config(dir);
    config.isa.xlen = 32;
    config.isa.rv_extensions = String::new();
    config
}
