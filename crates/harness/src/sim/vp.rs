//! tiny-vp DUT wrapper.
//!
//! Launches the `tiny{32,64}-vp` SystemC virtual prototype in debug mode
//! with its GDB server on the configured port; the binary path is appended
//! at run time.

use crate::common::Result;
use crate::config::Config;
use crate::runner::{ProcessStage, StageDir};

/// Builds the tiny-vp process stage for the configured ISA.
pub fn vp_stage(config: &Config) -> Result<ProcessStage> {
    let dir = StageDir::indexed(&config.general.dir, "TinyVp", config.general.log)?;
    dir.log_write("init_config.log", &format!("{config:?}\n"));

    let vp_bin = format!("tiny{}-vp", config.isa.xlen);
    let vp_bin = if config.tools.vp_path.is_empty() {
        vp_bin
    } else {
        format!("{}/{}", config.tools.vp_path, vp_bin)
    };

    let mem = &config.memory;
    let program = vec![
        vp_bin,
        format!("--memory-start={}", mem.memstart),
        format!("--memory-size={}", mem.memlen),
        "--use-dmi".to_string(),
        "--tlm-global-quantum=1000000".to_string(),
        "--error-on-zero-traphandler=true".to_string(),
        "--intercept-syscalls".to_string(),
        "--debug-mode".to_string(),
        "--debug-port".to_string(),
        config.tools.debug_port.to_string(),
    ];
    Ok(ProcessStage::new(dir, program))
}
