//! QEMU DUT wrapper.
//!
//! Launches `qemu-system-riscv{32,64}` on the `spike` machine model,
//! suspended (`-S`) with a GDB stub on the configured port; the binary is
//! passed as `-bios` at run time and execution is driven entirely by the
//! attached GDB session.

use crate::common::Result;
use crate::config::Config;
use crate::runner::{ProcessStage, StageDir};

/// Builds the QEMU process stage for the configured ISA.
pub fn qemu_stage(config: &Config) -> Result<ProcessStage> {
    let dir = StageDir::indexed(&config.general.dir, "QEMU", config.general.log)?;
    dir.log_write("init_config.log", &format!("{config:?}\n"));

    let isa = &config.isa;
    let qemu_bin = format!("qemu-system-riscv{}", isa.xlen);
    let qemu_bin = if config.tools.qemu_path.is_empty() {
        qemu_bin
    } else {
        format!("{}/{}", config.tools.qemu_path, qemu_bin)
    };

    let mut cpu = format!("rv{}", isa.xlen);
    if isa.has_vector() {
        cpu.push_str(&format!(
            ",v=true,vlen={},elen={}",
            isa.vector_vlen, isa.vector_elen
        ));
    }

    let program = vec![
        qemu_bin,
        "-M".to_string(),
        "spike".to_string(),
        "-cpu".to_string(),
        cpu,
        "-display".to_string(),
        "none".to_string(),
        "-serial".to_string(),
        "mon:stdio".to_string(),
        "-gdb".to_string(),
        format!("tcp::{}", config.tools.debug_port),
        "-S".to_string(),
    ];
    Ok(ProcessStage::new(dir, program))
}
