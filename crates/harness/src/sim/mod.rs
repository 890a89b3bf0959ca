//! External simulator adapters.
//!
//! Every simulator in the pipeline is an opaque subprocess characterized by
//! its command line and its output contract:
//! 1. **Reference:** Spike, driven by a debug-command script ([`spike`]).
//! 2. **DUT:** QEMU ([`qemu`]) or tiny-vp ([`vp`]), launched suspended and
//!    driven over the GDB remote protocol ([`gdb`]).
//! 3. **Coverage:** riscvOVPsim with its coverage report fold ([`ovpsim`]).
//!
//! Each adapter reconstructs a [`MachineState`](crate::state::MachineState)
//! (or a coverage report) from the simulator's output and the dumped memory
//! image.

pub mod gdb;
pub mod ovpsim;
pub mod qemu;
pub mod spike;
pub mod vp;

use std::path::PathBuf;
use std::time::Duration;

pub use gdb::{DutGdbStage, GdbStage};
pub use ovpsim::{Coverage, CoverageEntry, CoverageReport, CoverageStage};
pub use spike::SpikeStage;

/// Per-iteration input shared by all simulator stages: run this binary.
#[derive(Debug, Clone)]
pub struct RunBinary {
    /// The ELF to execute.
    pub binary: PathBuf,
    /// Deadline for the whole run.
    pub timeout: Duration,
}

impl RunBinary {
    /// A run request.
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}
