//! Configuration system for the fuzzing harness.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a fuzzing campaign. It provides:
//! 1. **Defaults:** Baseline constants (memory windows, VLEN, ports, tools).
//! 2. **Structures:** Hierarchical config for general behavior, ISA shape,
//!    memory layout, external tools, coverage, archiving, and test sets.
//! 3. **Validation:** xlen and extension-set checks performed once up front.
//!
//! Configuration is supplied as JSON (see [`Config::from_json_file`]) or use
//! `Config::default()` for a local RV64 `mafdcv` setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{HarnessError, Result};

/// Default configuration constants for the harness.
///
/// These values define the baseline campaign configuration when not
/// explicitly overridden in a JSON configuration file.
mod defaults {
    /// Base address of the simulated memory window (2 GiB).
    pub const MEMSTART: u64 = 0x8000_0000;

    /// Total length of the simulated memory window (2 MiB).
    pub const MEMLEN: u64 = 0x0020_0000;

    /// Length of the executable (text) window (1 MiB).
    ///
    /// The text window occupies the first half of the memory window; its
    /// tail holds the architectural state dump region.
    pub const XMEMLEN: u64 = 0x0010_0000;

    /// Bytes reserved at the end of the text window for the state dump.
    ///
    /// Must hold 6 xlen words, fcsr + 32 FP registers, 7 vector CSRs and
    /// 32 vector registers; 4 KiB covers VLEN up to 1024 with lots of slack.
    pub const DUMPFILE_RESERVE: u64 = 0x1000;

    /// Vector register length in bits.
    pub const VECTOR_VLEN: u32 = 512;

    /// Maximum vector element length in bits.
    pub const VECTOR_ELEN: u32 = 64;

    /// TCP port the DUT exposes for the GDB remote protocol.
    pub const DEBUG_PORT: u16 = 3333;
}

/// Coverage metric selection for the coverage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverMetric {
    /// Basic coverage points.
    #[default]
    Basic,
    /// Extended coverage points.
    Extended,
    /// Per-mnemonic coverage points.
    Mnemonic,
}

impl CoverMetric {
    /// The metric name as passed on the coverage engine command line.
    pub fn as_str(self) -> &'static str {
        match self {
            CoverMetric::Basic => "basic",
            CoverMetric::Extended => "extended",
            CoverMetric::Mnemonic => "mnemonic",
        }
    }
}

/// Device-under-test selection.
///
/// The DUT is launched suspended and driven over the GDB remote protocol;
/// both backends share the same debug-port contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum DutKind {
    /// `qemu-system-riscv{32,64}` with the `spike` machine model.
    #[default]
    Qemu,
    /// The `tiny{32,64}-vp` SystemC virtual prototype.
    TinyVp,
}

/// General campaign behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root working directory; every stage allocates its own subdirectory.
    pub dir: PathBuf,
    /// Write per-stage log artifacts (`command.log`, `stdout.log`, ...).
    pub log: bool,
    /// Abort the test program on the first exception.
    pub stop_on_exception: bool,
    /// Skip the faulting instruction (mepc + 4) and continue.
    pub skip_on_exception: bool,
    /// Treat build failures as IGNORE instead of ERROR.
    pub build_ignore_error: bool,
    /// Coverage-guided loop: accept candidates that raise exceptions.
    pub allow_exceptions: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("work"),
            log: true,
            stop_on_exception: false,
            skip_on_exception: false,
            build_ignore_error: true,
            allow_exceptions: false,
        }
    }
}

/// ISA shape of the generated programs and of all simulators.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IsaConfig {
    /// Integer register width in bits; 32 or 64.
    pub xlen: u32,
    /// Extension letters appended to `rv{32,64}i` (e.g. `"mafdcv"`).
    pub rv_extensions: String,
    /// Vector register length in bits.
    pub vector_vlen: u32,
    /// Maximum vector element width in bits.
    pub vector_elen: u32,
}

impl Default for IsaConfig {
    fn default() -> Self {
        Self {
            xlen: 64,
            rv_extensions: "mafdcv".to_string(),
            vector_vlen: defaults::VECTOR_VLEN,
            vector_elen: defaults::VECTOR_ELEN,
        }
    }
}

impl IsaConfig {
    /// Integer register width in bytes.
    pub fn xlenb(&self) -> u64 {
        u64::from(self.xlen) / 8
    }

    /// Vector register length in bytes.
    pub fn vlenb(&self) -> u64 {
        u64::from(self.vector_vlen) / 8
    }

    /// True when any floating-point extension (f, d, q) is enabled.
    pub fn has_float(&self) -> bool {
        self.rv_extensions.chars().any(|c| "fdq".contains(c))
    }

    /// True when the vector extension is enabled.
    pub fn has_vector(&self) -> bool {
        self.rv_extensions.contains('v')
    }

    /// FP register width in bits, as implied by the widest enabled extension.
    pub fn flen(&self) -> u32 {
        let mut flen = 0;
        if self.rv_extensions.contains('f') {
            flen = 32;
        }
        if self.rv_extensions.contains('d') {
            flen = 64;
        }
        if self.rv_extensions.contains('q') {
            flen = 128;
        }
        flen
    }

    /// FP register width in bytes.
    pub fn flenb(&self) -> u64 {
        u64::from(self.flen()) / 8
    }

    /// Checks xlen and the extension set.
    ///
    /// Quad-precision floating point is rejected: no reference simulator in
    /// the pipeline implements it.
    pub fn validate(&self) -> Result<()> {
        if self.xlen != 32 && self.xlen != 64 {
            return Err(HarnessError::UnsupportedXlen(self.xlen));
        }
        if self.rv_extensions.contains('q') {
            return Err(HarnessError::UnsupportedExtension('q'));
        }
        for c in self.rv_extensions.chars() {
            if !"imafdcv".contains(c) {
                return Err(HarnessError::UnsupportedExtension(c));
            }
        }
        Ok(())
    }
}

/// Guest memory layout.
///
/// The text window `[xmemstart, xmemstart+xmemlen)` holds the program and,
/// in its last `dumpfile_reserve` bytes, the state dump region. The data
/// window `[dmemstart, dmemstart+dmemlen)` is the only legal target for
/// generated stores, so programs cannot modify their own text.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Base of the whole simulated memory window.
    pub memstart: u64,
    /// Length of the whole simulated memory window.
    pub memlen: u64,
    /// Base of the executable window.
    pub xmemstart: u64,
    /// Length of the executable window.
    pub xmemlen: u64,
    /// Base of the data (store-legal) window.
    pub dmemstart: u64,
    /// Length of the data window.
    pub dmemlen: u64,
    /// Bytes reserved at the end of the executable window for the dump.
    pub dumpfile_reserve: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memstart: defaults::MEMSTART,
            memlen: defaults::MEMLEN,
            xmemstart: defaults::MEMSTART,
            xmemlen: defaults::XMEMLEN,
            dmemstart: defaults::MEMSTART + defaults::XMEMLEN,
            dmemlen: defaults::MEMLEN - defaults::XMEMLEN,
            dumpfile_reserve: defaults::DUMPFILE_RESERVE,
        }
    }
}

impl MemoryConfig {
    /// Address of the state dump region (tail of the executable window).
    pub fn dump_addr(&self) -> u64 {
        self.xmemstart + self.xmemlen - self.dumpfile_reserve
    }

    /// Breakpoint address shared by all simulators (the `_stop` slot).
    pub fn breakpoint(&self) -> u64 {
        self.xmemstart + 4
    }
}

/// Paths and ports of the external tools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// RISC-V cross compiler driver.
    pub gcc_bin: String,
    /// Reference simulator binary.
    pub spike_bin: String,
    /// Directory containing `qemu-system-riscv{32,64}`.
    pub qemu_path: String,
    /// Directory containing `tiny{32,64}-vp`.
    pub vp_path: String,
    /// Coverage engine binary.
    pub riscvovpsim_bin: String,
    /// GDB binary used to drive the DUT.
    pub gdb_bin: String,
    /// TCP port for the DUT's GDB stub.
    pub debug_port: u16,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            gcc_bin: "riscv64-unknown-elf-gcc".to_string(),
            spike_bin: "spike".to_string(),
            qemu_path: String::new(),
            vp_path: String::new(),
            riscvovpsim_bin: "riscvOVPsim.exe".to_string(),
            gdb_bin: "riscv64-unknown-elf-gdb".to_string(),
            debug_port: defaults::DEBUG_PORT,
        }
    }
}

/// Coverage engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Extension string passed to the coverage engine (`--extensions`).
    pub extensions: String,
    /// Coverage metric.
    pub metric: CoverMetric,
    /// Maintain an aggregated coverage file (`sum.out`) across runs.
    pub sum_enable: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            extensions: "V".to_string(),
            metric: CoverMetric::Basic,
            sum_enable: false,
        }
    }
}

/// Which outcomes trigger an archive copy of the wrapped stage's work dir.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive on TIMEOUT.
    pub on_timeout: bool,
    /// Archive on IGNORE.
    pub on_ignore: bool,
    /// Archive on ERROR.
    pub on_error: bool,
    /// Archive on COMPLETE.
    pub on_complete: bool,
}

/// Test-set replay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestsetConfig {
    /// Corpus root; searched recursively.
    pub dir: PathBuf,
    /// Filename pattern of persisted code blocks.
    pub pattern: String,
    /// Split loaded blocks into sub-runs of at most this many fragments.
    ///
    /// Zero or negative disables splitting (run each block at once).
    pub max_fragments_per_run: i64,
}

impl Default for TestsetConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("testset"),
            pattern: "testcase_code.json".to_string(),
            max_fragments_per_run: -1,
        }
    }
}

/// Root configuration for a fuzzing campaign.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// General campaign behavior.
    pub general: GeneralConfig,
    /// ISA shape.
    pub isa: IsaConfig,
    /// Guest memory layout.
    pub memory: MemoryConfig,
    /// External tool locations.
    pub tools: ToolsConfig,
    /// Coverage engine settings.
    pub coverage: CoverageConfig,
    /// Archive trigger set.
    pub archive: ArchiveConfig,
    /// Test-set replay settings.
    pub testset: TestsetConfig,
    /// Device under test.
    pub dut: DutKind,
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON configuration file.
    ///
    /// # Returns
    ///
    /// The validated configuration, or an error describing the first
    /// offending field.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.isa.validate()?;
        Ok(config)
    }

    /// Returns a copy rooted at a different working directory.
    ///
    /// Stage composition hands each child a sub-directory this way.
    pub fn with_dir(&self, dir: &Path) -> Self {
        let mut config = self.clone();
        config.general.dir = dir.to_path_buf();
        config
    }
}
