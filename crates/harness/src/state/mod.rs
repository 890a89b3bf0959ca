//! Canonical RISC-V architectural state.
//!
//! This module defines the serializable machine-state model the whole
//! pipeline revolves around. It provides:
//! 1. **`MachineState`:** GPRs plus the extra state block (memory digests,
//!    last PC, exception counter, mstatus feature bits, FP and vector state).
//! 2. **Initialization:** Deterministic-zero or randomized population, with
//!    restricted CSRs drawn from their enumerated legal encodings only.
//! 3. **Comparison:** Field-wise exact equality with a human-readable diff
//!    table (REF/DUT columns, per-byte markers on register images).
//! 4. **Restore assembly:** Position-independent code that writes the whole
//!    state back into the machine, used as the init part of minimized and
//!    replayed test programs.
//!
//! The dump-region codec that captures this state at program exit lives in
//! [`dump`](crate::state::dump).

pub mod dump;

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::common::reg::GPR_NAMES;
use crate::common::{HarnessError, Result};
use crate::code::{CodeFragment, CodeFragmentList};
use crate::config::IsaConfig;

/// Placeholder digest used before a memory image has been hashed.
const HASH_PLACEHOLDER: &str = "########################################";

/// How state fields are populated on initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// Deterministic content: every draw takes its minimum legal value.
    Zero,
    /// Uniform draws; restricted CSRs sample their legal encodings only.
    Rand,
}

/// Floating-point architectural state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatState {
    /// Floating-point control and status register.
    pub fcsr: u64,
    /// f0..f31 as raw images of flen/8 bytes each.
    pub fregs: Vec<Vec<u8>>,
}

/// Vector architectural state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorState {
    /// Vector type register.
    pub vtype: u64,
    /// Vector length.
    pub vl: u64,
    /// Vector register length in bytes.
    pub vlenb: u64,
    /// Vector start index.
    pub vstart: u64,
    /// Fixed-point rounding mode.
    pub vxrm: u64,
    /// Fixed-point saturation flag.
    pub vxsat: u64,
    /// Vector control and status register; shadows (vxrm << 1) | vxsat.
    pub vcsr: u64,
    /// v0..v31 as raw images of vlenb bytes each.
    pub vregs: Vec<Vec<u8>>,
}

/// Everything captured beyond the plain integer register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateExtras {
    /// SHA-1 of the executable window (dump region excluded), hex.
    pub xmemhash: String,
    /// SHA-1 of the data window, hex.
    pub dmemhash: String,
    /// Address of the last executed test instruction.
    pub last_pc: u64,
    /// Number of exceptions taken during the run.
    pub exceptions: u64,
    /// mstatus masked to the FS/VS fields (0x6600).
    pub mstatus_fs_vs: u64,
    /// Floating-point state, when F or D is enabled.
    pub float: Option<FloatState>,
    /// Vector state, when V is enabled.
    pub vector: Option<VectorState>,
}

/// A complete architectural state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    /// x0..x31; x0 is always zero.
    pub xregs: [u64; 32],
    /// Program counter, present on simulator-captured states only.
    pub pc: Option<u64>,
    /// The extra state block.
    pub extras: StateExtras,
}

fn value_from_selection(mode: ValueMode, last: u64, mask: u64, values: &[u64], rng: &mut StdRng) -> u64 {
    let base = last & !mask;
    match mode {
        ValueMode::Zero => base,
        ValueMode::Rand => base | values[rng.random_range(0..values.len())],
    }
}

fn value_in(mode: ValueMode, min: i64, max: i64, rng: &mut StdRng) -> i64 {
    match mode {
        ValueMode::Zero => min,
        ValueMode::Rand => rng.random_range(min..=max),
    }
}

fn byte_values(mode: ValueMode, len: usize, rng: &mut StdRng) -> Vec<u8> {
    match mode {
        ValueMode::Zero => vec![0; len],
        ValueMode::Rand => (0..len).map(|_| rng.random::<u8>()).collect(),
    }
}

fn reg_value(mode: ValueMode, xlen: u32, rng: &mut StdRng) -> u64 {
    match mode {
        ValueMode::Zero => 0,
        ValueMode::Rand => {
            if xlen >= 64 {
                rng.random::<u64>()
            } else {
                rng.random_range(0..(1u64 << xlen))
            }
        }
    }
}

/// Renders a byte image as space-separated hex pairs.
fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl MachineState {
    /// Creates a state for the given ISA shape and populates it.
    ///
    /// Zero mode is fully deterministic. Rand mode samples registers
    /// uniformly and restricted CSR fields from their legal value lists:
    /// `mstatus.fs ∈ {0, 0x6000}`, `mstatus.vs ∈ {0, 0x600}`,
    /// `fcsr.frm ∈ {0..7} << 5`, `vxrm ∈ 0..=3`, and `vtype` from legal
    /// (vlmul, vsew, vta, vma) combinations with `vl ∈ 0..=vlmax`.
    pub fn init(isa: &IsaConfig, mode: ValueMode, rng: &mut StdRng) -> Self {
        let mut xregs = [0u64; 32];
        for r in xregs.iter_mut().skip(1) {
            *r = reg_value(mode, isa.xlen, rng);
        }

        let mut mstatus_fs_vs = 0u64;

        let float = isa.has_float().then(|| {
            mstatus_fs_vs = value_from_selection(mode, mstatus_fs_vs, 0x6000, &[0x0000, 0x6000], rng);
            let fcsr = value_from_selection(
                mode,
                0,
                0x7 << 5,
                &(0..8u64).map(|i| i << 5).collect::<Vec<_>>(),
                rng,
            );
            let flenb = isa.flenb() as usize;
            let fregs = (0..32).map(|_| byte_values(mode, flenb, rng)).collect();
            FloatState { fcsr, fregs }
        });

        let vector = isa.has_vector().then(|| {
            mstatus_fs_vs = value_from_selection(mode, mstatus_fs_vs, 0x600, &[0x000, 0x600], rng);
            let vxrm = value_from_selection(mode, 0, 0x3, &[0, 1, 2, 3], rng);
            let vxsat = 0u64;
            let vcsr = (vxrm << 1) | vxsat;

            let vlmul = value_in(mode, -3, 3, rng);
            let vsew = value_in(mode, 0, 3, rng) as u64;
            let vma = value_in(mode, 0, 1, rng) as u64;
            let vta = value_in(mode, 0, 1, rng) as u64;
            let vtype = (vma << 7) | (vta << 6) | (vsew << 3) | ((vlmul as u64) & 0x7);

            let vsew_val = 8u64 << vsew;
            let vlenb = isa.vlenb();
            let vlmax = if vlmul >= 0 {
                (vlenb / vsew_val) << vlmul
            } else {
                (vlenb / vsew_val) >> (-vlmul)
            };
            let vl = value_in(mode, 0, vlmax as i64, rng) as u64;

            let vregs = (0..32)
                .map(|_| byte_values(mode, vlenb as usize, rng))
                .collect();
            VectorState {
                vtype,
                vl,
                vlenb,
                vstart: 0,
                vxrm,
                vxsat,
                vcsr,
                vregs,
            }
        });

        let state = Self {
            xregs,
            pc: None,
            extras: StateExtras {
                xmemhash: HASH_PLACEHOLDER.to_string(),
                dmemhash: HASH_PLACEHOLDER.to_string(),
                last_pc: 0,
                exceptions: 0,
                mstatus_fs_vs,
                float,
                vector,
            },
        };
        debug_assert!(state.check_vcsr().is_ok());
        state
    }

    /// Assembles a state from a captured register file and dump extras.
    ///
    /// Fails when the captured vcsr does not shadow vxrm/vxsat.
    pub fn from_capture(xregs: [u64; 32], pc: u64, extras: StateExtras) -> Result<Self> {
        let state = Self {
            xregs,
            pc: Some(pc),
            extras,
        };
        state.check_vcsr()?;
        Ok(state)
    }

    /// Re-randomizes the register files only (x, f and v); CSRs are kept.
    pub fn randomize_registers(&mut self, isa: &IsaConfig, rng: &mut StdRng) {
        for r in self.xregs.iter_mut().skip(1) {
            *r = reg_value(ValueMode::Rand, isa.xlen, rng);
        }
        if let Some(float) = &mut self.extras.float {
            let flenb = isa.flenb() as usize;
            for f in &mut float.fregs {
                *f = byte_values(ValueMode::Rand, flenb, rng);
            }
        }
        if let Some(vector) = &mut self.extras.vector {
            let vlenb = vector.vlenb as usize;
            for v in &mut vector.vregs {
                *v = byte_values(ValueMode::Rand, vlenb, rng);
            }
        }
    }

    /// Verifies `vcsr == (vxrm << 1) | vxsat` when vector state is present.
    pub fn check_vcsr(&self) -> Result<()> {
        if let Some(v) = &self.extras.vector {
            if (v.vxrm << 1) | v.vxsat != v.vcsr {
                return Err(HarnessError::VcsrMismatch);
            }
        }
        Ok(())
    }

    /// Loads a persisted state.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&text)?;
        state.check_vcsr()?;
        Ok(state)
    }

    /// Persists the state as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The extra-state block as ordered (name, value) display rows.
    fn extra_rows(&self) -> Vec<(String, ExtraDisplay)> {
        let e = &self.extras;
        let mut rows = vec![
            ("xmemhash".to_string(), ExtraDisplay::Text(e.xmemhash.clone())),
            ("dmemhash".to_string(), ExtraDisplay::Text(e.dmemhash.clone())),
            ("lastPC".to_string(), ExtraDisplay::Int(e.last_pc)),
            ("#exceptions".to_string(), ExtraDisplay::Int(e.exceptions)),
            ("mstatus.fs/vs".to_string(), ExtraDisplay::Int(e.mstatus_fs_vs)),
        ];
        if let Some(f) = &e.float {
            rows.push(("fcsr".to_string(), ExtraDisplay::Int(f.fcsr)));
            for (i, freg) in f.fregs.iter().enumerate() {
                rows.push((format!("f{i}"), ExtraDisplay::Bytes(freg.clone())));
            }
        }
        if let Some(v) = &e.vector {
            rows.push(("vtype".to_string(), ExtraDisplay::Int(v.vtype)));
            rows.push(("vl".to_string(), ExtraDisplay::Int(v.vl)));
            rows.push(("vlenb".to_string(), ExtraDisplay::Int(v.vlenb)));
            rows.push(("vstart".to_string(), ExtraDisplay::Int(v.vstart)));
            rows.push(("vxrm".to_string(), ExtraDisplay::Int(v.vxrm)));
            rows.push(("vxsat".to_string(), ExtraDisplay::Int(v.vxsat)));
            rows.push(("vcsr".to_string(), ExtraDisplay::Int(v.vcsr)));
            for (i, vreg) in v.vregs.iter().enumerate() {
                rows.push((format!("v{i}"), ExtraDisplay::Bytes(vreg.clone())));
            }
        }
        rows
    }

    /// Compares two states field-wise.
    ///
    /// Returns the equality verdict and a diff table listing every field
    /// with REF and DUT columns; byte-image rows that differ carry a third
    /// line of `^^` markers under the differing byte positions.
    pub fn compare(&self, other: &MachineState) -> (bool, String) {
        let mut output = String::new();
        let mut is_equal = true;

        let _ = writeln!(
            output,
            "{:<16}{:<48}{:<48}DIFF",
            "REG", "REF", "DUT"
        );
        let mut reg_row = |name: String, val_ref: u64, val_dut: u64, out: &mut String| {
            let diff = if val_ref == val_dut {
                ""
            } else {
                is_equal = false;
                "X"
            };
            let _ = writeln!(
                out,
                "{:<16}{:<48}{:<48}{}",
                name,
                format!("{val_ref:#018x}"),
                format!("{val_dut:#018x}"),
                diff
            );
        };
        for (i, name) in GPR_NAMES.iter().enumerate() {
            reg_row(format!("{name}(x{i})"), self.xregs[i], other.xregs[i], &mut output);
        }
        if let (Some(pc_ref), Some(pc_dut)) = (self.pc, other.pc) {
            reg_row("pc".to_string(), pc_ref, pc_dut, &mut output);
        }

        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "{:<16}{:<48}{:<48}DIFF",
            "STATE", "REF", "DUT"
        );
        let rows_ref = self.extra_rows();
        let rows_dut = other.extra_rows();
        for (row_ref, row_dut) in rows_ref.iter().zip(rows_dut.iter()) {
            let (name, val_ref) = row_ref;
            let (_, val_dut) = row_dut;
            let diff = if val_ref == val_dut {
                ""
            } else {
                is_equal = false;
                "X"
            };

            let ref_str = val_ref.render();
            let dut_str = val_dut.render();
            if ref_str.len() < 48 && dut_str.len() < 48 {
                let _ = writeln!(output, "{name:<16}{ref_str:<48}{dut_str:<48}{diff}");
            } else {
                let _ = writeln!(output, "{:<112}{}", name, diff);
                let _ = writeln!(output, "{ref_str}");
                let _ = writeln!(output, "{dut_str}");
                if let (ExtraDisplay::Bytes(a), ExtraDisplay::Bytes(b)) = (val_ref, val_dut) {
                    let markers = a
                        .iter()
                        .zip(b.iter())
                        .map(|(x, y)| if x == y { "  " } else { "^^" })
                        .collect::<Vec<_>>()
                        .join(" ");
                    let _ = writeln!(output, "{markers}");
                }
            }
        }
        if rows_ref.len() != rows_dut.len() {
            is_equal = false;
            let _ = writeln!(output, "state blocks differ in shape");
        }

        (is_equal, output)
    }

    /// Emits position-independent assembly restoring this state.
    ///
    /// Ordering is load-bearing: FP data and registers first (so `t0` is
    /// free afterwards), then vector data, a `vsetvli` clearing any stale
    /// vill, the register images, the saved vl/vtype and CSRs, then the
    /// mstatus FS/VS bits, and the integer registers last so nothing
    /// clobbers them afterwards.
    pub fn as_assembly(&self) -> CodeFragmentList {
        let mut f = CodeFragmentList::new();

        if let Some(float) = &self.extras.float {
            let inst_fload = match float.fregs.first().map_or(0, Vec::len) {
                4 => "flw",
                16 => "flq",
                _ => "fld",
            };
            f.add(CodeFragment::new("    // FLOATINGPOINT STATE DATA"));
            f.add(CodeFragment::new("    j _float_data_end"));
            f.add(CodeFragment::new("    .align 4"));
            for (i, freg) in float.fregs.iter().enumerate() {
                f.add(CodeFragment::new(byte_data_line(&format!("_reg_f{i}"), freg)));
            }
            f.add(CodeFragment::new("_float_data_end:"));
            f.add(CodeFragment::new("    // FLOATINGPOINT STATE"));
            for i in 0..32 {
                f.add(CodeFragment::new(format!("    la t0, _reg_f{i}")));
                f.add(CodeFragment::new(format!("    {inst_fload} f{i}, 0(t0)")));
            }
            f.add(CodeFragment::new(format!("    li t0, {:#x}", float.fcsr)));
            f.add(CodeFragment::new("    csrrw zero, fcsr, t0"));
        }

        if let Some(vector) = &self.extras.vector {
            f.add(CodeFragment::new("    // VECTOR STATE DATA"));
            f.add(CodeFragment::new("    j _vector_data_end"));
            f.add(CodeFragment::new("    .align 4"));
            for (i, vreg) in vector.vregs.iter().enumerate() {
                f.add(CodeFragment::new(byte_data_line(&format!("_reg_v{i}"), vreg)));
            }
            f.add(CodeFragment::new("_vector_data_end:"));
            f.add(CodeFragment::new("    // VECTOR STATE"));
            // clear potential vill
            f.add(CodeFragment::new("    vsetvli t0, zero, e8, ta, ma"));
            for i in 0..32 {
                f.add(CodeFragment::new(format!("    la t0, _reg_v{i}")));
                f.add(CodeFragment::new(format!("    vl1r.v v{i}, (t0)")));
            }
            f.add(CodeFragment::new(format!("    li t0, {:#x}", vector.vl)));
            f.add(CodeFragment::new(format!("    li t1, {:#x}", vector.vtype)));
            f.add(CodeFragment::new("    vsetvl zero, t0, t1"));
            for (csr, val) in [("vstart", vector.vstart), ("vcsr", vector.vcsr)] {
                f.add(CodeFragment::new(format!("    li t0, {val:#x}")));
                f.add(CodeFragment::new(format!("    csrrw zero, {csr}, t0")));
            }
        }

        f.add(CodeFragment::new("    // STATE"));
        f.add(CodeFragment::new("    // restore mstatus"));
        f.add(CodeFragment::new("    li t0, 0x6600"));
        f.add(CodeFragment::new("    csrc mstatus, t0"));
        f.add(CodeFragment::new(format!(
            "    li t0, {:#x}",
            self.extras.mstatus_fs_vs
        )));
        f.add(CodeFragment::new("    csrs mstatus, t0"));

        f.add(CodeFragment::new("    // restore registers"));
        for (i, name) in GPR_NAMES.iter().enumerate().skip(1) {
            f.add(CodeFragment::new(format!(
                "{:<33}// {}",
                format!("    li x{i}, {:#x}", self.xregs[i]),
                name
            )));
        }

        f
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16}VALUE", "REG")?;
        for (i, name) in GPR_NAMES.iter().enumerate() {
            let val = self.xregs[i];
            writeln!(f, "{:<16}{val:#018x}({val})", format!("{name}(x{i})"))?;
        }
        if let Some(pc) = self.pc {
            writeln!(f, "{:<16}{pc:#018x}({pc})", "pc")?;
        }
        writeln!(f)?;
        writeln!(f, "{:<16}VALUE", "STATE")?;
        for (name, val) in self.extra_rows() {
            let rendered = val.render();
            if rendered.len() < 48 {
                writeln!(f, "{name:<16}{rendered}")?;
            } else {
                writeln!(f, "{name}")?;
                writeln!(f, "{rendered}")?;
            }
        }
        Ok(())
    }
}

/// One display row of the extra-state block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtraDisplay {
    Int(u64),
    Bytes(Vec<u8>),
    Text(String),
}

impl ExtraDisplay {
    fn render(&self) -> String {
        match self {
            ExtraDisplay::Int(v) => format!("{v:#018x}({v})"),
            ExtraDisplay::Bytes(b) => hex_bytes(b),
            ExtraDisplay::Text(t) => t.clone(),
        }
    }
}

/// Renders `symname: .byte 0x.., 0x.., ...` for an inline data block.
fn byte_data_line(symname: &str, values: &[u8]) -> String {
    let bytes = values
        .iter()
        .map(|v| format!("{v:#04x}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{:<9}.byte {}", format!("{symname}:"), bytes)
}
