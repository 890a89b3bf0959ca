//! State dump region layout and codecs.
//!
//! Test programs capture their terminal architectural state into a reserved
//! region at the tail of the executable window. This module owns that
//! contract from both sides:
//! 1. **Emission:** Assembly sequences that save registers to the region
//!    (program epilogue), load them back (exception handler context), or set
//!    them to literals (handler initialization).
//! 2. **Extraction:** Decoding a raw memory image dumped by a simulator back
//!    into [`StateExtras`](super::StateExtras), including the SHA-1 digests
//!    of the executable and data windows.
//!
//! All multi-byte values are packed little-endian. The region layout is,
//! in order: a 3-word scratch save slot for t0..t2, the 3-word estate block
//! (last PC, exception counter, mstatus & 0x6600), the FP block (fcsr plus
//! 32 FP register images, offset padded up to flen/8), and the vector block
//! (7 CSRs plus 32 vector register images).

use std::fmt::Write as _;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::state::{FloatState, StateExtras, VectorState};

/// A run of integer registers stored xlen-wide at consecutive offsets.
#[derive(Debug, Clone)]
pub struct RegSection {
    offset: u64,
    xlenb: u64,
    regs: Vec<u32>,
    inst_store: &'static str,
    inst_load: &'static str,
}

impl RegSection {
    fn new(xlen: u32, offset: u64, regs: Vec<u32>) -> Result<Self> {
        let (inst_store, inst_load) = match xlen {
            32 => ("sw", "lw"),
            64 => ("sd", "ld"),
            _ => return Err(HarnessError::UnsupportedXlen(xlen)),
        };
        Ok(Self {
            offset,
            xlenb: u64::from(xlen) / 8,
            regs,
            inst_store,
            inst_load,
        })
    }

    /// Size of the section in bytes.
    pub fn len(&self) -> u64 {
        self.regs.len() as u64 * self.xlenb
    }

    /// True when the section covers no registers.
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Assembly storing the section's registers, gp-relative.
    pub fn emit_save(&self) -> String {
        let mut code = String::new();
        for (i, reg) in self.regs.iter().enumerate() {
            let off = self.offset + i as u64 * self.xlenb;
            let _ = writeln!(code, "    {} x{}, {}(gp)", self.inst_store, reg, off);
        }
        code
    }

    /// Assembly loading the section's registers back, gp-relative.
    pub fn emit_load(&self) -> String {
        let mut code = String::new();
        for (i, reg) in self.regs.iter().enumerate() {
            let off = self.offset + i as u64 * self.xlenb;
            let _ = writeln!(code, "    {} x{}, {}(gp)", self.inst_load, reg, off);
        }
        code
    }

    /// Assembly setting the section's registers to literal values.
    pub fn emit_set(&self, values: &[u64]) -> String {
        let mut code = String::new();
        for (reg, value) in self.regs.iter().zip(values.iter()) {
            let _ = writeln!(code, "    li x{reg}, {value:#x}");
        }
        code
    }

    /// Decodes the section's values from the dump image.
    pub fn extract(&self, dump: &[u8]) -> Result<Vec<u64>> {
        let mut values = Vec::with_capacity(self.regs.len());
        for i in 0..self.regs.len() {
            let off = (self.offset + i as u64 * self.xlenb) as usize;
            let end = off + self.xlenb as usize;
            let bytes = dump
                .get(off..end)
                .ok_or_else(|| HarnessError::DumpDecode(format!("short dump at offset {off}")))?;
            let mut word = [0u8; 8];
            word[..bytes.len()].copy_from_slice(bytes);
            values.push(u64::from_le_bytes(word));
        }
        Ok(values)
    }
}

/// The 32 FP registers stored flen-wide, offset padded up to flen/8.
#[derive(Debug, Clone)]
pub struct FRegSection {
    offset: u64,
    flenb: u64,
    pad: u64,
    inst_store: &'static str,
    inst_load: &'static str,
}

impl FRegSection {
    fn new(flenb: u64, offset: u64) -> Result<Self> {
        let (inst_store, inst_load) = match flenb {
            4 => ("fsw", "flw"),
            8 => ("fsd", "fld"),
            16 => ("fsq", "flq"),
            _ => {
                return Err(HarnessError::Config(format!(
                    "invalid floating point flen {}",
                    flenb * 8
                )));
            }
        };
        let pad = flenb - (offset % flenb);
        Ok(Self {
            offset: offset + pad,
            flenb,
            pad,
            inst_store,
            inst_load,
        })
    }

    /// Size of the section in bytes, padding included.
    pub fn len(&self) -> u64 {
        32 * self.flenb + self.pad
    }

    /// Assembly storing f0..f31, gp-relative.
    pub fn emit_save(&self) -> String {
        let mut code = String::new();
        for i in 0..32u64 {
            let off = self.offset + i * self.flenb;
            let _ = writeln!(code, "    {} f{}, {}(gp)", self.inst_store, i, off);
        }
        code
    }

    /// Assembly loading f0..f31 back, gp-relative.
    pub fn emit_load(&self) -> String {
        let mut code = String::new();
        for i in 0..32u64 {
            let off = self.offset + i * self.flenb;
            let _ = writeln!(code, "    {} f{}, {}(gp)", self.inst_load, i, off);
        }
        code
    }

    /// Decodes the 32 register images from the dump image.
    pub fn extract(&self, dump: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::with_capacity(32);
        for i in 0..32u64 {
            let off = (self.offset + i * self.flenb) as usize;
            let end = off + self.flenb as usize;
            let bytes = dump
                .get(off..end)
                .ok_or_else(|| HarnessError::DumpDecode(format!("short dump at offset {off}")))?;
            values.push(bytes.to_vec());
        }
        Ok(values)
    }
}

/// The 32 vector registers stored vlenb-wide via whole-register moves.
#[derive(Debug, Clone)]
pub struct VRegSection {
    offset: u64,
    vlenb: u64,
}

impl VRegSection {
    /// Size of the section in bytes.
    pub fn len(&self) -> u64 {
        32 * self.vlenb
    }

    /// Assembly storing v0..v31 with `vs1r.v`, t0 walking from gp.
    ///
    /// The leading `vsetvli` clears a potentially illegal vtype so the
    /// whole-register stores are valid regardless of test-code behavior.
    pub fn emit_save(&self) -> String {
        self.emit_moves("vs1r.v")
    }

    /// Assembly loading v0..v31 back with `vl1r.v`.
    pub fn emit_load(&self) -> String {
        self.emit_moves("vl1r.v")
    }

    fn emit_moves(&self, inst: &str) -> String {
        let mut code = String::new();
        // clear potential vill
        let _ = writeln!(code, "    vsetvli t0, zero, e8, m1, ta, ma");
        let _ = writeln!(code, "    addi t0, gp, {}", self.offset);
        for i in 0..32u64 {
            let _ = writeln!(code, "    {inst} v{i}, (t0)");
            let _ = writeln!(code, "    addi t0, t0, {}", self.vlenb);
        }
        code
    }

    /// Decodes the 32 register images from the dump image.
    pub fn extract(&self, dump: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::with_capacity(32);
        for i in 0..32u64 {
            let off = (self.offset + i * self.vlenb) as usize;
            let end = off + self.vlenb as usize;
            let bytes = dump
                .get(off..end)
                .ok_or_else(|| HarnessError::DumpDecode(format!("short dump at offset {off}")))?;
            values.push(bytes.to_vec());
        }
        Ok(values)
    }
}

/// The complete dump region: layout, emission and extraction.
#[derive(Debug, Clone)]
pub struct DumpFile {
    addr: u64,
    len: u64,
    memstart: u64,
    xmemstart: u64,
    xmemlen: u64,
    dmemstart: u64,
    dmemlen: u64,
    dumpfile_reserve: u64,
    vlenb: u64,
    /// Scratch save slot for t0..t2.
    pub tmpregs: RegSection,
    /// Last PC, exception counter, mstatus & 0x6600 (held in x5..x7).
    pub estate: RegSection,
    /// fcsr (held in x5), when F/D is enabled.
    pub fstate: Option<RegSection>,
    /// f0..f31, when F/D is enabled.
    pub fregs: Option<FRegSection>,
    /// vtype, vl, vlenb, vstart, vxrm, vxsat, vcsr (x5..x11), when V is enabled.
    pub vstate: Option<RegSection>,
    /// v0..v31, when V is enabled.
    pub vregs: Option<VRegSection>,
}

impl DumpFile {
    /// Lays out the dump region for the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let isa = &config.isa;
        let mem = &config.memory;
        let xlen = isa.xlen;
        let addr = mem.dump_addr();
        let mut len = 0u64;

        let tmpregs = RegSection::new(xlen, len, vec![5, 6, 7])?;
        len += tmpregs.len();

        let estate = RegSection::new(xlen, len, vec![5, 6, 7])?;
        len += estate.len();

        let (fstate, fregs) = if isa.has_float() {
            let fstate = RegSection::new(xlen, len, vec![5])?;
            len += fstate.len();
            let fregs = FRegSection::new(isa.flenb(), len)?;
            len += fregs.len();
            (Some(fstate), Some(fregs))
        } else {
            (None, None)
        };

        let (vstate, vregs) = if isa.has_vector() {
            let vstate = RegSection::new(xlen, len, vec![5, 6, 7, 8, 9, 10, 11])?;
            len += vstate.len();
            let vregs = VRegSection {
                offset: len,
                vlenb: isa.vlenb(),
            };
            len += vregs.len();
            (Some(vstate), Some(vregs))
        } else {
            (None, None)
        };

        if len > mem.dumpfile_reserve {
            return Err(HarnessError::Config(format!(
                "dumpfile_reserve {:#x} too small for dump of {len:#x} bytes",
                mem.dumpfile_reserve
            )));
        }

        Ok(Self {
            addr,
            len,
            memstart: mem.memstart,
            xmemstart: mem.xmemstart,
            xmemlen: mem.xmemlen,
            dmemstart: mem.dmemstart,
            dmemlen: mem.dmemlen,
            dumpfile_reserve: mem.dumpfile_reserve,
            vlenb: isa.vlenb(),
            tmpregs,
            estate,
            fstate,
            fregs,
            vstate,
            vregs,
        })
    }

    /// Guest address of the dump region.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Occupied length of the dump region in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the region holds no sections (never the case in practice).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Decodes the extra-state block from a full memory-window image.
    ///
    /// `image` must cover the window starting at `memstart`; the digests are
    /// computed over the executable window (dump region excluded) and the
    /// data window.
    pub fn extract(&self, image: &[u8]) -> Result<StateExtras> {
        let xmemhash = sha1_window(
            image,
            self.xmemstart - self.memstart,
            self.xmemlen - self.dumpfile_reserve,
        );
        let dmemhash = sha1_window(image, self.dmemstart - self.memstart, self.dmemlen);

        let dump_off = (self.addr - self.memstart) as usize;
        let dump = image.get(dump_off..).ok_or_else(|| {
            HarnessError::DumpDecode(format!("image shorter than dump offset {dump_off:#x}"))
        })?;

        let estate = self.estate.extract(dump)?;
        let (last_pc, exceptions, mstatus_fs_vs) = (estate[0], estate[1], estate[2]);

        let float = match (&self.fstate, &self.fregs) {
            (Some(fstate), Some(fregs)) => {
                let fcsr = fstate.extract(dump)?[0];
                Some(FloatState {
                    fcsr,
                    fregs: fregs.extract(dump)?,
                })
            }
            _ => None,
        };

        let vector = match (&self.vstate, &self.vregs) {
            (Some(vstate), Some(vregs)) => {
                let v = vstate.extract(dump)?;
                Some(VectorState {
                    vtype: v[0],
                    vl: v[1],
                    vlenb: v[2],
                    vstart: v[3],
                    vxrm: v[4],
                    vxsat: v[5],
                    vcsr: v[6],
                    vregs: vregs.extract(dump)?,
                })
            }
            _ => None,
        };

        Ok(StateExtras {
            xmemhash,
            dmemhash,
            last_pc,
            exceptions,
            mstatus_fs_vs,
            float,
            vector,
        })
    }

    /// Decodes the extra-state block from a dumped memory-image file.
    pub fn extract_file(&self, path: &Path) -> Result<StateExtras> {
        let image = std::fs::read(path)?;
        self.extract(&image)
    }

    /// Conventional name of the memory-image file inside a stage directory.
    pub fn image_filename(&self) -> String {
        format!("mem.{:#x}.bin", self.memstart)
    }

    /// Vector register length in bytes, as laid out.
    pub fn vlenb(&self) -> u64 {
        self.vlenb
    }
}

/// SHA-1 over `image[start..start+len)`, clamped to the image, as lowercase hex.
fn sha1_window(image: &[u8], start: u64, len: u64) -> String {
    let start = (start as usize).min(image.len());
    let end = (start + len as usize).min(image.len());
    let mut hasher = Sha1::new();
    hasher.update(&image[start..end]);
    format!("{:x}", hasher.finalize())
}
