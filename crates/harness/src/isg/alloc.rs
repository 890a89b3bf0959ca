//! Register allocation, label bookkeeping and immediate draws.
//!
//! The generators lean on three small stateful helpers:
//! 1. **`RegAlloc`:** A free-mask scratch-register allocator. Allocators are
//!    scoped: every emitter acquires a fresh one at emit-start and drops it
//!    with the finished fragment, so no allocation state leaks between
//!    fragments.
//! 2. **`LabelGen`:** Deterministic `_labelN` synthesis with a promise
//!    mechanism — `get` may hand out labels that have not been placed yet,
//!    and `emit_missing` closes the gap with stubs so the program links.
//! 3. **`VRegChooser`:** An EMUL-aware vector-register chooser that commits
//!    to a register-group configuration for a burst of draws and avoids
//!    duplicate groups within a burst.

use rand::Rng;
use rand::rngs::StdRng;

/// Free-mask register allocator over 32 registers with a name prefix.
#[derive(Debug, Clone)]
pub struct RegAlloc {
    prefix: &'static str,
    free_mask: u32,
}

/// Mask of all 32 registers.
pub const REG_ALL: u32 = u32::MAX;

/// Mask of all registers except x0.
pub const REG_ALL_NOT_ZERO: u32 = u32::MAX & !1;

impl RegAlloc {
    /// A fresh allocator over the integer register file.
    pub fn new_x() -> Self {
        Self {
            prefix: "x",
            free_mask: REG_ALL,
        }
    }

    /// Returns a register to the free pool.
    pub fn release(&mut self, reg: u32) {
        self.free_mask |= 1u32.checked_shl(reg).unwrap_or(0);
    }

    /// Returns every register to the free pool.
    pub fn release_all(&mut self) {
        self.free_mask = REG_ALL;
    }

    /// Claims a specific register, if free.
    pub fn alloc(&mut self, reg: u32) -> Option<String> {
        let bit = 1u32.checked_shl(reg)?;
        if self.free_mask & bit == 0 {
            return None;
        }
        self.free_mask &= !bit;
        Some(format!("{}{}", self.prefix, reg))
    }

    /// Claims a uniformly random free register within `request_mask`.
    pub fn alloc_random(&mut self, request_mask: u32, rng: &mut StdRng) -> Option<String> {
        if self.free_mask & request_mask == 0 {
            return None;
        }
        loop {
            let reg = rng.random_range(0..32u32);
            if (1 << reg) & request_mask & self.free_mask != 0 {
                return self.alloc(reg);
            }
        }
    }
}

/// Synthesizes `_labelN` labels with forward promises.
#[derive(Debug, Clone, Default)]
pub struct LabelGen {
    generated: u32,
    promised: u32,
}

impl LabelGen {
    /// A fresh label generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the counters and places the first label.
    pub fn place_first(&mut self) -> String {
        self.generated = 0;
        self.promised = 0;
        self.place()
    }

    /// Places the next label (with trailing colon).
    pub fn place(&mut self) -> String {
        let ret = format!("_label{}:", self.generated);
        self.generated += 1;
        ret
    }

    /// References a label: an already-placed one, or a promised future one.
    ///
    /// The promise counter never exceeds twice the placed count, so
    /// [`emit_missing`](Self::emit_missing) terminates.
    pub fn get(&mut self, rng: &mut StdRng) -> String {
        let mut label = rng.random_range(0..=self.generated * 2);
        if label >= self.generated {
            label = self.promised;
            self.promised += 1;
        }
        format!("_label{label}")
    }

    /// Places stubs for every promised-but-unplaced label.
    pub fn emit_missing(&mut self) -> String {
        let mut ret = String::new();
        while self.generated < self.promised {
            ret.push_str(&self.place());
            ret.push('\n');
        }
        ret
    }
}

/// EMUL-aware vector register chooser.
///
/// Draws come in bursts: at the start of a burst the chooser commits to a
/// random EMUL (1, 2, 4 or 8), whether v0 is reserved for masking, and the
/// burst length. Within a burst, register groups are not repeated until the
/// group pool is exhausted.
#[derive(Debug, Clone, Default)]
pub struct VRegChooser {
    masked: u32,
    emul: u32,
    groups: u32,
    remaining: u32,
    free_mask: u32,
}

impl VRegChooser {
    /// Maximum draws per burst.
    const BURST_MAX: u32 = 32;

    /// A fresh chooser; the first draw opens a burst.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws the next vector register name.
    pub fn next(&mut self, rng: &mut StdRng) -> String {
        if self.remaining == 0 {
            // commit to a new configuration
            self.masked = rng.random_range(0..=1);
            self.emul = 1 << rng.random_range(0..=3u32);
            self.groups = 32 / self.emul;
            self.free_mask = 0;
            self.remaining = rng.random_range(1..=Self::BURST_MAX);
        }

        // group pool exhausted -> start over
        if self.free_mask == 0 {
            self.free_mask = ((1u64 << self.groups) as u32).wrapping_sub(1) & !self.masked;
        }

        let group = loop {
            let idx = rng.random_range(self.masked..self.groups);
            if (1 << idx) & self.free_mask != 0 {
                self.free_mask &= !(1 << idx);
                break idx;
            }
        };

        self.remaining -= 1;
        format!("v{}", group * self.emul)
    }
}

/// Draws a signed immediate of the given bit width.
pub fn imm_signed(bits: u32, rng: &mut StdRng) -> i64 {
    let half = 1i64 << (bits - 1);
    rng.random_range(-half..half)
}

/// Draws an unsigned immediate of the given bit width.
pub fn imm_unsigned(bits: u32, rng: &mut StdRng) -> u64 {
    rng.random_range(0..(1u64 << bits))
}

/// Draws an integer register name, optionally excluding x0.
pub fn reg_name(allow_zero: bool, rng: &mut StdRng) -> String {
    let min = if allow_zero { 0 } else { 1 };
    format!("x{}", rng.random_range(min..=31))
}

/// Draws a floating-point register name.
pub fn freg_name(rng: &mut StdRng) -> String {
    format!("f{}", rng.random_range(0..=31))
}

/// Renders a signed value as assembler hex (`-0x5`, `0x7ff`).
pub fn hex_signed(v: i64) -> String {
    if v < 0 {
        format!("-{:#x}", -v)
    } else {
        format!("{v:#x}")
    }
}

/// Position of the highest set bit plus one; zero for zero.
///
/// Mirrors the bit-length primitive the window-mask derivations are
/// expressed in.
pub fn bit_length(v: u64) -> u32 {
    64 - v.leading_zeros()
}
