//! Base-integer instruction stream generator.
//!
//! Covers the RV32/RV64 base integer instruction set: I-type arithmetic,
//! shifts, U-type, R-type and conditional branches, plus bounded load/store
//! synthesis. The load/store emitter is the safety-critical piece: every
//! generated memory access provably lands inside its configured window and
//! is naturally aligned, no matter what value the base register happens to
//! hold at run time (§4.C.3 style clamp: mask to the window's power-of-two
//! envelope and alignment, then rebase above the window start).

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::code::{CodeFragment, CodeFragmentList};
use crate::common::Result;
use crate::config::{Config, IsaConfig};
use crate::isg::ProgramGenerator;
use crate::isg::alloc::{self, LabelGen, REG_ALL, REG_ALL_NOT_ZERO, RegAlloc, bit_length};
use crate::isg::grammar::{Grammar, expand};
use crate::state::{MachineState, ValueMode};

/// Emits csrc/csrs pairs toggling a CSR field among enumerated legal values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrModGenerator;

impl CsrModGenerator {
    /// A fresh CSR toggle emitter.
    pub fn new() -> Self {
        Self
    }

    /// Clears `mask` in `csr`, then sets a random value from `values`.
    ///
    /// Uses a freshly scoped scratch register; `values` must be non-empty
    /// and lie within `mask`.
    pub fn gen_csr_mod(&self, csr: &str, mask: u64, values: &[u64], rng: &mut StdRng) -> String {
        let mut regs = RegAlloc::new_x();
        let Some(reg) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        let mut code = String::new();

        // clear mask from csr
        code.push_str(&format!("    li {reg}, {mask:#x}\n"));
        code.push_str(&format!("    csrc {csr}, {reg}\n"));

        let value = values[rng.random_range(0..values.len())];
        if value != 0 {
            code.push_str(&format!("    li {reg}, {value:#x}\n"));
            code.push_str(&format!("    csrs {csr}, {reg}\n"));
        }
        format!("\n{code}\n")
    }
}

/// Scalar load/store instructions with their access widths in bytes.
const LOAD_RV32: &[(&str, u64)] = &[("lb", 1), ("lh", 2), ("lw", 4), ("lbu", 1), ("lhu", 2)];
const LOAD_RV64_EXTRA: &[(&str, u64)] = &[("ld", 8), ("lwu", 4)];
const STORE_RV32: &[(&str, u64)] = &[("sb", 1), ("sh", 2), ("sw", 4)];
const STORE_RV64_EXTRA: &[(&str, u64)] = &[("sd", 8)];

/// Window-bounded scalar load/store emitter.
///
/// Configured with a memory window `[memstart, memstart+memlen)`; loads use
/// the full simulated memory, stores get a separate instance restricted to
/// the data window so generated programs cannot overwrite their own text.
#[derive(Debug, Clone)]
pub struct BoundedLoadStore {
    xlen_mask: u64,
    memstart: u64,
    memlen_mask: u64,
    loads: Vec<(&'static str, u64)>,
    stores: Vec<(&'static str, u64)>,
}

impl BoundedLoadStore {
    /// An emitter over the window `[memstart, memstart+memlen)`.
    pub fn new(isa: &IsaConfig, memstart: u64, memlen: u64) -> Self {
        let xlen_mask = if isa.xlen >= 64 {
            u64::MAX
        } else {
            (1u64 << isa.xlen) - 1
        };
        let mut loads: Vec<_> = LOAD_RV32.to_vec();
        let mut stores: Vec<_> = STORE_RV32.to_vec();
        if isa.xlen == 64 {
            loads.extend_from_slice(LOAD_RV64_EXTRA);
            stores.extend_from_slice(STORE_RV64_EXTRA);
        }
        Self {
            xlen_mask,
            memstart,
            memlen_mask: (1u64 << (bit_length(memlen) - 1)) - 1,
            loads,
            stores,
        }
    }

    /// Emits a random bounded load.
    pub fn gen_load(&self, rng: &mut StdRng) -> String {
        let (name, width) = self.loads[rng.random_range(0..self.loads.len())];
        self.gen_access(name, width, rng)
    }

    /// Emits a random bounded store.
    pub fn gen_store(&self, rng: &mut StdRng) -> String {
        let (name, width) = self.stores[rng.random_range(0..self.stores.len())];
        self.gen_access(name, width, rng)
    }

    /// The clamp mask combining window envelope and access alignment.
    pub fn clamp_mask(&self, width: u64) -> u64 {
        let alignment_mask = (self.xlen_mask << (bit_length(width) - 1)) & self.xlen_mask;
        self.memlen_mask & alignment_mask
    }

    fn gen_access(&self, name: &str, width: u64, rng: &mut StdRng) -> String {
        let mut regs = RegAlloc::new_x();
        // src/dst may be zero
        let Some(rs2) = regs.alloc_random(REG_ALL, rng) else {
            return String::new();
        };
        let Some(rs1) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        let imm12 = alloc::imm_signed(12, rng);
        let Some(scratch) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };

        let mask = self.clamp_mask(width);
        let base = self.memstart.wrapping_sub(imm12 as u64);

        let mut code = String::from("\n");
        // keep the address below the window end and aligned
        code.push_str(&format!("    li {scratch}, {mask:#x}\n"));
        code.push_str(&format!("    and {rs1}, {rs1}, {scratch}\n"));
        // lift the address above the window start
        code.push_str(&format!("    li {scratch}, {base:#x}\n"));
        code.push_str(&format!("    add {rs1}, {rs1}, {scratch}\n"));
        code.push_str(&format!(
            "    {name} {rs2}, {}({rs1})\n",
            alloc::hex_signed(imm12)
        ));
        code
    }
}

/// Base-integer program generator.
///
/// Init fragments restore a freshly randomized machine state and place the
/// first label; payload fragments come from the grammar; deinit emits stubs
/// for promised-but-unplaced labels so the program assembles.
pub struct RvGenerator {
    isa: IsaConfig,
    labels: Rc<RefCell<LabelGen>>,
    grammar: Grammar,
    rng: StdRng,
}

impl RvGenerator {
    /// A generator for the given campaign configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// A generator with a deterministic seed.
    pub fn seeded(config: &Config, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &Config, rng: StdRng) -> Result<Self> {
        config.isa.validate()?;
        let labels = Rc::new(RefCell::new(LabelGen::new()));
        let grammar = Self::build_grammar(config, &labels);
        Ok(Self {
            isa: config.isa.clone(),
            labels,
            grammar,
            rng,
        })
    }

    fn build_grammar(config: &Config, labels: &Rc<RefCell<LabelGen>>) -> Grammar {
        let mem = &config.memory;
        // loads may read the whole window; stores only the data window
        let blsg_load = Rc::new(BoundedLoadStore::new(&config.isa, mem.memstart, mem.memlen));
        let blsg_store = Rc::new(BoundedLoadStore::new(
            &config.isa,
            mem.dmemstart,
            mem.dmemlen,
        ));

        let mut g = Grammar::new();
        g.alts("<start>", &["<line>"]);
        g.alts(
            "<line>",
            &[
                "    <instr_calc>",
                "    <instr_calc>",
                "    <instr_calc>",
                "    <instr_load_store>",
            ],
        );
        {
            let labels = Rc::clone(labels);
            g.produce("<gen_label>", move |_| labels.borrow_mut().place());
        }
        {
            let labels = Rc::clone(labels);
            g.produce("<get_label>", move |rng| labels.borrow_mut().get(rng));
        }
        g.alts(
            "<instr_calc>",
            &[
                "<I_instr> <rd>, <rs1>, <imm12>",
                "sltiu <rd>, <rs1>, <imm12u>",
                "<SHAMT_instr> <rd>, <rs1>, <shamt5>",
                "<U_instr> <rd>, <imm20u>",
                "<R_instr> <rd>, <rs1>, <rs2>",
            ],
        );
        g.alts("<instr_control>", &["<B_instr> <rs1>, <rs2>, <get_label>"]);
        g.alts("<instr_load_store>", &["<instr_load>", "<instr_store>"]);
        {
            let blsg = Rc::clone(&blsg_load);
            g.produce("<instr_load>", move |rng| blsg.gen_load(rng));
        }
        {
            let blsg = Rc::clone(&blsg_store);
            g.produce("<instr_store>", move |rng| blsg.gen_store(rng));
        }
        g.alts("<I_instr>", &["addi", "slti", "andi", "ori", "xori"]);
        g.alts("<SHAMT_instr>", &["slli", "srli", "srai"]);
        g.alts("<U_instr>", &["lui", "auipc"]);
        g.alts(
            "<R_instr>",
            &[
                "add", "slt", "sltu", "and", "or", "xor", "sll", "srl", "sub", "sra",
            ],
        );
        g.alts("<J_instr>", &["jal"]);
        g.alts("<B_instr>", &["beq", "bne", "blt", "bltu", "bge", "bgeu"]);
        g.alts("<rd>", &["<reg>"]);
        g.alts("<rs1>", &["<reg>"]);
        g.alts("<rs2>", &["<reg>"]);
        g.produce("<reg>", |rng| alloc::reg_name(true, rng));
        g.produce("<shamt5>", |rng| alloc::imm_unsigned(5, rng).to_string());
        g.produce("<imm12>", |rng| alloc::imm_signed(12, rng).to_string());
        g.produce("<imm12u>", |rng| alloc::imm_signed(12, rng).to_string());
        g.produce("<imm20>", |rng| alloc::imm_signed(20, rng).to_string());
        g.produce("<imm20u>", |rng| alloc::imm_unsigned(20, rng).to_string());
        g
    }
}

impl ProgramGenerator for RvGenerator {
    fn gen_init_fragments(&mut self) -> Result<CodeFragmentList> {
        let state = MachineState::init(&self.isa, ValueMode::Rand, &mut self.rng);
        let mut ret = state.as_assembly();
        ret.add(CodeFragment::new(self.labels.borrow_mut().place_first()));
        Ok(ret)
    }

    fn gen_fragment(&mut self) -> Result<CodeFragment> {
        Ok(CodeFragment::new(expand(&self.grammar, &mut self.rng)?))
    }

    fn gen_deinit_fragments(&mut self) -> Result<CodeFragmentList> {
        Ok(CodeFragmentList::from_fragment(CodeFragment::new(
            self.labels.borrow_mut().emit_missing(),
        )))
    }
}
