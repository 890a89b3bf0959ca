//! Vector-extension instruction stream generator.
//!
//! Two halves:
//! 1. **Load/store synthesis.** Every vector memory access form of the
//!    V-spec (unit-stride, strided, indexed, segmented, fault-only-first,
//!    whole-register and mask loads/stores, eew 8..64) paired with one of
//!    three address-synthesis strategies that keep every element access
//!    inside the configured window regardless of run-time register content.
//! 2. **Compute grammar.** The vector-integer, fixed-point, floating-point,
//!    reduction, mask and permutation instruction classes (V-spec §11–§16),
//!    each with its legal operand-form suffix rule, plus vsetvl/vsetvli/
//!    vsetivli configuration lines and CSR toggles for mstatus.VS/FS,
//!    fcsr.frm and vxrm.
//!
//! Address-synthesis strategy notes:
//! - *Unit-stride* clamps the runtime base like the scalar emitter, with the
//!   worst-case access length (vlenb · 8 · nfields) subtracted from the
//!   window envelope.
//! - *Strided* picks base and stride as literals so that even
//!   max_nr_accesses strides stay inside the window.
//! - *Indexed* temporarily rewrites vtype's sew to the encoded index eew and
//!   masks base and every index to half the window. The index vector is
//!   fixed to v8 (scratch v16): the vand.vx over the index group must be
//!   legal for any LMUL in effect, which only these aligned groups
//!   guarantee. An acknowledged variability limitation.

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::code::CodeFragment;
use crate::common::Result;
use crate::config::{Config, IsaConfig};
use crate::isg::ProgramGenerator;
use crate::isg::alloc::{
    self, REG_ALL, REG_ALL_NOT_ZERO, RegAlloc, VRegChooser, bit_length, hex_signed,
};
use crate::isg::grammar::{Expansion, Grammar, expand};
use crate::isg::rv::CsrModGenerator;

/// How a load/store form synthesizes its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrStrategy {
    UnitStride,
    RegStride,
    Indexed,
}

/// One vector load/store instruction form.
#[derive(Debug, Clone)]
struct LsForm {
    strategy: AddrStrategy,
    name: String,
    /// Encoded element width in bits; 0 marks the mask load/store encoding.
    enc_eew: u64,
    nfields: u64,
    maskable: bool,
}

impl LsForm {
    fn new(
        strategy: AddrStrategy,
        name: impl Into<String>,
        enc_eew: u64,
        nfields: u64,
        maskable: bool,
    ) -> Self {
        Self {
            strategy,
            name: name.into(),
            enc_eew,
            nfields,
            maskable,
        }
    }
}

/// Window-bounded vector load/store emitter.
#[derive(Debug)]
pub struct VBoundedLoadStore {
    xlen_mask: u64,
    vlenb: u64,
    memstart: u64,
    memlen: u64,
    vreg: RefCell<VRegChooser>,
    loads: Vec<LsForm>,
    stores: Vec<LsForm>,
}

impl VBoundedLoadStore {
    /// An emitter over the window `[memstart, memstart+memlen)`.
    pub fn new(isa: &IsaConfig, memstart: u64, memlen: u64) -> Self {
        use AddrStrategy::{Indexed, RegStride, UnitStride};

        let mut loads = Vec::new();
        let mut stores = Vec::new();
        for eew in [8u64, 16, 32, 64] {
            // unit-stride vector load/store
            loads.push(LsForm::new(UnitStride, format!("vle{eew}.v"), eew, 1, true));
            stores.push(LsForm::new(UnitStride, format!("vse{eew}.v"), eew, 1, true));

            // strided
            loads.push(LsForm::new(RegStride, format!("vlse{eew}.v"), eew, 1, true));
            stores.push(LsForm::new(RegStride, format!("vsse{eew}.v"), eew, 1, true));

            // indexed (unordered and ordered)
            loads.push(LsForm::new(Indexed, format!("vluxei{eew}.v"), eew, 1, true));
            loads.push(LsForm::new(Indexed, format!("vloxei{eew}.v"), eew, 1, true));
            stores.push(LsForm::new(Indexed, format!("vsuxei{eew}.v"), eew, 1, true));
            stores.push(LsForm::new(Indexed, format!("vsoxei{eew}.v"), eew, 1, true));

            // unit-stride fault-only-first
            loads.push(LsForm::new(UnitStride, format!("vle{eew}ff.v"), eew, 1, true));

            // segment forms; nfields=1 is the plain encoding above
            for nf in 2u64..=8 {
                loads.push(LsForm::new(
                    UnitStride,
                    format!("vlseg{nf}e{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                stores.push(LsForm::new(
                    UnitStride,
                    format!("vsseg{nf}e{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                loads.push(LsForm::new(
                    UnitStride,
                    format!("vlseg{nf}e{eew}ff.v"),
                    eew,
                    nf,
                    true,
                ));
                loads.push(LsForm::new(
                    RegStride,
                    format!("vlsseg{nf}e{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                stores.push(LsForm::new(
                    RegStride,
                    format!("vssseg{nf}e{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                loads.push(LsForm::new(
                    Indexed,
                    format!("vluxseg{nf}ei{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                loads.push(LsForm::new(
                    Indexed,
                    format!("vloxseg{nf}ei{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                stores.push(LsForm::new(
                    Indexed,
                    format!("vsuxseg{nf}ei{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
                stores.push(LsForm::new(
                    Indexed,
                    format!("vsoxseg{nf}ei{eew}.v"),
                    eew,
                    nf,
                    true,
                ));
            }

            // whole-register loads
            for grp in [1u64, 2, 4, 8] {
                loads.push(LsForm::new(
                    UnitStride,
                    format!("vl{grp}re{eew}.v"),
                    eew,
                    grp,
                    false,
                ));
            }
        }

        // mask load/store: special encoding, eew = 0
        loads.push(LsForm::new(UnitStride, "vlm.v", 0, 1, false));
        stores.push(LsForm::new(UnitStride, "vsm.v", 0, 1, false));

        // whole-register stores
        for grp in [1u64, 2, 4, 8] {
            stores.push(LsForm::new(
                UnitStride,
                format!("vs{grp}r.v"),
                8,
                grp,
                false,
            ));
        }

        let xlen_mask = if isa.xlen >= 64 {
            u64::MAX
        } else {
            (1u64 << isa.xlen) - 1
        };
        Self {
            xlen_mask,
            vlenb: isa.vlenb(),
            memstart,
            memlen,
            vreg: RefCell::new(VRegChooser::new()),
            loads,
            stores,
        }
    }

    /// Emits a random bounded vector load.
    pub fn gen_load(&self, rng: &mut StdRng) -> String {
        self.r#gen(true, rng)
    }

    /// Emits a random bounded vector store.
    pub fn gen_store(&self, rng: &mut StdRng) -> String {
        self.r#gen(false, rng)
    }

    fn r#gen(&self, load: bool, rng: &mut StdRng) -> String {
        let forms = if load { &self.loads } else { &self.stores };
        let form = &forms[rng.random_range(0..forms.len())];
        let masked = form.maskable && rng.random_range(0..2u32) == 1;
        match form.strategy {
            AddrStrategy::UnitStride => self.gen_unit_stride(form, masked, rng),
            AddrStrategy::RegStride => self.gen_reg_stride(form, masked, rng),
            AddrStrategy::Indexed => self.gen_indexed(form, masked, rng),
        }
    }

    fn gen_unit_stride(&self, form: &LsForm, masked: bool, rng: &mut StdRng) -> String {
        let mut regs = RegAlloc::new_x();
        let Some(rs1) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        let vld = self.vreg.borrow_mut().next(rng);
        let Some(scratch) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };

        // the mask ld/st encoding always touches a single register's worth
        let (max_access_len, enc_eew) = if form.enc_eew == 0 {
            (self.vlenb, 8)
        } else {
            // worst case: vlenb * m8 * number of fields
            (self.vlenb * 8 * form.nfields, form.enc_eew)
        };

        let unit_memlen = self.memlen - max_access_len;
        let unit_memlen_mask = (1u64 << (bit_length(unit_memlen) - 1)) - 1;
        let alignment = enc_eew / 8;
        let alignment_mask = (self.xlen_mask << (bit_length(alignment) - 1)) & self.xlen_mask;
        let mask = unit_memlen_mask & alignment_mask;

        let mut code = String::from("\n");
        code.push_str(&format!("    li {scratch}, {mask:#x}\n"));
        code.push_str(&format!("    and {rs1}, {rs1}, {scratch}\n"));
        code.push_str(&format!("    li {scratch}, {:#x}\n", self.memstart));
        code.push_str(&format!("    add {rs1}, {rs1}, {scratch}\n"));
        code.push_str(&format!("    {} {vld}, ({rs1})", form.name));
        if masked {
            code.push_str(", v0.t");
        }
        code.push('\n');
        code
    }

    /// Strided forms pick base and stride literals instead of clamping
    /// run-time values: the stride reach has to be bounded in both
    /// directions around the base.
    fn gen_reg_stride(&self, form: &LsForm, masked: bool, rng: &mut StdRng) -> String {
        let mut regs = RegAlloc::new_x();
        let Some(rs1) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        // stride register may be x0
        let Some(rs2) = regs.alloc_random(REG_ALL, rng) else {
            return String::new();
        };
        let vld = self.vreg.borrow_mut().next(rng);

        let element_read_size = form.nfields * form.enc_eew / 8;
        let max_access_len = self.vlenb * 8 * form.nfields;
        // first address outside the window
        let memend = self.memstart + self.memlen - element_read_size - 1;

        let steps = (memend - self.memstart).div_ceil(element_read_size);
        let base_addr = self.memstart + rng.random_range(0..steps) * element_read_size;

        let mut code = String::from("\n");
        code.push_str(&format!("    li {rs1}, {base_addr:#x}\n"));

        if rs2 != "x0" {
            let alignment = form.enc_eew / 8;
            let max_nr_accesses = max_access_len / alignment;
            // largest stride magnitudes that keep every access in the window
            let memlen_before = base_addr - self.memstart;
            let max_neg_stride = ((memlen_before / max_nr_accesses) / alignment) * alignment;
            let memlen_after = memend - base_addr;
            let max_pos_stride = ((memlen_after / max_nr_accesses) / alignment) * alignment;
            let choices = (max_neg_stride + max_pos_stride) / alignment + 1;
            let byte_stride =
                -(max_neg_stride as i64) + (rng.random_range(0..choices) * alignment) as i64;
            code.push_str(&format!("    li {rs2}, {}\n", hex_signed(byte_stride)));
        }

        code.push_str(&format!("    {} {vld}, ({rs1}), {rs2}", form.name));
        if masked {
            code.push_str(", v0.t");
        }
        code.push('\n');
        code
    }

    /// Indexed forms must clamp the index *vector*; the encoded eew names
    /// the index element width, so vtype is temporarily rewritten around
    /// the vand.vx and restored afterwards.
    fn gen_indexed(&self, form: &LsForm, masked: bool, rng: &mut StdRng) -> String {
        let mut regs = RegAlloc::new_x();
        let Some(rs1) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        // index vector and its scratch are pinned to v8/v16
        let vs2 = "v8";
        let vs_scratch = "v16";
        let vld = self.vreg.borrow_mut().next(rng);

        let Some(rs_vtype) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        let Some(rs_vl) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };
        let Some(rs_scratch) = regs.alloc_random(REG_ALL_NOT_ZERO, rng) else {
            return String::new();
        };

        let mut code = String::from("\n");

        // the index register's sew gets rewritten -> save vtype and vl
        code.push_str(&format!("    csrr {rs_vtype}, vtype\n"));
        code.push_str(&format!("    csrr {rs_vl}, vl\n"));

        // mask out sew, then set it from the encoded index eew
        let sew_clear = !(7u8 << 3);
        code.push_str(&format!("    andi {rs_scratch}, {rs_vtype}, {sew_clear:#x}\n"));
        let sew_bits = u64::from(bit_length(form.enc_eew / 8) - 1) << 3;
        code.push_str(&format!("    ori {rs_scratch}, {rs_scratch}, {sew_bits:#x}\n"));
        code.push_str(&format!("    vsetvl {rs_vl}, {rs_vl}, {rs_scratch}\n"));

        let memlen_half_mask = (1u64 << (bit_length(self.memlen) - 2)) - 1;
        // eew in vtype is unknown here -> assume nfields * 64 bit
        let alignment = form.nfields * 8;
        let alignment_mask = (self.xlen_mask << (bit_length(alignment) - 1)) & self.xlen_mask;
        let mask = memlen_half_mask & alignment_mask;
        code.push_str(&format!("    li {rs_scratch}, {mask:#x}\n"));
        // clamp the base and every index to half the window
        code.push_str(&format!("    and {rs1}, {rs1}, {rs_scratch}\n"));
        code.push_str(&format!("    vand.vx {vs2}, {vs_scratch}, {rs_scratch}\n"));

        code.push_str(&format!("    li {rs_scratch}, {:#x}\n", self.memstart));
        code.push_str(&format!("    add {rs1}, {rs1}, {rs_scratch}\n"));

        code.push_str(&format!("    vsetvl x0, {rs_vl}, {rs_vtype}\n"));

        code.push_str(&format!("    {} {vld}, ({rs1}), {vs2}", form.name));
        if masked {
            code.push_str(", v0.t");
        }
        code.push('\n');
        code
    }
}

/// Vector program generator.
///
/// Payload fragments only; state restoration is the base-integer
/// generator's job and the multiplexer concatenates their init parts.
pub struct RvvGenerator {
    grammar: Grammar,
    rng: StdRng,
}

impl RvvGenerator {
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
        Ok(Self {
            grammar: Self::build_grammar(config),
            rng,
        })
    }

    fn build_grammar(config: &Config) -> Grammar {
        let mem = &config.memory;
        let has_float = config.isa.has_float();
        let csrmg = CsrModGenerator::new();
        // loads may read the whole window; stores only the data window
        let blsg_load = Rc::new(VBoundedLoadStore::new(&config.isa, mem.memstart, mem.memlen));
        let blsg_store = Rc::new(VBoundedLoadStore::new(
            &config.isa,
            mem.dmemstart,
            mem.dmemlen,
        ));
        let vreg = Rc::new(RefCell::new(VRegChooser::new()));

        let mut g = Grammar::new();
        g.alts("<start>", &["    <line>"]);
        g.alts(
            "<line>",
            &[
                "<instr_v_config>",
                "<instr_v_load_store>",
                "<instr_v_compute>",
                "<instr_v_compute>",
                "<instr_v_compute>",
                "<instr_v_compute>",
            ],
        );
        g.alts(
            "<instr_v_config>",
            &["<instr_v_config_vset>", "<instr_v_config_csrs>"],
        );
        g.alts(
            "<instr_v_config_vset>",
            &[
                "vsetvl <rd>, <rs1>, <rs2>",
                "vsetvli <rd>, <rs1>, <vtypei>",
                "vsetivli <rd>, <uimm5>, <vtypei>",
            ],
        );
        g.rule(
            "<instr_v_config_csrs>",
            vec![
                // enable/disable vector extension
                Expansion::Call(Rc::new(move |rng: &mut StdRng| {
                    csrmg.gen_csr_mod("mstatus", 0x600, &[0x000, 0x600], rng)
                })),
                // enable/disable floating point (vector floating point)
                Expansion::Call(Rc::new(move |rng: &mut StdRng| {
                    if has_float {
                        csrmg.gen_csr_mod("mstatus", 0x6000, &[0x0000, 0x6000], rng)
                    } else {
                        String::new()
                    }
                })),
                // set floating point rounding mode
                Expansion::Call(Rc::new(move |rng: &mut StdRng| {
                    if has_float {
                        let frm: Vec<u64> = (0..8).map(|i| i << 5).collect();
                        csrmg.gen_csr_mod("fcsr", 0x7 << 5, &frm, rng)
                    } else {
                        String::new()
                    }
                })),
                // set vector fixed point rounding mode
                Expansion::Call(Rc::new(move |rng: &mut StdRng| {
                    csrmg.gen_csr_mod("vxrm", 0x3, &[0, 1, 2, 3], rng)
                })),
            ],
        );
        g.alts("<instr_v_load_store>", &["<instr_v_load>", "<instr_v_store>"]);
        {
            let blsg = Rc::clone(&blsg_load);
            g.produce("<instr_v_load>", move |rng| blsg.gen_load(rng));
        }
        {
            let blsg = Rc::clone(&blsg_store);
            g.produce("<instr_v_store>", move |rng| blsg.gen_store(rng));
        }
        g.alts("<vtypei>", &["<vsew>, <vlmul>, <vta>, <vma>"]);
        g.alts("<vsew>", &["e8", "e16", "e32", "e64"]);
        g.alts("<vmv_nr>", &["1", "2", "4", "8"]);
        g.alts("<vlmul>", &["mf8", "mf4", "mf2", "m1", "m2", "m4", "m8"]);
        g.alts("<vta>", &["tu", "ta"]);
        g.alts("<vma>", &["mu", "ma"]);
        g.alts(
            "<instr_v_compute>",
            &[
                "<instr_v_vector_integer>",
                "<instr_v_fixed_point>",
                "<instr_v_floating_point>",
                "<instr_v_vector_reduction>",
                "<instr_v_vector_mask>",
                "<instr_v_vector_permutation>",
            ],
        );
        // vector integer (V-spec §11)
        g.alts(
            "<instr_v_vector_integer>",
            &[
                // single width add/sub
                "vadd<.vv>",
                "vadd<.vx>",
                "vadd<.vi>",
                "vsub<.vv>",
                "vsub<.vx>",
                "vrsub<.vx>",
                "vrsub<.vi>",
                // widening add/sub
                "vwaddu<.vv>",
                "vwaddu<.vx>",
                "vwsubu<.vv>",
                "vwsubu<.vx>",
                "vwadd<.vv>",
                "vwadd<.vx>",
                "vwsub<.vv>",
                "vwsub<.vx>",
                "vwaddu<.wv>",
                "vwaddu<.wx>",
                "vwsubu<.wv>",
                "vwsubu<.wx>",
                "vwadd<.wv>",
                "vwadd<.wx>",
                "vwsub<.wv>",
                "vwsub<.wx>",
                // extension
                "vzext<.vfX>",
                "vsext<.vfX>",
                // add-with-carry / subtract-with-borrow
                "vadc<.vvm>",
                "vadc<.vxm>",
                "vadc<.vim>",
                "vmadc<.vvm>",
                "vmadc<.vxm>",
                "vmadc<.vim>",
                "vmadc<.vv_novm>",
                "vmadc<.vx_novm>",
                "vmadc<.vi_novm>",
                "vsbc<.vvm>",
                "vsbc<.vxm>",
                "vmsbc<.vvm>",
                "vmsbc<.vxm>",
                "vmsbc<.vv_novm>",
                "vmsbc<.vx_novm>",
                // bitwise logic
                "vand<.vv>",
                "vand<.vx>",
                "vand<.vi>",
                "vor<.vv>",
                "vor<.vx>",
                "vor<.vi>",
                "vxor<.vv>",
                "vxor<.vx>",
                "vxor<.vi>",
                // single-width shift
                "vsll<.vv>",
                "vsll<.vx>",
                "vsll<.vi_uimm>",
                "vsrl<.vv>",
                "vsrl<.vx>",
                "vsrl<.vi_uimm>",
                "vsra<.vv>",
                "vsra<.vx>",
                "vsra<.vi_uimm>",
                // narrowing right shift
                "vnsrl<.wv>",
                "vnsrl<.wx>",
                "vnsrl<.wi>",
                "vnsra<.wv>",
                "vnsra<.wx>",
                "vnsra<.wi>",
                // compare
                "vmseq<.vv>",
                "vmseq<.vx>",
                "vmseq<.vi>",
                "vmsne<.vv>",
                "vmsne<.vx>",
                "vmsne<.vi>",
                "vmsltu<.vv>",
                "vmsltu<.vx>",
                "vmslt<.vv>",
                "vmslt<.vx>",
                "vmsleu<.vv>",
                "vmsleu<.vx>",
                "vmsleu<.vi>",
                "vmsle<.vv>",
                "vmsle<.vx>",
                "vmsle<.vi>",
                "vmsgtu<.vx>",
                "vmsgtu<.vi>",
                "vmsgt<.vx>",
                "vmsgt<.vi>",
                // min/max
                "vminu<.vv>",
                "vminu<.vx>",
                "vmin<.vv>",
                "vmin<.vx>",
                "vmaxu<.vv>",
                "vmaxu<.vx>",
                "vmax<.vv>",
                "vmax<.vx>",
                // single-width multiply
                "vmul<.vv>",
                "vmul<.vx>",
                "vmulh<.vv>",
                "vmulh<.vx>",
                "vmulhu<.vv>",
                "vmulhu<.vx>",
                "vmulhsu<.vv>",
                "vmulhsu<.vx>",
                // divide
                "vdivu<.vv>",
                "vdivu<.vx>",
                "vdiv<.vv>",
                "vdiv<.vx>",
                "vremu<.vv>",
                "vremu<.vx>",
                "vrem<.vv>",
                "vrem<.vx>",
                // widening multiply
                "vwmul<.vv>",
                "vwmul<.vx>",
                "vwmulu<.vv>",
                "vwmulu<.vx>",
                "vwmulsu<.vv>",
                "vwmulsu<.vx>",
                // single-width multiply-add
                "vmacc<.vv_mac>",
                "vmacc<.vx_mac>",
                "vnmsac<.vv_mac>",
                "vnmsac<.vx_mac>",
                "vmadd<.vv_mac>",
                "vmadd<.vx_mac>",
                "vnmsub<.vv_mac>",
                "vnmsub<.vx_mac>",
                // widening multiply-add
                "vwmaccu<.vv_mac>",
                "vwmaccu<.vx_mac>",
                "vwmacc<.vv_mac>",
                "vwmacc<.vx_mac>",
                "vwmaccsu<.vv_mac>",
                "vwmaccsu<.vx_mac>",
                "vwmaccus<.vx_mac>",
                // merge
                "vmerge<.vvm>",
                "vmerge<.vxm>",
                "vmerge<.vim>",
                // move
                "vmv.v.v <vd>, <vs1>",
                "vmv.v.x <vd>, <rs1>",
                "vmv.v.i <vd>, <imm5>",
            ],
        );
        // fixed point (V-spec §12)
        g.alts(
            "<instr_v_fixed_point>",
            &[
                // saturating add/sub
                "vsaddu<.vv>",
                "vsaddu<.vx>",
                "vsaddu<.vi>",
                "vsadd<.vv>",
                "vsadd<.vx>",
                "vsadd<.vi>",
                "vssub<.vv>",
                "vssub<.vx>",
                "vssubu<.vv>",
                "vssubu<.vx>",
                // averaging add/sub
                "vaaddu<.vv>",
                "vaaddu<.vx>",
                "vaadd<.vv>",
                "vaadd<.vx>",
                "vasubu<.vv>",
                "vasubu<.vx>",
                "vasub<.vv>",
                "vasub<.vx>",
                // fractional multiply with rounding and saturation
                "vsmul<.vv>",
                "vsmul<.vx>",
                // scaling shifts
                "vssrl<.vv>",
                "vssrl<.vx>",
                "vssrl<.vi_uimm>",
                "vssra<.vv>",
                "vssra<.vx>",
                "vssra<.vi_uimm>",
                // narrowing clip
                "vnclipu<.wv>",
                "vnclipu<.wx>",
                "vnclipu<.wi>",
                "vnclip<.wv>",
                "vnclip<.wx>",
                "vnclip<.wi>",
            ],
        );
        // floating point (V-spec §13)
        g.alts(
            "<instr_v_floating_point>",
            &[
                "vfadd<.vv>",
                "vfadd<.vf>",
                "vfsub<.vv>",
                "vfsub<.vf>",
                "vfrsub<.vf>",
                "vfwadd<.vv>",
                "vfwadd<.vf>",
                "vfwsub<.vv>",
                "vfwsub<.vf>",
                "vfwadd<.wv>",
                "vfwadd<.wf>",
                "vfwsub<.wv>",
                "vfwsub<.wf>",
                "vfmul<.vv>",
                "vfmul<.vf>",
                "vfdiv<.vv>",
                "vfdiv<.vf>",
                "vfrdiv<.vf>",
                "vfwmul<.vv>",
                "vfwmul<.vf>",
                "vfmacc<.vv>",
                "vfmacc<.vf2>",
                "vfnmacc<.vv>",
                "vfnmacc<.vf2>",
                "vfmsac<.vv>",
                "vfmsac<.vf2>",
                "vfnmsac<.vv>",
                "vfnmsac<.vf2>",
                "vfmadd<.vv>",
                "vfmadd<.vf2>",
                "vfnmadd<.vv>",
                "vfnmadd<.vf2>",
                "vfmsub<.vv>",
                "vfmsub<.vf2>",
                "vfnmsub<.vv>",
                "vfnmsub<.vf2>",
                "vfwmacc<.vv>",
                "vfwmacc<.vf2>",
                "vfwnmacc<.vv>",
                "vfwnmacc<.vf2>",
                "vfwmsac<.vv>",
                "vfwmsac<.vf2>",
                "vfwnmsac<.vv>",
                "vfwnmsac<.vf2>",
                "vfsqrt<.v>",
                "vfrsqrt7<.v>",
                "vfrec7<.v>",
                "vfmin<.vv>",
                "vfmin<.vf>",
                "vfmax<.vv>",
                "vfmax<.vf>",
                "vfsgnj<.vv>",
                "vfsgnj<.vf>",
                "vfsgnjn<.vv>",
                "vfsgnjn<.vf>",
                "vfsgnjx<.vv>",
                "vfsgnjx<.vf>",
                "vmfeq<.vv>",
                "vmfeq<.vf>",
                "vmfne<.vv>",
                "vmfne<.vf>",
                "vmflt<.vv>",
                "vmflt<.vf>",
                "vmfle<.vv>",
                "vmfle<.vf>",
                "vmfgt<.vf>",
                "vmfge<.vf>",
                "vfclass<.v>",
                "vfmerge<.vfm>",
                "vfmv.v.f <vd>, <fs1>",
                "vfcvt.xu.f<.v>",
                "vfcvt.x.f<.v>",
                "vfcvt.rtz.xu.f<.v>",
                "vfcvt.rtz.x.f<.v>",
                "vfcvt.f.xu<.v>",
                "vfcvt.f.x<.v>",
                "vfwcvt.xu.f<.v>",
                "vfwcvt.x.f<.v>",
                "vfwcvt.rtz.xu.f<.v>",
                "vfwcvt.rtz.x.f<.v>",
                "vfwcvt.f.xu<.v>",
                "vfwcvt.f.x<.v>",
                "vfwcvt.f.f<.v>",
                "vfncvt.xu.f<.w>",
                "vfncvt.x.f<.w>",
                "vfncvt.rtz.xu.f<.w>",
                "vfncvt.rtz.x.f<.w>",
                "vfncvt.f.xu<.w>",
                "vfncvt.f.x<.w>",
                "vfncvt.f.f<.w>",
                "vfncvt.rod.f.f<.w>",
            ],
        );
        // reductions (V-spec §14)
        g.alts(
            "<instr_v_vector_reduction>",
            &[
                "vredsum<.vs>",
                "vredmaxu<.vs>",
                "vredmax<.vs>",
                "vredminu<.vs>",
                "vredmin<.vs>",
                "vredand<.vs>",
                "vredor<.vs>",
                "vredxor<.vs>",
                "vwredsumu<.vs>",
                "vwredsum<.vs>",
                "vfredosum<.vs>",
                "vfredusum<.vs>",
                "vfredmax<.vs>",
                "vfredmin<.vs>",
                "vfwredosum<.vs>",
                "vfwredusum<.vs>",
            ],
        );
        // mask instructions (V-spec §15)
        g.alts(
            "<instr_v_vector_mask>",
            &[
                "vmand<.mm>",
                "vmandn<.mm>",
                "vmnand<.mm>",
                "vmxor<.mm>",
                "vmor<.mm>",
                "vmnor<.mm>",
                "vmorn<.mm>",
                "vmxnor<.mm>",
                "vcpop<.m>",
                "vfirst<.m>",
                "vmsbf<.m2>",
                "vmsif<.m2>",
                "vmsof<.m2>",
                "viota<.m2>",
                "vid<.v2>",
            ],
        );
        // permutation (V-spec §16)
        g.alts(
            "<instr_v_vector_permutation>",
            &[
                "vmv.x.s <rd>, <vs2>",
                "vmv.s.x <vd>, <rs1>",
                "vfmv.f.s <fd>, <vs2>",
                "vfmv.s.f <vd>, <fs1>",
                "vslideup<.vx>",
                "vslideup<.vi_uimm>",
                "vslidedown<.vx>",
                "vslidedown<.vi_uimm>",
                "vslide1up<.vx>",
                "vfslide1up<.vf>",
                "vslide1down<.vx>",
                "vfslide1down<.vf>",
                "vrgather<.vv>",
                "vrgatherei16<.vv>",
                "vrgather<.vx>",
                "vrgather<.vi_uimm>",
                "vcompress<.vm>",
                "vmv<vmv_nr>r<.v_nom>",
            ],
        );
        // operand-form suffixes
        g.alts("<.vv>", &[".vv <vd>, <vs2>, <vs1><vm>"]);
        g.alts("<.vx>", &[".vx <vd>, <vs2>, <rs1><vm>"]);
        g.alts("<.vi>", &[".vi <vd>, <vs2>, <imm5><vm>"]);
        // widening
        g.alts("<.wv>", &[".wv <vd>, <vs2>, <vs1><vm>"]);
        g.alts("<.wx>", &[".wx <vd>, <vs2>, <rs1><vm>"]);
        g.alts("<.wi>", &[".wi <vd>, <vs2>, <uimm5><vm>"]);
        // integer extension
        g.alts("<.vfX>", &["<.vfY> <vd>, <vs2><vm>"]);
        g.alts("<.vfY>", &[".vf2", ".vf4", ".vf8"]);
        // sum with carry / difference with borrow
        g.alts("<.vvm>", &[".vvm <vd>, <vs2>, <vs1>, v0"]);
        g.alts("<.vxm>", &[".vxm <vd>, <vs2>, <rs1>, v0"]);
        g.alts("<.vim>", &[".vim <vd>, <vs2>, <imm5>, v0"]);
        // alternatives without mask operand
        g.alts("<.vv_novm>", &[".vv <vd>, <vs2>, <vs1>"]);
        g.alts("<.vx_novm>", &[".vx <vd>, <vs2>, <rs1>"]);
        g.alts("<.vi_novm>", &[".vi <vd>, <vs2>, <imm5>"]);
        // bit shift
        g.alts("<.vi_uimm>", &[".vi <vd>, <vs2>, <uimm5><vm>"]);
        // multiply-accumulate operand order
        g.alts("<.vv_mac>", &[".vv <vd>, <vs1>, <vs2><vm>"]);
        g.alts("<.vx_mac>", &[".vx <vd>, <rs1>, <vs2><vm>"]);
        // float
        g.alts("<.vf>", &[".vf <vd>, <vs2>, <fs1><vm>"]);
        g.alts("<.wf>", &[".wf <vd>, <vs2>, <fs1><vm>"]);
        g.alts("<.vf2>", &[".vf <vd>, <fs1>, <vs2><vm>"]);
        g.alts("<.v>", &[".v <vd>, <vs2><vm>"]);
        g.alts("<.w>", &[".w <vd>, <vs2><vm>"]);
        g.alts("<.vfm>", &[".vfm <vd>, <vs2>, <fs1>, v0"]);
        // reduction
        g.alts("<.vs>", &[".vs <vd>, <vs2>, <vs1><vm>"]);
        // mask
        g.alts("<.mm>", &[".mm <vd>, <vs2>, <vs1>"]);
        g.alts("<.m>", &[".m <rd>, <vs2><vm>"]);
        g.alts("<.m2>", &[".m <vd>, <vs2><vm>"]);
        g.alts("<.v2>", &[".v <vd><vm>"]);
        // permutation
        g.alts("<.vm>", &[".vm <vd>, <vs2>, <vs1>"]);
        g.alts("<.v_nom>", &[".v <vd>, <vs2>"]);
        // masking
        g.alts("<vm>", &["", ", v0.t"]);
        // integer registers
        g.alts("<rd>", &["<reg>"]);
        g.alts("<rs1>", &["<reg>"]);
        g.alts("<rs2>", &["<reg>"]);
        g.produce("<reg>", |rng| alloc::reg_name(true, rng));
        // vector registers
        g.alts("<vd>", &["<vreg>"]);
        g.alts("<vs1>", &["<vreg>"]);
        g.alts("<vs2>", &["<vreg>"]);
        {
            let vreg = Rc::clone(&vreg);
            g.produce("<vreg>", move |rng| vreg.borrow_mut().next(rng));
        }
        // floating point registers
        g.alts("<fd>", &["<freg>"]);
        g.alts("<fs1>", &["<freg>"]);
        g.produce("<freg>", alloc::freg_name);
        // immediates
        g.produce("<uimm5>", |rng| alloc::imm_unsigned(5, rng).to_string());
        g.produce("<imm5>", |rng| alloc::imm_signed(5, rng).to_string());
        g
    }
}

impl ProgramGenerator for RvvGenerator {
    fn gen_fragment(&mut self) -> Result<CodeFragment> {
        Ok(CodeFragment::new(expand(&self.grammar, &mut self.rng)?))
    }
}
