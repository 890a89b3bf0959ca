//! # Generator Property Tests
//!
//! The load/store window invariant — the safety-critical property of the
//! whole generator — plus label bookkeeping, vector register selection,
//! and smoke tests over the full grammars.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::common::test_config;
use rvvfuzz_core::config::IsaConfig;
use rvvfuzz_core::isg::alloc::{LabelGen, VRegChooser, bit_length, hex_signed};
use rvvfuzz_core::isg::rv::{BoundedLoadStore, RvGenerator};
use rvvfuzz_core::isg::rvv::RvvGenerator;
use rvvfuzz_core::isg::{MultiGenerator, ProgramGenerator};

const MEMSTART: u64 = 0x8000_0000;
const MEMLEN: u64 = 0x2000;

fn isa(xlen: u32) -> IsaConfig {
    IsaConfig {
        xlen,
        rv_extensions: "mafdcv".to_string(),
        vector_vlen: 128,
        vector_elen: 64,
    }
}

/// Symbolically executes the clamp sequence:
/// `and rs1, rs1, mask; add rs1, rs1, memstart - imm; <op> imm(rs1)`.
fn effective_address(xlen: u32, pre_clamp: u64, imm12: i64, mask: u64) -> u64 {
    let xlen_mask = if xlen >= 64 {
        u64::MAX
    } else {
        (1u64 << xlen) - 1
    };
    let masked = pre_clamp & mask & xlen_mask;
    let rebase = MEMSTART.wrapping_sub(imm12 as u64) & xlen_mask;
    let rs1 = masked.wrapping_add(rebase) & xlen_mask;
    rs1.wrapping_add(imm12 as u64) & xlen_mask
}

proptest! {
    /// Every clamped access lands inside the window's power-of-two envelope
    /// and is naturally aligned, no matter the pre-clamp register value.
    #[test]
    fn scalar_access_stays_in_window(
        pre_clamp in any::<u64>(),
        imm12 in -2048i64..2048,
        xlen in prop::sample::select(vec![32u32, 64]),
        width in prop::sample::select(vec![1u64, 2, 4, 8]),
    ) {
        let blsg = BoundedLoadStore::new(&isa(xlen), MEMSTART, MEMLEN);
        let mask = blsg.clamp_mask(width);
        let addr = effective_address(xlen, pre_clamp, imm12, mask);

        let envelope = 1u64 << (bit_length(MEMLEN) - 1);
        prop_assert!(addr >= MEMSTART);
        prop_assert!(addr + width <= MEMSTART + envelope);
        prop_assert_eq!(addr % width, 0);
    }
}

#[test]
fn clamp_mask_combines_window_and_alignment() {
    let blsg = BoundedLoadStore::new(&isa(64), MEMSTART, MEMLEN);
    assert_eq!(blsg.clamp_mask(1), 0x1fff);
    assert_eq!(blsg.clamp_mask(2), 0x1ffe);
    assert_eq!(blsg.clamp_mask(4), 0x1ffc);
    assert_eq!(blsg.clamp_mask(8), 0x1ff8);
}

#[test]
fn scalar_emitter_shape() {
    let blsg = BoundedLoadStore::new(&isa(64), MEMSTART, MEMLEN);
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..200 {
        let code = blsg.gen_load(&mut rng);
        assert_eq!(code.matches("li ").count(), 2);
        assert_eq!(code.matches("and ").count(), 1);
        assert_eq!(code.matches("add ").count(), 1);
        // the base register is never x0
        assert!(!code.contains("and x0,"));

        let code = blsg.gen_store(&mut rng);
        assert!(["sb", "sh", "sw", "sd"].iter().any(|s| code.contains(s)));
    }
}

#[test]
fn label_promises_are_fixed_up() {
    let mut labels = LabelGen::new();
    assert_eq!(labels.place_first(), "_label0:");
    assert_eq!(labels.place(), "_label1:");

    let mut rng = StdRng::seed_from_u64(1);
    let mut promised_future = false;
    for _ in 0..64 {
        let name = labels.get(&mut rng);
        assert!(name.starts_with("_label"));
        let n: u32 = name["_label".len()..].parse().expect("label index");
        if n >= 2 {
            promised_future = true;
        }
    }
    assert!(promised_future, "get() never promised a future label");

    let stubs = labels.emit_missing();
    // every promised label now exists exactly once
    for line in stubs.lines() {
        assert!(line.starts_with("_label") && line.ends_with(':'));
    }
    // a second fixup has nothing left to place
    assert!(labels.emit_missing().is_empty());
}

#[test]
fn vreg_chooser_yields_group_aligned_registers() {
    let mut chooser = VRegChooser::new();
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..512 {
        let name = chooser.next(&mut rng);
        let n: u32 = name[1..].parse().expect("vreg index");
        assert!(n < 32);
    }
}

#[test]
fn hex_signed_renders_assembler_literals() {
    assert_eq!(hex_signed(0), "0x0");
    assert_eq!(hex_signed(2047), "0x7ff");
    assert_eq!(hex_signed(-5), "-0x5");
}

#[test]
fn rv_generator_produces_closed_fragments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let mut generator = RvGenerator::seeded(&config, 7).expect("generator");

    let init = generator.gen_init_fragments().expect("init");
    assert!(init.as_code().contains("_label0:"));
    // init restores the full integer register file
    assert!(init.as_code().contains("li x31, "));

    for _ in 0..300 {
        let fragment = generator.gen_fragment().expect("fragment");
        let code = fragment.as_code();
        assert!(!code.contains('<'), "unexpanded nonterminal in {code:?}");
        assert!(!code.trim().is_empty());
    }

    let _ = generator.gen_deinit_fragments().expect("deinit");
}

#[test]
fn rvv_generator_produces_closed_fragments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let mut generator = RvvGenerator::seeded(&config, 13).expect("generator");

    let mut saw_load_store = false;
    for _ in 0..500 {
        let fragment = generator.gen_fragment().expect("fragment");
        let code = fragment.as_code();
        assert!(!code.contains('<'), "unexpanded nonterminal in {code:?}");
        if code.contains("vle") || code.contains("vse") || code.contains("vls") {
            saw_load_store = true;
        }
    }
    assert!(saw_load_store, "load/store rules never fired");
}

#[test]
fn multi_generator_block_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let mut generator = MultiGenerator::for_config_seeded(&config, 3).expect("generator");

    for _ in 0..10 {
        let block = generator.gen_block(2, 10).expect("block");
        assert!(block.main_len() >= 2 && block.main_len() <= 10);
        assert!(block.init.as_code().contains("_label0:"));
        assert!(!block.as_code().contains('<'));
    }
}

#[test]
fn store_generator_respects_the_data_window() {
    // the store emitter is built over the data window only: its clamp mask
    // must not exceed the data window envelope
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let blsg = BoundedLoadStore::new(
        &config.isa,
        config.memory.dmemstart,
        config.memory.dmemlen,
    );
    let envelope = 1u64 << (bit_length(config.memory.dmemlen) - 1);
    for width in [1u64, 2, 4, 8] {
        assert!(blsg.clamp_mask(width) < envelope);
    }
}
