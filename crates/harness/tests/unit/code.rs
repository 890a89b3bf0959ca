//! # Code Container Tests
//!
//! Fragment statistics, list slicing, block composition, and the exact
//! JSON persistence round-trip the coverage-guided loop depends on.

use pretty_assertions::assert_eq;
use rvvfuzz_core::code::{CodeBlock, CodeFragment, CodeFragmentList};

#[test]
fn fragment_stats_count_lines_ins_vins() {
    let fragment = CodeFragment::new("    addi x1, x0, 1\n\n    vadd.vv v1, v2, v3\nvsetvli t0, zero, e8, ta, ma");
    let stats = fragment.stats();
    assert_eq!(stats.fragments, 1);
    assert_eq!(stats.lines, 4);
    assert_eq!(stats.ins, 3);
    assert_eq!(stats.vins, 2);
}

#[test]
fn fragment_replace_is_in_place() {
    let mut fragment = CodeFragment::new("    add x1, x2, x3");
    fragment.replace("x2", "x7");
    assert_eq!(fragment.as_code(), "    add x1, x7, x3");
}

#[test]
fn list_slicing_and_stats() {
    let mut list = CodeFragmentList::new();
    for i in 0..5 {
        list.add(CodeFragment::new(format!("    addi x1, x0, {i}")));
    }
    assert_eq!(list.len(), 5);

    let part = list.part(1, 3);
    assert_eq!(part.len(), 2);
    assert_eq!(part.as_slice()[0].as_code(), "    addi x1, x0, 1");

    // out-of-range bounds clamp instead of panicking
    assert_eq!(list.part(4, 100).len(), 1);
    assert_eq!(list.part(7, 9).len(), 0);

    let stats = list.stats();
    assert_eq!(stats.fragments, 5);
    assert_eq!(stats.ins, 5);
}

#[test]
fn block_part_shares_init_and_deinit() {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("_label0:"));
    block.deinit.add(CodeFragment::new("_label1:"));
    for i in 0..10 {
        block.add(CodeFragment::new(format!("    addi x{i}, x0, {i}")));
    }

    let part = block.part(2, 5);
    assert_eq!(part.main_len(), 3);
    assert_eq!(part.init, block.init);
    assert_eq!(part.deinit, block.deinit);
    assert_eq!(part.main.as_slice()[0].as_code(), "    addi x2, x0, 2");
}

#[test]
fn block_as_code_orders_init_main_deinit() {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("init"));
    block.add(CodeFragment::new("main"));
    block.deinit.add(CodeFragment::new("deinit"));
    assert_eq!(block.as_code(), "init\nmain\ndeinit");
}

#[test]
fn json_roundtrip_is_exact() {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("    li x5, 0x6600"));
    block.add(CodeFragment::new("\n    li x3, 0x1fff\n    and x7, x7, x3\n"));
    block.add(CodeFragment::new("    vadd.vv v1, v2, v3, v0.t"));
    block.deinit.add(CodeFragment::new("_label0:\n_label1:\n"));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("code_block.json");
    block.save(&path).expect("save");
    let loaded = CodeBlock::load(&path).expect("load");

    assert_eq!(loaded, block);
    assert_eq!(loaded.as_code(), block.as_code());

    // the format is stable: saving the loaded block changes nothing
    let path2 = dir.path().join("code_block2.json");
    loaded.save(&path2).expect("save again");
    let text1 = std::fs::read_to_string(&path).expect("read");
    let text2 = std::fs::read_to_string(&path2).expect("read");
    assert_eq!(text1, text2);
}

#[test]
fn block_replace_covers_all_parts() {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("a REG b"));
    block.add(CodeFragment::new("c REG d"));
    block.deinit.add(CodeFragment::new("e REG f"));
    block.replace("REG", "x9");
    assert_eq!(block.as_code(), "a x9 b\nc x9 d\ne x9 f");
}
