//! # Corpus Replay Tests
//!
//! Corpus discovery through the recursive glob and the corpus-wide size
//! statistics. The replay loop itself needs live simulators and is covered
//! by campaign runs, not unit tests.

use crate::common::test_config;
use rvvfuzz_core::code::{CodeBlock, CodeFragment};
use rvvfuzz_core::fuzz::testset::TestsetStage;

fn saved_block(dir: &std::path::Path, name: &str, fragments: usize) -> CodeBlock {
    let mut block = CodeBlock::new();
    block.init.add(CodeFragment::new("_label0:"));
    for i in 0..fragments {
        block.add(CodeFragment::new(format!("    addi x1, x0, {i}")));
    }
    std::fs::create_dir_all(dir).expect("corpus dir");
    block.save(&dir.join(name)).expect("save block");
    block
}

#[test]
fn corpus_is_discovered_recursively() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let corpus = tmp.path().join("corpus");
    let _ = saved_block(&corpus, "testcase_code.json", 3);
    let _ = saved_block(&corpus.join("ERROR_vadd.vv_iteration_0000000000"), "testcase_code.json", 7);
    // non-matching names are ignored
    let _ = saved_block(&corpus, "res_code_block.json", 2);

    let mut config = test_config(&tmp.path().join("work"));
    config.testset.dir = corpus;
    config.testset.pattern = "testcase_code.json".to_string();

    let stage = TestsetStage::new(&config).expect("testset stage");
    assert_eq!(stage.len(), 2);
    assert!(!stage.is_empty());
}

#[test]
fn corpus_stats_aggregate_min_max_avg() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let corpus = tmp.path().join("corpus");
    let _ = saved_block(&corpus.join("a"), "testcase_code.json", 2);
    let _ = saved_block(&corpus.join("b"), "testcase_code.json", 6);

    let mut config = test_config(&tmp.path().join("work"));
    config.testset.dir = corpus;

    let stage = TestsetStage::new(&config).expect("testset stage");
    let stats = stage.corpus_stats().expect("stats");
    assert_eq!(stats.testcases, 2);
    // each block carries one init fragment on top of its payload
    assert_eq!(stats.fragments, (3, 7, 5.0));
    assert_eq!(stats.total.fragments, 10);
}
