//! # Unit Tests
//!
//! Fine-grained tests for the individual harness components, organized to
//! mirror the crate's module tree.

/// Program assembly and prologue/epilogue emission.
pub mod build_program;
/// Fragment containers, statistics and persistence round-trips.
pub mod code;
/// Configuration defaults, validation and deserialization.
pub mod config;
/// Dump-region layout, extraction and digests.
pub mod dump;
/// Coverage-guided loop state machine against a mock validator.
pub mod fuzz_loop;
/// Grammar engine expansion and termination.
pub mod grammar;
/// Generator properties, most importantly the memory-window bounds.
pub mod isg_bounds;
/// Delta reduction and minimization.
pub mod reduce;
/// Simulator output parsers.
pub mod sim_parse;
/// Corpus discovery and statistics.
pub mod testset;
