//! Common types shared across the harness.
//!
//! This module collects the leaf definitions used everywhere else:
//! 1. **Errors:** The crate-wide error sum type and `Result` alias.
//! 2. **Registers:** The RISC-V integer register ABI-name/index table.

/// Crate-wide error type and `Result` alias.
pub mod error;
/// RISC-V integer register ABI names and index lookup.
pub mod reg;

pub use error::{HarnessError, Result};
