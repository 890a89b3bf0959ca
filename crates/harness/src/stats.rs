//! Campaign statistics blocks.
//!
//! Flat counter structures for the long-running stages, each with a
//! `Display` rendering that lands in the per-stage `stats.log` artifact:
//! 1. **Bench:** Outcome tallies of a plain iteration driver.
//! 2. **Archive:** Outcome tallies plus the archive iteration index.
//! 3. **Minimize:** The full funnel from test to reduction to minimization,
//!    including the per-mnemonic error histogram.
//! 4. **Fuzz:** The coverage-guided loop's candidate bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Outcome tallies of [`run_bench`](crate::runner::run_bench).
#[derive(Debug, Clone, Default)]
pub struct BenchStats {
    /// COMPLETE iterations.
    pub completes: u64,
    /// IGNORE iterations.
    pub ignores: u64,
    /// ERROR (and unknown) iterations.
    pub errors: u64,
    /// TIMEOUT iterations.
    pub timeouts: u64,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl fmt::Display for BenchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "completes: {}", self.completes)?;
        writeln!(f, "ignores: {}", self.ignores)?;
        writeln!(f, "errors: {}", self.errors)?;
        writeln!(f, "timeouts: {}", self.timeouts)?;
        writeln!(f, "elapsed_s: {:.3}", self.elapsed.as_secs_f64())
    }
}

/// Tallies of an [`ArchiveStage`](crate::runner::ArchiveStage).
#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    /// Iterations seen so far.
    pub iterations: u64,
    /// IGNORE results.
    pub ignores: u64,
    /// ERROR results.
    pub errors: u64,
    /// TIMEOUT results.
    pub timeouts: u64,
    /// COMPLETE results.
    pub completes: u64,
}

impl fmt::Display for ArchiveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iterations: {}", self.iterations)?;
        writeln!(f, "ignores: {}", self.ignores)?;
        writeln!(f, "errors: {}", self.errors)?;
        writeln!(f, "completes: {}", self.completes)
    }
}

/// Funnel counters of the reduce/minimize stage.
#[derive(Debug, Clone, Default)]
pub struct MinimizeStats {
    /// Code blocks tested.
    pub tests: u64,
    /// Blocks that compared clean.
    pub completes: u64,
    /// Blocks skipped (build rejected under ignore policy).
    pub ignores: u64,
    /// Blocks that timed out.
    pub timeouts: u64,
    /// Outcomes outside the taxonomy (kept visible, never dropped).
    pub unknown_faults: u64,
    /// Blocks exhibiting a state mismatch.
    pub errors: u64,
    /// Successful bisection reductions.
    pub reductions: u64,
    /// Successful state-prefix minimizations.
    pub minimizations: u64,
    /// Error histogram keyed by offending mnemonic.
    pub instr_errors: BTreeMap<String, u64>,
}

impl fmt::Display for MinimizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tests: {}", self.tests)?;
        writeln!(f, "completes: {}", self.completes)?;
        writeln!(f, "ignores: {}", self.ignores)?;
        writeln!(f, "timeouts: {}", self.timeouts)?;
        writeln!(f, "unknown_faults: {}", self.unknown_faults)?;
        writeln!(f, "errors: {}", self.errors)?;
        writeln!(f, "reductions: {}", self.reductions)?;
        writeln!(f, "minimizations: {}", self.minimizations)?;
        for (mnemonic, count) in &self.instr_errors {
            writeln!(f, "instr_error[{mnemonic}]: {count}")?;
        }
        Ok(())
    }
}

/// Candidate bookkeeping of the coverage-guided loop.
#[derive(Debug, Clone, Default)]
pub struct FuzzStats {
    /// Candidate blocks generated or mutated.
    pub generates: u64,
    /// Candidates whose build was skipped.
    pub ignores: u64,
    /// Candidates that timed out.
    pub timeouts: u64,
    /// Candidates that errored.
    pub errors: u64,
    /// Outcomes outside the taxonomy.
    pub unknown_faults: u64,
    /// Candidates that ran clean.
    pub completes: u64,
    /// Candidates that raised exceptions.
    pub exceptions: u64,
    /// Candidates accepted as valid.
    pub valids: u64,
    /// Accepted extensions.
    pub extensions: u64,
    /// Extensions accepted despite a coverage regression.
    pub extensions_redcov: u64,
    /// Accepted reductions.
    pub reductions: u64,
    /// Current payload length in fragments.
    pub code_len: u64,
    /// Current coverage points.
    pub coverage_points: u64,
    /// Current coverage percentage.
    pub coverage_percent: f64,
}

impl fmt::Display for FuzzStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "generates: {}", self.generates)?;
        writeln!(f, "ignores: {}", self.ignores)?;
        writeln!(f, "timeouts: {}", self.timeouts)?;
        writeln!(f, "errors: {}", self.errors)?;
        writeln!(f, "unknown_faults: {}", self.unknown_faults)?;
        writeln!(f, "completes: {}", self.completes)?;
        writeln!(f, "exceptions: {}", self.exceptions)?;
        writeln!(f, "valids: {}", self.valids)?;
        writeln!(f, "extensions: {}", self.extensions)?;
        writeln!(f, "extensions_redcov: {}", self.extensions_redcov)?;
        writeln!(f, "reductions: {}", self.reductions)?;
        writeln!(f, "codelen: {}", self.code_len)?;
        writeln!(f, "coverage_points: {}", self.coverage_points)?;
        writeln!(f, "coverage_percent: {}", self.coverage_percent)
    }
}
