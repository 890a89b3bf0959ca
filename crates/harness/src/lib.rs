//! Differential-testing and coverage-guided fuzzing harness for RISC-V
//! simulators.
//!
//! This crate implements the full pipeline around a reference simulator
//! (Spike), a coverage engine (riscvOVPsim) and a device-under-test
//! simulator (QEMU or tiny-vp behind GDB):
//! 1. **Generation:** Grammar-driven random RV32/RV64 I/F/D/V programs with
//!    provably window-bounded memory accesses.
//! 2. **Build:** A state-capturing prologue/epilogue around the generated
//!    body, linker script, and external toolchain invocation.
//! 3. **Execution:** Parallel runs on reference, coverage and DUT with
//!    per-subprocess deadlines and directory-scoped artifacts.
//! 4. **Comparison:** Field-exact terminal machine-state equality.
//! 5. **Reduction:** Delta-debugging plus state-prefix minimization of
//!    failing programs, and a coverage-guided extend/reduce loop over a
//!    persistent seed.

/// Program assembly, linker script, toolchain invocation.
pub mod build;
/// Assembly fragment containers and persistence.
pub mod code;
/// Shared leaf types (errors, register names).
pub mod common;
/// Campaign configuration.
pub mod config;
/// Coverage-guided fuzzing loop and corpus replay.
pub mod fuzz;
/// Instruction stream generation.
pub mod isg;
/// Stage compositions (build → run → compare).
pub mod pipeline;
/// Failure reduction and minimization.
pub mod reduce;
/// Stage framework (lifecycle, outcomes, subprocesses, workers, archive).
pub mod runner;
/// External simulator adapters.
pub mod sim;
/// Machine-state model and dump codecs.
pub mod state;
/// Campaign statistics blocks.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The (init, main, deinit) program container all stages exchange.
pub use crate::code::CodeBlock;
/// Canonical architectural state snapshot.
pub use crate::state::MachineState;
/// Outcome taxonomy shared by every stage.
pub use crate::runner::RunnerOutcome;
