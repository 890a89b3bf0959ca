//! Reference simulator adapter (Spike).
//!
//! Drives Spike in debug mode with a fixed command script: run to the
//! breakpoint, print PC and the register file, single-step once so the dump
//! epilogue completes, run to the breakpoint again, dump memory, quit. The
//! register dump lands on stderr and is parsed into the integer register
//! file; everything else comes out of the dumped memory image.

use std::path::PathBuf;

use crate::common::reg::gpr_index;
use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::runner::{ProcessOutput, ProcessRequest, ProcessStage, Stage, StageDir, StageResult};
use crate::sim::RunBinary;
use crate::state::MachineState;
use crate::state::dump::DumpFile;

/// Stage running the reference simulator once per iteration.
pub struct SpikeStage {
    dir: StageDir,
    proc: ProcessStage,
    dumpfile: DumpFile,
    image_path: PathBuf,
}

impl SpikeStage {
    /// Prepares the Spike command line and debug script.
    pub fn new(config: &Config, breakpoint: u64) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Spike", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));

        let dumpfile = DumpFile::new(config)?;
        let image_path = dir.path().join(dumpfile.image_filename());

        let cmd = format!(
            "until pc 0 {breakpoint:#x}\n\
             pc 0\n\
             reg 0\n\
             rs 1\n\
             until pc 0 {breakpoint:#x}\n\
             dump\n\
             quit\n"
        );
        let cmdfile = dir.write_file("cmdin.spike", &cmd)?;

        let isa = &config.isa;
        let mem = &config.memory;
        let program = vec![
            config.tools.spike_bin.clone(),
            "--isa".to_string(),
            format!("RV{}I{}", isa.xlen, isa.rv_extensions),
            format!(
                "--varch=vlen:{},elen:{}",
                isa.vector_vlen, isa.vector_elen
            ),
            "-d".to_string(),
            format!("-m{:#x}:{:#x}", mem.memstart, mem.memlen),
            format!("--pc={:#x}", mem.xmemstart),
            format!("--debug-cmd={}", cmdfile.display()),
        ];
        let proc = ProcessStage::new(dir.clone(), program);

        Ok(Self {
            dir,
            proc,
            dumpfile,
            image_path,
        })
    }

    /// Parses the debug-mode stderr into (register file, pc).
    pub fn parse_registers(stderr: &str) -> Result<([u64; 32], u64)> {
        let flat = stderr.replace('\n', " ");
        let zero_at = flat
            .find("zero:")
            .ok_or_else(|| HarnessError::SimOutputParse("no register dump found".to_string()))?;

        // the `pc 0` command prints the PC just before the register dump
        let before = &flat[..zero_at];
        let pc_token = before
            .split_whitespace()
            .next_back()
            .ok_or_else(|| HarnessError::SimOutputParse("no pc before register dump".to_string()))?;
        let pc = parse_hex(pc_token)?;

        let after = flat[zero_at..].replace(':', " ");
        let tokens: Vec<&str> = after.split_whitespace().collect();
        if tokens.len() < 64 {
            return Err(HarnessError::SimOutputParse(format!(
                "register dump too short ({} tokens)",
                tokens.len()
            )));
        }

        let mut xregs = [0u64; 32];
        for pair in 0..32 {
            // quirk to match gdb naming
            let name = match tokens[2 * pair] {
                "s0" => "fp",
                other => other,
            };
            let idx = gpr_index(name).ok_or_else(|| {
                HarnessError::SimOutputParse(format!("unknown register name {name:?}"))
            })?;
            xregs[idx] = parse_hex(tokens[2 * pair + 1])?;
        }
        Ok((xregs, pc))
    }
}

impl Stage for SpikeStage {
    type Input = RunBinary;
    type Output = MachineState;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn abort_handle(&self) -> Option<crate::runner::AbortHandle> {
        self.proc.abort_handle()
    }

    fn task_pre(&mut self, _input: &RunBinary) {
        // stale images must not survive into this iteration's extraction
        let _ = std::fs::remove_file(&self.image_path);
    }

    fn task(&mut self, request: RunBinary) -> StageResult<MachineState> {
        let result = self.proc.run(ProcessRequest::new(
            vec![request.binary.display().to_string()],
            request.timeout,
        ));
        if !result.is_complete() {
            return result.cast_failure();
        }
        let Some(output) = result.payload else {
            return StageResult::error("reference run returned no output");
        };
        match self.reconstruct(&output) {
            Ok(state) => StageResult::complete(state),
            Err(e) => StageResult::error(format!("cannot parse reference output: {e}")),
        }
    }
}

impl SpikeStage {
    fn reconstruct(&self, output: &ProcessOutput) -> Result<MachineState> {
        let (xregs, pc) = Self::parse_registers(&output.stderr)?;
        let extras = self.dumpfile.extract_file(&self.image_path)?;
        MachineState::from_capture(xregs, pc, extras)
    }
}

/// Parses a `0x`-prefixed (or bare) hex literal.
pub(crate) fn parse_hex(token: &str) -> Result<u64> {
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u64::from_str_radix(digits, 16)
        .map_err(|_| HarnessError::SimOutputParse(format!("bad hex literal {token:?}")))
}
