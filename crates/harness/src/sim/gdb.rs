//! GDB driver and DUT-under-GDB composition.
//!
//! The DUT simulators start suspended with a GDB stub listening on a TCP
//! port; a scripted GDB session forces the entry point, runs to the
//! breakpoint, reads the general registers, continues once more so the dump
//! epilogue completes, and dumps the whole memory window to a file. The
//! composition stage launches DUT and GDB side by side, waits for GDB, and
//! stops the DUT once the session is over.

use std::path::PathBuf;

use crate::common::reg::gpr_index;
use crate::common::{HarnessError, Result};
use crate::config::{Config, DutKind};
use crate::runner::{ProcessRequest, ProcessStage, Stage, StageDir, StageResult, Worker};
use crate::sim::spike::parse_hex;
use crate::sim::{RunBinary, qemu, vp};
use crate::state::MachineState;
use crate::state::dump::DumpFile;

/// Stage running one scripted GDB session against the DUT stub.
pub struct GdbStage {
    dir: StageDir,
    proc: ProcessStage,
    dumpfile: DumpFile,
    image_path: PathBuf,
    xlen_mask: u64,
}

impl GdbStage {
    /// Prepares the GDB command file and command line.
    pub fn new(config: &Config, breakpoint: u64) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "GDB", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));

        let dumpfile = DumpFile::new(config)?;
        let image_path = dir.path().join(dumpfile.image_filename());

        let mem = &config.memory;
        let memend = mem.memstart + mem.memlen;
        let cmd = format!(
            "set architecture riscv:rv{xlen}\n\
             target remote localhost:{port}\n\
             set $pc = {entry:#x}\n\
             break *{breakpoint:#x}\n\
             cont\n\
             info registers general\n\
             cont\n\
             dump binary memory {image} {memstart:#x} {memend:#x}\n\
             quit\n",
            xlen = config.isa.xlen,
            port = config.tools.debug_port,
            entry = mem.xmemstart,
            image = image_path.display(),
            memstart = mem.memstart,
        );
        let cmdfile = dir.write_file("cmdin.gdb", &cmd)?;

        let program = vec![
            config.tools.gdb_bin.clone(),
            format!("--command={}", cmdfile.display()),
        ];
        let proc = ProcessStage::new(dir.clone(), program);

        let xlen_mask = if config.isa.xlen >= 64 {
            u64::MAX
        } else {
            (1u64 << config.isa.xlen) - 1
        };

        Ok(Self {
            dir,
            proc,
            dumpfile,
            image_path,
            xlen_mask,
        })
    }

    /// Parses `info registers general` output: 33 rows of name/hex/dec.
    pub fn parse_registers(&self, stdout: &str) -> Result<([u64; 32], u64)> {
        let flat = stdout.replace('\n', " ");
        let zero_at = flat
            .find("zero")
            .ok_or_else(|| HarnessError::SimOutputParse("no register listing found".to_string()))?;
        let tokens: Vec<&str> = flat[zero_at..].split_whitespace().collect();
        if tokens.len() < 33 * 3 {
            return Err(HarnessError::SimOutputParse(format!(
                "register listing too short ({} tokens)",
                tokens.len()
            )));
        }

        let mut xregs = [0u64; 32];
        let mut pc = 0u64;
        for row in 0..33 {
            let name = tokens[row * 3];
            let value = parse_hex(tokens[row * 3 + 1])? & self.xlen_mask;
            if name == "pc" {
                pc = value;
            } else {
                let idx = gpr_index(name).ok_or_else(|| {
                    HarnessError::SimOutputParse(format!("unknown register name {name:?}"))
                })?;
                xregs[idx] = value;
            }
        }
        Ok((xregs, pc))
    }
}

impl Stage for GdbStage {
    type Input = RunBinary;
    type Output = MachineState;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn abort_handle(&self) -> Option<crate::runner::AbortHandle> {
        self.proc.abort_handle()
    }

    fn task_pre(&mut self, _input: &RunBinary) {
        let _ = std::fs::remove_file(&self.image_path);
    }

    fn task(&mut self, request: RunBinary) -> StageResult<MachineState> {
        // the binary is loaded by the DUT; GDB only attaches
        let result = self
            .proc
            .run(ProcessRequest::new(Vec::new(), request.timeout));
        if !result.is_complete() {
            return result.cast_failure();
        }
        let Some(output) = result.payload else {
            return StageResult::error("gdb returned no output");
        };

        let reconstructed = self
            .parse_registers(&output.stdout)
            .and_then(|(xregs, pc)| {
                let extras = self.dumpfile.extract_file(&self.image_path)?;
                MachineState::from_capture(xregs, pc, extras)
            });
        match reconstructed {
            Ok(state) => StageResult::complete(state),
            Err(e) => StageResult::error(format!("cannot parse gdb output: {e}")),
        }
    }
}

/// DUT and GDB running side by side; the GDB session decides the outcome.
pub struct DutGdbStage {
    dir: StageDir,
    dut: Worker<ProcessStage>,
    gdb: Worker<GdbStage>,
    dut_kind: DutKind,
}

impl DutGdbStage {
    /// Builds the configured DUT and its GDB driver as worker threads.
    pub fn new(config: &Config, breakpoint: u64) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "DuTGDB", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));
        let subconfig = config.with_dir(dir.path());

        let dut_stage = match config.dut {
            DutKind::Qemu => qemu::qemu_stage(&subconfig)?,
            DutKind::TinyVp => vp::vp_stage(&subconfig)?,
        };
        let gdb_stage = GdbStage::new(&subconfig, breakpoint)?;

        Ok(Self {
            dir,
            dut: Worker::spawn(dut_stage),
            gdb: Worker::spawn(gdb_stage),
            dut_kind: config.dut,
        })
    }
}

impl Stage for DutGdbStage {
    type Input = RunBinary;
    type Output = MachineState;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: RunBinary) -> StageResult<MachineState> {
        let binary = request.binary.display().to_string();
        let dut_params = match self.dut_kind {
            DutKind::Qemu => vec!["-bios".to_string(), binary],
            DutKind::TinyVp => vec![binary],
        };

        let _ = self.dut.start(ProcessRequest::new(dut_params, request.timeout));
        let _ = self.gdb.start(request);
        self.gdb.wait();

        // gdb is done -> the suspended/parked DUT has no more work
        if self.dut.is_busy() {
            self.dut.stop();
            self.dut.wait();
        }

        let gdb_result = self.gdb.result();
        if gdb_result.is_complete() {
            return gdb_result;
        }

        let dut_result = self.dut.result();
        StageResult::new(
            gdb_result.outcome,
            None,
            format!(
                "dut: {} {}\ngdb: {} {}",
                dut_result.outcome, dut_result.detail, gdb_result.outcome, gdb_result.detail
            ),
        )
    }
}
