//! Program assembly and toolchain invocation.
//!
//! Wraps a generated code body into a complete bare-metal program:
//! 1. **Prologue** (`_begin`): dump-pointer setup in mscratch, optional
//!    exception vector (count-and-skip or stop), mstatus feature enables,
//!    FP register zeroing, vector vl reset, and register poisoning.
//! 2. **Epilogue** (`_after_last_instr` / `_end`): captures the last test
//!    PC, exception counter, mstatus feature bits, fcsr + FP registers and
//!    the complete vector state into the dump region, then parks the PC on
//!    the breakpoint slot.
//! 3. **Toolchain:** Emits the single-section linker script and drives the
//!    external C compiler as a subprocess stage.
//!
//! The breakpoint every simulator stops on is the `_stop` slot at
//! `xmemstart + 4`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::runner::{ProcessOutput, ProcessRequest, ProcessStage, Stage, StageDir, StageResult};
use crate::state::dump::DumpFile;

/// Per-iteration input of the build stage.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// The test code body.
    pub code: String,
    /// When set, replaces the body with `li` lines loading these 32 GPRs.
    pub regstate: Option<Vec<u64>>,
    /// Compiler deadline.
    pub timeout: Duration,
}

impl BuildRequest {
    /// A plain build of `code`.
    pub fn new(code: impl Into<String>, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            regstate: None,
            timeout,
        }
    }
}

/// Stage assembling and compiling one test program per iteration.
pub struct BuildStage {
    dir: StageDir,
    proc: ProcessStage,
    dumpfile: DumpFile,
    asm_header: String,
    asm_tail: String,
    breakpoint: u64,
    binary: PathBuf,
}

impl BuildStage {
    /// Prepares the build stage: prologue/epilogue text, linker script and
    /// compiler command line.
    ///
    /// `binary` is where the linked ELF lands; quad-precision floating
    /// point is rejected up front.
    pub fn new(config: &Config, binary: &Path) -> Result<Self> {
        let isa = &config.isa;
        isa.validate()?;
        let mem = &config.memory;

        let (march, mabi) = match isa.xlen {
            32 => (format!("rv32i{}", isa.rv_extensions), "ilp32"),
            64 => (format!("rv64i{}", isa.rv_extensions), "lp64"),
            xlen => return Err(HarnessError::UnsupportedXlen(xlen)),
        };

        let dir = StageDir::indexed(&config.general.dir, "Build", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));

        let linker_script = format!(
            "OUTPUT_ARCH( \"riscv\" )\n\
             MEMORY {{ MEM(rwx): org = {:#x}, len = {:#x}}}\n\
             SECTIONS {{.text :  {{ *(.text) }} > MEM }}\n\
             ENTRY(_start)\n",
            mem.xmemstart,
            mem.xmemlen - mem.dumpfile_reserve
        );
        let _ = dir.write_file("linker.lds", &linker_script)?;

        let dumpfile = DumpFile::new(config)?;
        let asm_header = Self::emit_header(config, &dumpfile);
        let asm_tail = Self::emit_tail(&dumpfile);

        let program = vec![
            config.tools.gcc_bin.clone(),
            "program.S".to_string(),
            "-o".to_string(),
            binary.display().to_string(),
            format!("-march={march}"),
            format!("-mabi={mabi}"),
            "-nostartfiles".to_string(),
            "-Wl,--no-relax".to_string(),
            "-T".to_string(),
            "linker.lds".to_string(),
        ];
        let proc = ProcessStage::new(dir.clone(), program);

        Ok(Self {
            dir,
            proc,
            dumpfile,
            asm_header,
            asm_tail,
            breakpoint: mem.breakpoint(),
            binary: binary.to_path_buf(),
        })
    }

    /// The breakpoint address all simulators stop on.
    pub fn breakpoint(&self) -> u64 {
        self.breakpoint
    }

    /// The output binary path.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The dump region layout shared with the downstream extractors.
    pub fn dumpfile(&self) -> &DumpFile {
        &self.dumpfile
    }

    fn emit_header(config: &Config, dump: &DumpFile) -> String {
        let isa = &config.isa;
        let has_float = isa.has_float();
        let has_vector = isa.has_vector();
        let stop_on_exception = config.general.stop_on_exception;
        let skip_on_exception = config.general.skip_on_exception;

        let mut a = String::from(
            "\n\
             .globl _start\n\
             _start:         # @xmemstart\n\
             \x20   # jump to real start\n\
             \x20   j _begin\n\
             _stop:          # @xmemstart + 4 -> breakpoint\n\
             \x20   # jump to real end\n\
             \x20   j _end\n\
             \n\
             # dummy HTIF symbols (needed for qemu)\n\
             tohost: .dword 0\n\
             .size tohost, 8\n\
             fromhost: .dword 0\n\
             .size fromhost, 8\n\
             \n\
             _end:\n\
             \x20   # reset tmpregstore (get clean memhash)\n\
             \x20   csrrw gp, mscratch, gp\n\
             \x20   li    t0, 0\n\
             \x20   li    t1, 0\n\
             \x20   li    t2, 0\n",
        );
        a.push_str(&dump.tmpregs.emit_save());

        a.push_str("    # save/update state\n");
        // x5 and x6 already hold last pc and exception counter
        a.push_str(&dump.estate.emit_load());
        a.push_str("    li   x9, 0x6600\n");
        a.push_str("    csrr x7, mstatus\n");
        a.push_str("    and  x7, x7, x9\n");
        a.push_str(&dump.estate.emit_save());

        if has_float {
            // float may be disabled by test code -> enable before reading
            a.push_str("    # enable and save float state\n");
            a.push_str("    li   x5, 0x6000\n");
            a.push_str("    csrs mstatus, x5\n");
            a.push_str("    csrr x5, fcsr\n");
            if let Some(fstate) = &dump.fstate {
                a.push_str(&fstate.emit_save());
            }
            a.push_str("    # save float registers\n");
            if let Some(fregs) = &dump.fregs {
                a.push_str(&fregs.emit_save());
            }
        }

        if has_vector {
            // vector may be disabled by test code -> enable before reading
            a.push_str("    # enable and save vector state\n");
            a.push_str("    li   x5, 0x600\n");
            a.push_str("    csrs mstatus, x5\n");
            a.push_str("    csrr x5, vtype\n");
            a.push_str("    csrr x6, vl\n");
            a.push_str("    csrr x7, vlenb\n");
            a.push_str("    csrr x8, vstart\n");
            a.push_str("    csrr x9, vxrm\n");
            a.push_str("    csrr x10, vxsat\n");
            a.push_str("    csrr x11, vcsr\n");
            if let Some(vstate) = &dump.vstate {
                a.push_str(&vstate.emit_save());
            }
            a.push_str("    # save vector registers\n");
            if let Some(vregs) = &dump.vregs {
                a.push_str(&vregs.emit_save());
            }
        }

        a.push_str(
            "\n\
             \x20   # restore gp\n\
             \x20   csrrw gp, mscratch, gp\n\
             \n\
             \x20   # loop\n\
             \x20   j _stop      # jump to xmemstart + 4 (breakpoint)\n\
             \n\
             _begin:\n",
        );
        // dump-region pointer lives in mscratch between prologue and epilogue
        a.push_str(&format!("    li gp, {:#x}\n", dump.addr()));
        a.push_str("    csrw mscratch, gp\n");

        if stop_on_exception || skip_on_exception {
            a.push_str(
                "\n\
                 # Stop/Skip on exception\n\
                 \x20   # jump over exception handling code\n\
                 \x20   j _exc_end\n\
                 \x20   # exc vector\n\
                 _exc_handler:\n",
            );
            a.push_str("    # save context\n");
            a.push_str("    csrrw gp, mscratch, gp\n");
            a.push_str(&dump.tmpregs.emit_save());

            a.push_str("    # handle state (load all, modify, store all)\n");
            a.push_str(&dump.estate.emit_load());
            a.push_str("    # save address of last instruction (exception)\n");
            a.push_str("    csrr x5, mepc\n");
            a.push_str("    # increment exception counter\n");
            a.push_str("    addi x6, x6, 1\n");
            a.push_str(&dump.estate.emit_save());

            if skip_on_exception {
                a.push_str("    # skip on exception: modify mepc to next instruction\n");
                a.push_str("    addi x5, x5, 4\n");
                a.push_str("    csrw mepc, x5\n");
            }

            a.push_str("    # restore context\n");
            a.push_str(&dump.tmpregs.emit_load());
            a.push_str("    csrrw gp, mscratch, gp\n");

            if skip_on_exception {
                a.push_str("\n    # skip on exception: continue behind the faulting instruction\n    mret\n");
            } else {
                a.push_str("\n    # stop on exception: jump to end\n    j _stop\n");
            }

            a.push_str(
                "\n\
                 _exc_end:\n\
                 \x20   # install the exception vector\n\
                 \x20   la t0, _exc_handler\n\
                 \x20   csrw mtvec, t0\n\
                 \x20   # mie.MEIE=0, mie.MTIE=0, mie.MSIE=0 (exceptions only)\n\
                 \x20   li t0, 0x000\n\
                 \x20   csrw mie, t0\n\
                 \x20   # init state (exception counter, last exec pc)\n",
            );
            a.push_str(&dump.estate.emit_set(&[0, 0, 0]));
            a.push_str(&dump.estate.emit_save());
        }

        a.push_str("    # set mstatus (disabled ints, features)\n");
        a.push_str("    li t0, 0\n");
        if has_float {
            a.push_str("    li t1, 0x6000   # MSTATUS_FS\n");
            a.push_str("    or t0, t0, t1\n");
        }
        if has_vector {
            a.push_str("    li t1, 0x600    # MSTATUS_VS\n");
            a.push_str("    or t0, t0, t1\n");
        }
        a.push_str("    csrw mstatus, t0\n");

        if has_float {
            a.push_str("# init fp registers\n");
            let instr = if isa.rv_extensions.contains('d') {
                "fcvt.d.w"
            } else {
                "fcvt.s.w"
            };
            for i in 0..32 {
                a.push_str(&format!("    {instr} f{i}, zero\n"));
            }
        }

        if has_vector {
            a.push_str("\n    # Vector: reset vl to max\n    vsetvli t0, zero, e8, ta, ma\n");
        }

        // register poison
        for i in 1..32 {
            a.push_str(&format!("    li x{i}, {i}\n"));
        }
        a.push_str("\n# start of test code\n");
        a
    }

    fn emit_tail(dump: &DumpFile) -> String {
        let mut a = String::from("_after_last_instr:\n# end of test code\n\n");
        a.push_str("    # save context\n");
        a.push_str("    csrrw gp, mscratch, gp\n");
        a.push_str(&dump.tmpregs.emit_save());
        a.push_str("    # handle state (load all, modify, store all)\n");
        a.push_str(&dump.estate.emit_load());
        a.push_str("    # update address of last instruction in test\n");
        a.push_str("    la   x5, _after_last_instr\n");
        a.push_str("    addi x5, x5, -4\n");
        a.push_str(&dump.estate.emit_save());
        a.push_str("    # restore context\n");
        a.push_str(&dump.tmpregs.emit_load());
        a.push_str("    csrrw gp, mscratch, gp\n");
        a.push_str("    j _stop\n");
        a
    }
}

impl Stage for BuildStage {
    type Input = BuildRequest;
    type Output = ProcessOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn task(&mut self, request: BuildRequest) -> StageResult<ProcessOutput> {
        self.dir.log_write("code.S", &request.code);

        let body = match &request.regstate {
            Some(values) => {
                // register-file override: the whole body is 32 li lines
                let mut section = String::new();
                for (i, value) in values.iter().enumerate() {
                    section.push_str(&format!("    li x{i}, {value:#x}\n"));
                }
                section
            }
            None => request.code.clone(),
        };

        let program = format!("{}\n{}\n{}", self.asm_header, body, self.asm_tail);
        if let Err(e) = self.dir.write_file("program.S", &program) {
            return StageResult::error(format!("cannot write program.S: {e}"));
        }

        self.proc.run(ProcessRequest::new(vec![], request.timeout))
    }

    fn abort_handle(&self) -> Option<crate::runner::AbortHandle> {
        self.proc.abort_handle()
    }
}
