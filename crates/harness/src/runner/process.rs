//! Subprocess stage with deadline enforcement.
//!
//! Wraps one external command per iteration: cwd pinned to the stage's work
//! directory, an input string piped to stdin, stdout/stderr captured into
//! strings and mirrored into log artifacts. A subprocess that outlives its
//! deadline is SIGKILLed and the iteration reported as TIMEOUT; a nonzero
//! exit is ERROR (the payload still carries the full captured output), a
//! zero exit is COMPLETE.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use crate::runner::{RunnerOutcome, Stage, StageDir, StageResult};

/// Poll interval for the deadline loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Best-effort terminator for a running subprocess.
///
/// Holds the pid slot shared with the owning stage; `terminate` delivers
/// SIGTERM and ignores failure (the process may already be gone).
#[derive(Debug, Clone)]
pub struct AbortHandle {
    pid: Arc<AtomicI32>,
}

impl AbortHandle {
    /// Requests termination of the current subprocess, if any.
    pub fn terminate(&self) {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid > 0 {
            // SAFETY: plain signal delivery to a pid we spawned; a stale or
            // reused pid only results in a spurious, ignored SIGTERM.
            unsafe {
                let _ = libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// The full command line (program + parameters).
    pub command: Vec<String>,
    /// Exit code, when the process exited normally.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Per-iteration input of a [`ProcessStage`].
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Parameters appended to the configured program.
    pub parameters: Vec<String>,
    /// Text piped to the subprocess's stdin.
    pub input: String,
    /// Deadline for the whole run.
    pub timeout: Duration,
}

impl ProcessRequest {
    /// A request with parameters and a deadline, empty stdin.
    pub fn new(parameters: Vec<String>, timeout: Duration) -> Self {
        Self {
            parameters,
            input: String::new(),
            timeout,
        }
    }
}

/// Stage running one external command per iteration.
#[derive(Debug)]
pub struct ProcessStage {
    dir: StageDir,
    program: Vec<String>,
    pid: Arc<AtomicI32>,
}

impl ProcessStage {
    /// A process stage running `program` (command plus fixed arguments)
    /// inside `dir`.
    pub fn new(dir: StageDir, program: Vec<String>) -> Self {
        Self {
            dir,
            program,
            pid: Arc::new(AtomicI32::new(-1)),
        }
    }

    /// Replaces the fixed command line.
    pub fn set_program(&mut self, program: Vec<String>) {
        self.program = program;
    }
}

impl Stage for ProcessStage {
    type Input = ProcessRequest;
    type Output = ProcessOutput;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        Some(AbortHandle {
            pid: Arc::clone(&self.pid),
        })
    }

    fn task(&mut self, request: ProcessRequest) -> StageResult<ProcessOutput> {
        let mut command: Vec<String> = self.program.clone();
        command.extend(request.parameters.iter().cloned());

        self.dir.log_write("command.log", &(command.join(" ") + "\n"));
        self.dir.log_write("input.log", &request.input);

        if command.is_empty() {
            return StageResult::error("empty command line");
        }

        let spawned = Command::new(&command[0])
            .args(&command[1..])
            .current_dir(self.dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return StageResult::error(format!("cannot spawn {}: {e}", command[0]));
            }
        };
        self.pid.store(child.id() as i32, Ordering::SeqCst);

        // drain pipes off-thread so the deadline loop below stays responsive
        let io = Self::spawn_io(&mut child, &request.input);

        let deadline = Instant::now() + request.timeout;
        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        break child.wait().ok();
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => break None,
            }
        };
        self.pid.store(-1, Ordering::SeqCst);

        let (stdout, stderr) = io.finish();

        self.dir.log_write("stdout.log", &stdout);
        self.dir.log_write("stderr.log", &stderr);

        if timed_out {
            return StageResult::timeout(format!("deadline of {:?} exceeded", request.timeout));
        }

        let code = status.and_then(|s| s.code());
        let output = ProcessOutput {
            command,
            status: code,
            stdout,
            stderr,
        };
        // any nonzero (or signalled) exit is an error
        match code {
            Some(0) => StageResult::complete(output),
            _ => StageResult::new(
                RunnerOutcome::Error,
                Some(output),
                format!("exit status {code:?}"),
            ),
        }
    }
}

/// In-flight pipe drains of a running child.
struct ChildIo {
    writer: std::thread::JoinHandle<()>,
    out_reader: std::thread::JoinHandle<String>,
    err_reader: std::thread::JoinHandle<String>,
}

impl ChildIo {
    fn finish(self) -> (String, String) {
        let _ = self.writer.join();
        let stdout = self.out_reader.join().unwrap_or_default();
        let stderr = self.err_reader.join().unwrap_or_default();
        (stdout, stderr)
    }
}

impl ProcessStage {
    fn spawn_io(child: &mut Child, input: &str) -> ChildIo {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let input = input.to_string();
        let writer = std::thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let out_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut buf);
            }
            buf
        });
        let err_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf);
            }
            buf
        });
        ChildIo {
            writer,
            out_reader,
            err_reader,
        }
    }
}
