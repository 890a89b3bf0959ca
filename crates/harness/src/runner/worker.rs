//! Worker-thread wrapper for stages.
//!
//! A [`Worker`] moves a stage onto its own OS thread so several stages can
//! run their subprocesses side by side (reference, coverage and DUT execute
//! the same binary in parallel). The calling protocol mirrors the stage
//! lifecycle:
//! - [`start`](Worker::start) launches an iteration; a second start while
//!   one is running returns BUSY instead of queueing.
//! - [`wait`](Worker::wait) blocks until the ready signal; the result slot
//!   is written exactly once per iteration before the signal is raised.
//! - [`stop`](Worker::stop) delivers SIGTERM to the stage's current
//!   subprocess, best-effort.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::runner::{AbortHandle, Stage, StageResult};

struct Shared<T> {
    state: Mutex<WorkerState<T>>,
    ready_cv: Condvar,
}

struct WorkerState<T> {
    busy: bool,
    ready: bool,
    result: StageResult<T>,
}

/// A stage running on a dedicated worker thread.
pub struct Worker<S: Stage> {
    sender: Option<mpsc::Sender<S::Input>>,
    shared: Arc<Shared<S::Output>>,
    abort: Option<AbortHandle>,
    handle: Option<JoinHandle<()>>,
}

impl<S> Worker<S>
where
    S: Stage + Send + 'static,
    S::Input: Send + 'static,
{
    /// Moves `stage` onto a fresh worker thread.
    pub fn spawn(mut stage: S) -> Self {
        let abort = stage.abort_handle();
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState {
                busy: false,
                ready: false,
                result: StageResult::invalid(),
            }),
            ready_cv: Condvar::new(),
        });
        let (sender, receiver) = mpsc::channel::<S::Input>();

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            while let Ok(input) = receiver.recv() {
                let result = stage.run(input);
                let mut state = thread_shared
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                state.result = result;
                state.busy = false;
                state.ready = true;
                thread_shared.ready_cv.notify_all();
            }
        });

        Self {
            sender: Some(sender),
            shared,
            abort,
            handle: Some(handle),
        }
    }

    /// Launches one iteration without blocking.
    ///
    /// Returns `false` (and leaves the previous result untouched) when the
    /// worker is still busy with an earlier iteration.
    pub fn start(&self, input: S::Input) -> bool {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.busy {
                return false;
            }
            state.busy = true;
            state.ready = false;
            state.result = StageResult::busy();
        }
        if let Some(sender) = &self.sender {
            if sender.send(input).is_err() {
                let mut state = self
                    .shared
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                state.busy = false;
                state.result = StageResult::error("worker thread gone");
                return false;
            }
        }
        true
    }

    /// Runs one iteration to completion.
    pub fn run_blocking(&self, input: S::Input) -> StageResult<S::Output> {
        if !self.start(input) {
            return StageResult::busy();
        }
        self.wait();
        self.result()
    }

    /// True while an iteration is in flight.
    pub fn is_busy(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .busy
    }

    /// Blocks until the current iteration's result is published.
    pub fn wait(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while !state.ready {
            state = self
                .shared
                .ready_cv
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        state.ready = false;
    }

    /// The most recent published result.
    pub fn result(&self) -> StageResult<S::Output> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .result
            .clone()
    }

    /// Requests termination of the stage's current subprocess.
    pub fn stop(&self) {
        if let Some(abort) = &self.abort {
            abort.terminate();
        }
    }
}

impl<S: Stage> Drop for Worker<S> {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
