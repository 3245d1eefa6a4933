//! Isolated execution of a single invocation.
//!
//! Every invocation runs on its own named worker thread. The worker's panic
//! is caught, its result is awaited with a timeout, and everything it
//! printed is collected from its [`Output`] sink.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use paritest_core::model::ExecutionMode;
use paritest_core::traits::{InvocationLimits, Output};

static WORKER_ID: AtomicU64 = AtomicU64::new(0);

/// How a worker's body ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Finished(T),
    /// The body panicked; carries the panic message.
    Panicked(String),
    /// The body, or threads it started, outlived the limits.
    TimedOut,
    /// The worker could not be started or vanished without reporting.
    Lost(String),
}

/// Everything observed while running one body.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution<T> {
    pub outcome: Outcome<T>,
    pub output: Vec<String>,
    pub truncated_lines: usize,
    pub elapsed: Duration,
}

/// Runs bodies on worker threads under fixed limits.
#[derive(Debug, Clone)]
pub struct Sandbox {
    label: String,
    mode: ExecutionMode,
    limits: InvocationLimits,
}

impl Sandbox {
    pub fn new(label: impl Into<String>, mode: ExecutionMode, limits: InvocationLimits) -> Self {
        Self {
            label: label.into(),
            mode,
            limits,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limits(&self) -> InvocationLimits {
        self.limits
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run `body` on a fresh worker thread.
    ///
    /// In direct mode, collection stops when the body returns and later
    /// writes are discarded. In auto-start mode, collection continues until
    /// every clone of the sink has been dropped; if that takes longer than
    /// the auto-start wait, the outcome is [`Outcome::TimedOut`].
    ///
    /// A worker that times out cannot be stopped. It is detached, and its
    /// sink is cancelled so it can no longer print.
    pub fn execute<T, F>(&self, body: F) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&Output) -> T + Send + 'static,
    {
        let started = Instant::now();
        let (output, lines) = Output::channel();
        let cancel = output.cancel_handle();
        let (done_tx, done_rx) = mpsc::channel();

        let name = format!(
            "paritest-{}-{}",
            self.label,
            WORKER_ID.fetch_add(1, Ordering::Relaxed)
        );
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(&output)));
            drop(output);
            let _ = done_tx.send(result.map_err(panic_message));
        });

        let mut collector = Collector::new(self.limits.max_output_lines);

        if let Err(e) = spawned {
            return collector.finish(Outcome::Lost(format!("failed to start worker: {e}")), started);
        }

        let mut outcome = match done_rx.recv_timeout(self.limits.timeout) {
            Ok(Ok(value)) => Outcome::Finished(value),
            Ok(Err(message)) => Outcome::Panicked(message),
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!(worker = %name, "invocation timed out");
                Outcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                Outcome::Lost("worker exited without reporting".to_string())
            }
        };

        if self.mode == ExecutionMode::AutoStart && !matches!(outcome, Outcome::TimedOut) {
            let deadline = Instant::now() + self.limits.auto_start_wait;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match lines.recv_timeout(remaining) {
                    Ok(line) => collector.push(line),
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::debug!(worker = %name, "started threads did not settle");
                        outcome = Outcome::TimedOut;
                        break;
                    }
                }
            }
        }

        cancel.cancel();
        collector.extend(lines.try_iter());
        collector.finish(outcome, started)
    }
}

struct Collector {
    limit: usize,
    lines: Vec<String>,
    truncated: usize,
}

impl Collector {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            lines: Vec::new(),
            truncated: 0,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() < self.limit {
            self.lines.push(line);
        } else {
            self.truncated += 1;
        }
    }

    fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.push(line);
        }
    }

    fn finish<T>(self, outcome: Outcome<T>, started: Instant) -> Execution<T> {
        Execution {
            outcome,
            output: self.lines,
            truncated_lines: self.truncated,
            elapsed: started.elapsed(),
        }
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
