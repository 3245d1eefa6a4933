//! Worker side of out-of-process invocation.
//!
//! A worker is the harness executable started again with [`WORKER_ENV`] set.
//! It reads one request line from stdin, runs the named implementation in a
//! thread [`Sandbox`](crate::sandbox::Sandbox), prints one reply line to
//! stdout and exits. Anything else the process prints is ignored by the
//! parent, so a test binary can act as its own worker.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use paritest_core::error::GradingError;
use paritest_core::model::ExecutionMode;
use paritest_core::results::{ExecutionObservation, TerminalStatus};
use paritest_core::traits::{CallableWrapper, Implementation, InvocationLimits};
use paritest_core::value::Value;

use crate::wrapper::ThreadWrapper;

/// Set in a worker's environment; its presence switches a process into
/// worker mode.
pub const WORKER_ENV: &str = "PARITEST_WORKER";

pub(crate) const REPLY_PREFIX: &str = "paritest-worker-reply: ";

/// Implementations a worker process can run, by entry name.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    entries: BTreeMap<String, Implementation>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, entry: impl Into<String>, implementation: Implementation) -> Self {
        let entry = entry.into();
        self.entries
            .insert(entry.clone(), implementation.with_entry(entry));
        self
    }

    /// The implementation registered as `entry`, tagged with its entry name
    /// so a [`ProcessWrapper`](crate::process::ProcessWrapper) can route it.
    pub fn implementation(&self, entry: &str) -> Option<Implementation> {
        self.entries.get(entry).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// If this process was started as a worker, answer its request and exit.
///
/// Call it first thing in `main` (or in a dedicated test) of any executable
/// used as a worker command. Returns normally when not in worker mode.
pub fn serve_if_requested(registry: &WorkerRegistry) {
    if std::env::var_os(WORKER_ENV).is_none() {
        return;
    }
    let code = match serve(registry, io::stdin().lock(), io::stdout().lock()) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("paritest worker: {e:#}");
            2
        }
    };
    // Threads the implementation left behind die with the process.
    std::process::exit(code);
}

/// Limits as they travel between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WireLimits {
    timeout_ms: u64,
    auto_start_wait_ms: u64,
    max_output_lines: usize,
}

impl From<InvocationLimits> for WireLimits {
    fn from(limits: InvocationLimits) -> Self {
        Self {
            timeout_ms: limits.timeout.as_millis() as u64,
            auto_start_wait_ms: limits.auto_start_wait.as_millis() as u64,
            max_output_lines: limits.max_output_lines,
        }
    }
}

impl From<WireLimits> for InvocationLimits {
    fn from(limits: WireLimits) -> Self {
        Self {
            timeout: Duration::from_millis(limits.timeout_ms),
            auto_start_wait: Duration::from_millis(limits.auto_start_wait_ms),
            max_output_lines: limits.max_output_lines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Task {
    /// Build a receiver and discard it.
    Construct,
    Invoke(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WorkerRequest {
    pub entry: String,
    pub mode: ExecutionMode,
    pub limits: WireLimits,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WorkerReply {
    Constructed,
    /// The implementation could not be set up; carries the reason.
    Rejected(String),
    Observed(ExecutionObservation),
}

fn serve(registry: &WorkerRegistry, mut input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read worker request")?;
    let request: WorkerRequest =
        serde_json::from_str(line.trim()).context("malformed worker request")?;

    let reply = handle(registry, request);

    let json = serde_json::to_string(&reply).context("failed to encode worker reply")?;
    writeln!(output, "{REPLY_PREFIX}{json}")?;
    output.flush()?;
    Ok(())
}

fn handle(registry: &WorkerRegistry, request: WorkerRequest) -> WorkerReply {
    let Some(implementation) = registry.entries.get(&request.entry) else {
        return WorkerReply::Rejected(format!(
            "no implementation registered as `{}`",
            request.entry
        ));
    };

    let wrapped = ThreadWrapper.wrap(
        implementation,
        &implementation.signature,
        request.mode,
        request.limits.into(),
    );
    match (request.task, wrapped) {
        (Task::Construct, Ok(_)) => WorkerReply::Constructed,
        (Task::Construct, Err(e)) => WorkerReply::Rejected(rejection(e)),
        (Task::Invoke(arguments), Ok(callable)) => {
            WorkerReply::Observed(callable.invoke(&arguments))
        }
        (Task::Invoke(_), Err(e)) => WorkerReply::Observed(ExecutionObservation::new(
            TerminalStatus::Crashed(format!("construction failed: {}", rejection(e))),
        )),
    }
}

fn rejection(error: GradingError) -> String {
    match error {
        GradingError::Construction(message) => message,
        other => other.to_string(),
    }
}
