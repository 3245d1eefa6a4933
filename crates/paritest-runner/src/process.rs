//! Out-of-process invocation.
//!
//! Every request starts a fresh worker process (see [`crate::worker`]). A
//! submission that overflows its stack, aborts, or never returns takes down
//! only its worker, and a worker that outlives its deadline is killed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use paritest_core::error::GradingError;
use paritest_core::model::{ExecutionMode, Signature};
use paritest_core::results::{ExecutionObservation, TerminalStatus};
use paritest_core::traits::{Callable, CallableWrapper, Implementation, InvocationLimits, Shape};
use paritest_core::value::Value;

use crate::worker::{Task, WorkerReply, WorkerRequest, REPLY_PREFIX, WORKER_ENV};
use crate::wrapper::check_signature;

/// Time on top of the invocation limits for a worker to start and report.
const STARTUP_GRACE: Duration = Duration::from_secs(5);

/// Environment variables a worker never sees.
const WITHHELD_ENV: [&str; 10] = [
    "SSH_AUTH_SOCK",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "DOCKER_HOST",
    "KUBECONFIG",
    "DATABASE_URL",
    "NPM_TOKEN",
];

/// How to start a worker process.
///
/// The program must call [`serve_if_requested`](crate::worker::serve_if_requested)
/// with a registry holding every entry it will be asked to run.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for var in WITHHELD_ENV {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// Wraps registered implementations so that every invocation runs in its
/// own worker process.
#[derive(Debug, Clone)]
pub struct ProcessWrapper {
    command: WorkerCommand,
}

impl ProcessWrapper {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }
}

impl CallableWrapper for ProcessWrapper {
    fn wrap(
        &self,
        implementation: &Implementation,
        expected: &Signature,
        mode: ExecutionMode,
        limits: InvocationLimits,
    ) -> Result<Arc<dyn Callable>, GradingError> {
        check_signature(implementation, expected)?;
        let entry = implementation.entry.clone().ok_or_else(|| {
            GradingError::WorkerFailed(format!(
                "{} has no worker entry; register it with a WorkerRegistry",
                expected.name
            ))
        })?;

        let callable = ProcessCallable {
            command: self.command.clone(),
            signature: expected.clone(),
            entry,
            mode,
            limits,
        };

        if let Shape::Method(_) = implementation.shape {
            match callable.request(Task::Construct) {
                Ok(WorkerReply::Constructed) => {}
                Ok(WorkerReply::Rejected(message)) | Err(WorkerFailure::Crashed(message)) => {
                    return Err(GradingError::Construction(message));
                }
                Ok(WorkerReply::Observed(_)) => {
                    return Err(GradingError::WorkerFailed(
                        "worker answered a construction request with an observation".to_string(),
                    ));
                }
                Err(WorkerFailure::TimedOut) => {
                    return Err(GradingError::Construction(
                        "constructor did not finish in time".to_string(),
                    ));
                }
                Err(WorkerFailure::Spawn(message)) => {
                    return Err(GradingError::WorkerFailed(message))
                }
            }
        }

        Ok(Arc::new(callable))
    }
}

/// Why a worker produced no reply.
#[derive(Debug, Clone, PartialEq)]
enum WorkerFailure {
    Spawn(String),
    TimedOut,
    Crashed(String),
}

struct ProcessCallable {
    command: WorkerCommand,
    signature: Signature,
    entry: String,
    mode: ExecutionMode,
    limits: InvocationLimits,
}

impl Callable for ProcessCallable {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn invoke(&self, arguments: &[Value]) -> ExecutionObservation {
        let status = match self.request(Task::Invoke(arguments.to_vec())) {
            Ok(WorkerReply::Observed(observation)) => return observation,
            Ok(WorkerReply::Rejected(message)) => TerminalStatus::Crashed(message),
            Ok(WorkerReply::Constructed) => TerminalStatus::Crashed(
                "worker answered an invocation with a construction reply".to_string(),
            ),
            Err(WorkerFailure::TimedOut) => TerminalStatus::TimedOut,
            Err(WorkerFailure::Crashed(message)) => TerminalStatus::Crashed(message),
            Err(WorkerFailure::Spawn(message)) => {
                tracing::warn!(entry = %self.entry, "{message}");
                TerminalStatus::Crashed(message)
            }
        };
        ExecutionObservation::new(status)
    }
}

impl ProcessCallable {
    /// The worker's own sandbox enforces the limits; this is the hard stop
    /// for a worker that cannot.
    fn deadline(&self) -> Duration {
        let mut deadline = self.limits.timeout + STARTUP_GRACE;
        if self.mode == ExecutionMode::AutoStart {
            deadline += self.limits.auto_start_wait;
        }
        deadline
    }

    fn request(&self, task: Task) -> Result<WorkerReply, WorkerFailure> {
        let request = WorkerRequest {
            entry: self.entry.clone(),
            mode: self.mode,
            limits: self.limits.into(),
            task,
        };
        let payload = serde_json::to_string(&request)
            .map_err(|e| WorkerFailure::Spawn(format!("failed to encode worker request: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WorkerFailure::Spawn(format!("failed to start worker runtime: {e}")))?;
        runtime.block_on(exchange(self.command.command(), payload, self.deadline()))
    }
}

async fn exchange(
    mut command: Command,
    payload: String,
    deadline: Duration,
) -> Result<WorkerReply, WorkerFailure> {
    let mut child = command
        .spawn()
        .map_err(|e| WorkerFailure::Spawn(format!("failed to start worker: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A worker that dies before reading shows up in its exit status.
        let _ = stdin.write_all(payload.as_bytes()).await;
        let _ = stdin.write_all(b"\n").await;
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let finished = tokio::time::timeout(deadline, async {
        tokio::join!(drain(stdout), drain(stderr), child.wait())
    })
    .await;

    match finished {
        Ok((stdout, stderr, Ok(status))) => read_reply(status, &stdout, &stderr),
        Ok((_, _, Err(e))) => Err(WorkerFailure::Crashed(format!("lost worker: {e}"))),
        Err(_) => {
            tracing::debug!(?deadline, "worker missed its deadline; killing it");
            let _ = child.kill().await;
            Err(WorkerFailure::TimedOut)
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut buf).await;
    }
    buf
}

fn read_reply(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Result<WorkerReply, WorkerFailure> {
    match find_reply(stdout) {
        Some(reply) => reply,
        None => Err(WorkerFailure::Crashed(describe_exit(status.code(), stderr))),
    }
}

fn find_reply(stdout: &[u8]) -> Option<Result<WorkerReply, WorkerFailure>> {
    let stdout = String::from_utf8_lossy(stdout);
    let json = stdout.lines().find_map(|line| line.strip_prefix(REPLY_PREFIX))?;
    Some(
        serde_json::from_str(json)
            .map_err(|e| WorkerFailure::Crashed(format!("malformed worker reply: {e}"))),
    )
}

/// A worker that died without replying: its exit and last words.
fn describe_exit(code: Option<i32>, stderr: &[u8]) -> String {
    let cause = match code {
        Some(code) => format!("worker exited with code {code}"),
        None => "worker was killed by a signal".to_string(),
    };
    let stderr = String::from_utf8_lossy(stderr);
    match stderr.lines().rev().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => format!("{cause}: {line}"),
        None => cause,
    }
}

#[cfg(test)]
mod tests {
    use paritest_core::value::ValueType;

    use super::*;

    fn add_two() -> Signature {
        Signature::new("addTwo", vec![ValueType::Int], ValueType::Int)
    }

    #[test]
    fn replies_are_found_among_other_output() {
        let reply = WorkerReply::Observed(ExecutionObservation::new(TerminalStatus::TimedOut));
        let stdout = format!(
            "\nrunning 1 test\n{REPLY_PREFIX}{}\ntest worker ... ok\n",
            serde_json::to_string(&reply).unwrap()
        );
        assert_eq!(find_reply(stdout.as_bytes()), Some(Ok(reply)));
        assert_eq!(find_reply(b"running 1 test\n"), None);
        assert!(matches!(
            find_reply(format!("{REPLY_PREFIX}{{").as_bytes()),
            Some(Err(WorkerFailure::Crashed(_)))
        ));
    }

    #[test]
    fn silent_deaths_are_described() {
        let stderr = b"\nthread 'main' has overflowed its stack\nfatal runtime error: stack overflow\n\n";
        assert_eq!(
            describe_exit(None, stderr),
            "worker was killed by a signal: fatal runtime error: stack overflow"
        );
        assert_eq!(describe_exit(Some(3), b""), "worker exited with code 3");
    }

    #[test]
    fn unregistered_implementations_are_refused() {
        let wrapper = ProcessWrapper::new(WorkerCommand::new("paritest-worker-missing"));
        let implementation = Implementation::function(add_two(), |_, _| Ok(Value::Int(0)));
        let err = wrapper
            .wrap(&implementation, &add_two(), ExecutionMode::Direct, InvocationLimits::default())
            .err()
            .unwrap();
        assert!(matches!(err, GradingError::WorkerFailed(ref m) if m.contains("no worker entry")));
    }

    #[test]
    fn missing_worker_program_is_a_crash() {
        let wrapper = ProcessWrapper::new(WorkerCommand::new("/nonexistent/paritest-worker"));
        let implementation =
            Implementation::function(add_two(), |_, _| Ok(Value::Int(0))).with_entry("add-two");
        let callable = wrapper
            .wrap(&implementation, &add_two(), ExecutionMode::Direct, InvocationLimits::default())
            .unwrap();
        assert!(matches!(
            callable.invoke(&[Value::Int(1)]).status,
            TerminalStatus::Crashed(ref m) if m.contains("failed to start worker")
        ));
    }

    #[test]
    fn deadline_covers_auto_start_wait() {
        let limits = InvocationLimits {
            timeout: Duration::from_millis(100),
            auto_start_wait: Duration::from_millis(300),
            max_output_lines: 10,
        };
        let callable = |mode| ProcessCallable {
            command: WorkerCommand::new("worker"),
            signature: add_two(),
            entry: "add-two".to_string(),
            mode,
            limits,
        };
        assert_eq!(
            callable(ExecutionMode::Direct).deadline(),
            Duration::from_millis(100) + STARTUP_GRACE
        );
        assert_eq!(
            callable(ExecutionMode::AutoStart).deadline(),
            Duration::from_millis(400) + STARTUP_GRACE
        );
    }
}
