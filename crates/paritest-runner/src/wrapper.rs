//! Adapts implementations into isolated callables.

use std::sync::Arc;

use paritest_core::error::GradingError;
use paritest_core::model::{ExecutionMode, Signature};
use paritest_core::results::{ExecutionObservation, TerminalStatus};
use paritest_core::traits::{
    Callable, CallableWrapper, Constructor, Implementation, InvocationLimits, Shape,
};
use paritest_core::value::{ErrorKind, Thrown, Value};

use crate::sandbox::{Execution, Outcome, Sandbox};

/// Wraps implementations so that every invocation runs in a [`Sandbox`].
#[derive(Debug, Clone, Default)]
pub struct ThreadWrapper;

impl CallableWrapper for ThreadWrapper {
    fn wrap(
        &self,
        implementation: &Implementation,
        expected: &Signature,
        mode: ExecutionMode,
        limits: InvocationLimits,
    ) -> Result<Arc<dyn Callable>, GradingError> {
        check_signature(implementation, expected)?;

        let sandbox = Sandbox::new(expected.name.clone(), mode, limits);
        if let Shape::Method(construct) = &implementation.shape {
            probe(&sandbox, Arc::clone(construct))?;
        }

        Ok(Arc::new(SandboxedCallable {
            signature: expected.clone(),
            shape: implementation.shape.clone(),
            sandbox,
        }))
    }
}

pub(crate) fn check_signature(
    implementation: &Implementation,
    expected: &Signature,
) -> Result<(), GradingError> {
    if implementation.signature != *expected {
        return Err(GradingError::UnsupportedShape {
            expected: expected.to_string(),
            found: implementation.signature.to_string(),
        });
    }
    Ok(())
}

/// What a worker reports back: a construction failure, or the call's result.
type Invocation = Result<Result<Value, Thrown>, String>;

/// Build one receiver up front so construction faults surface at wrap time.
fn probe(sandbox: &Sandbox, construct: Constructor) -> Result<(), GradingError> {
    let probe = Sandbox::new(
        format!("{}-new", sandbox.label()),
        ExecutionMode::Direct,
        sandbox.limits(),
    );
    match probe.execute(move |_| construct().map(|_| ())).outcome {
        Outcome::Finished(Ok(())) => Ok(()),
        Outcome::Finished(Err(message)) | Outcome::Panicked(message) | Outcome::Lost(message) => {
            Err(GradingError::Construction(message))
        }
        Outcome::TimedOut => Err(GradingError::Construction(
            "constructor did not finish in time".to_string(),
        )),
    }
}

struct SandboxedCallable {
    signature: Signature,
    shape: Shape,
    sandbox: Sandbox,
}

impl Callable for SandboxedCallable {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn mode(&self) -> ExecutionMode {
        self.sandbox.mode()
    }

    fn invoke(&self, arguments: &[Value]) -> ExecutionObservation {
        let arguments = arguments.to_vec();
        let execution = match &self.shape {
            Shape::Function(body) => {
                let body = Arc::clone(body);
                self.sandbox
                    .execute(move |out| -> Invocation { Ok(body(arguments.as_slice(), out)) })
            }
            Shape::Method(construct) => {
                let construct = Arc::clone(construct);
                self.sandbox.execute(move |out| -> Invocation {
                    let mut receiver = construct()?;
                    Ok(receiver.call(arguments.as_slice(), out))
                })
            }
        };
        self.observe(execution)
    }
}

impl SandboxedCallable {
    fn observe(&self, execution: Execution<Invocation>) -> ExecutionObservation {
        let status = match execution.outcome {
            Outcome::Finished(Ok(Ok(value))) if self.signature.returns.accepts(&value) => {
                TerminalStatus::Returned(value)
            }
            Outcome::Finished(Ok(Ok(value))) => TerminalStatus::Crashed(format!(
                "returned {value} where {} was declared",
                self.signature.returns
            )),
            Outcome::Finished(Ok(Err(thrown))) => TerminalStatus::Threw(thrown),
            Outcome::Finished(Err(message)) => {
                TerminalStatus::Crashed(format!("construction failed: {message}"))
            }
            Outcome::Panicked(message) if message.starts_with("assertion") => {
                TerminalStatus::Threw(Thrown::new(ErrorKind::Assertion, message))
            }
            Outcome::Panicked(message) => TerminalStatus::Crashed(message),
            Outcome::TimedOut => TerminalStatus::TimedOut,
            Outcome::Lost(message) => TerminalStatus::Crashed(message),
        };

        ExecutionObservation {
            status,
            output: execution.output,
            truncated_lines: execution.truncated_lines,
        }
    }
}
