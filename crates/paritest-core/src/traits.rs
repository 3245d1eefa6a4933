//! Core trait definitions for callables and the wrappers that build them.
//!
//! Implemented by the `paritest-runner` crate. Implementations (reference or
//! submission) are plain Rust closures over [`Value`]s; the wrapper adapts
//! them into a uniform, isolated [`Callable`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GradingError;
use crate::model::{ExecutionMode, Signature, TestingControl};
use crate::results::ExecutionObservation;
use crate::value::{Thrown, Value};

// ---------------------------------------------------------------------------
// Output sink
// ---------------------------------------------------------------------------

/// Sink an implementation prints to instead of the process's stdout.
///
/// Cloneable so an entry point can hand it to threads it spawns. Once
/// cancelled, writes are dropped.
#[derive(Clone)]
pub struct Output {
    sender: mpsc::Sender<String>,
    cancelled: Arc<AtomicBool>,
}

impl Output {
    /// Create a sink and the receiving end that collects its lines.
    pub fn channel() -> (Output, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel();
        let output = Output {
            sender,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        (output, receiver)
    }

    pub fn println(&self, line: impl fmt::Display) {
        if self.is_cancelled() {
            return;
        }
        // The collector may already be gone; late lines are discarded.
        let _ = self.sender.send(line.to_string());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// A handle that can cancel this sink and all its clones without
    /// keeping the channel open.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }
}

/// Cancels an [`Output`] sink from outside the implementation.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Body of a free function.
pub type FunctionBody = Arc<dyn Fn(&[Value], &Output) -> Result<Value, Thrown> + Send + Sync>;

/// Builds a fresh receiver for an instance method.
pub type Constructor = Arc<dyn Fn() -> Result<Box<dyn Receiver>, String> + Send + Sync>;

/// An object whose entry-point method is invoked once per test case.
pub trait Receiver: Send {
    fn call(&mut self, arguments: &[Value], output: &Output) -> Result<Value, Thrown>;
}

/// How an implementation is invoked.
#[derive(Clone)]
pub enum Shape {
    Function(FunctionBody),
    /// Constructed anew for every invocation so no state leaks between cases.
    Method(Constructor),
}

/// An implementation of a question's entry point.
#[derive(Clone)]
pub struct Implementation {
    pub signature: Signature,
    pub shape: Shape,
    /// Name under which a worker process can find this implementation.
    pub entry: Option<String>,
}

impl Implementation {
    pub fn function<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&[Value], &Output) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        Self {
            signature,
            shape: Shape::Function(Arc::new(body)),
            entry: None,
        }
    }

    pub fn method<C, R>(signature: Signature, construct: C) -> Self
    where
        C: Fn() -> Result<R, String> + Send + Sync + 'static,
        R: Receiver + 'static,
    {
        let constructor: Constructor =
            Arc::new(move || construct().map(|receiver| Box::new(receiver) as Box<dyn Receiver>));
        Self {
            signature,
            shape: Shape::Method(constructor),
            entry: None,
        }
    }

    /// Register this implementation under `entry` so that an out-of-process
    /// wrapper can ask a worker to run it.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.shape {
            Shape::Function(_) => "function",
            Shape::Method(_) => "method",
        };
        f.debug_struct("Implementation")
            .field("signature", &self.signature.to_string())
            .field("shape", &shape)
            .field("entry", &self.entry)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Callable surface
// ---------------------------------------------------------------------------

/// Bounds applied to every invocation of a wrapped callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
    pub timeout: Duration,
    pub auto_start_wait: Duration,
    pub max_output_lines: usize,
}

impl InvocationLimits {
    /// Limits declared by a question, with timeouts scaled by `multiplier`.
    pub fn from_control(control: &TestingControl, multiplier: f64) -> Self {
        let scale = |ms: u64| Duration::from_millis((ms as f64 * multiplier.max(0.0)).ceil() as u64);
        Self {
            timeout: scale(control.timeout_ms),
            auto_start_wait: scale(control.auto_start_wait_ms),
            max_output_lines: control.max_output_lines,
        }
    }
}

impl Default for InvocationLimits {
    fn default() -> Self {
        Self::from_control(&TestingControl::default(), 1.0)
    }
}

/// A wrapped implementation with a uniform invocation contract.
///
/// `invoke` never panics and never hangs past its limits: every outcome,
/// including timeouts and crashes, is reported in the observation.
pub trait Callable: Send + Sync {
    fn signature(&self) -> &Signature;

    fn mode(&self) -> ExecutionMode;

    fn invoke(&self, arguments: &[Value]) -> ExecutionObservation;
}

/// Adapts implementations into [`Callable`]s.
pub trait CallableWrapper: Send + Sync {
    /// Fails with [`GradingError::UnsupportedShape`] when the implementation
    /// does not match `expected`, and with [`GradingError::Construction`]
    /// when it cannot be instantiated.
    fn wrap(
        &self,
        implementation: &Implementation,
        expected: &Signature,
        mode: ExecutionMode,
        limits: InvocationLimits,
    ) -> Result<Arc<dyn Callable>, GradingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    #[test]
    fn output_collects_lines_until_cancelled() {
        let (output, receiver) = Output::channel();
        output.println("one");
        let clone = output.clone();
        clone.println(2);
        output.cancel();
        clone.println("dropped");
        drop(output);
        drop(clone);
        let lines: Vec<String> = receiver.iter().collect();
        assert_eq!(lines, vec!["one".to_string(), "2".to_string()]);
    }

    #[test]
    fn cancel_handle_does_not_hold_channel_open() {
        let (output, receiver) = Output::channel();
        let handle = output.cancel_handle();
        output.println("kept");
        drop(output);
        handle.cancel();
        let lines: Vec<String> = receiver.iter().collect();
        assert_eq!(lines, vec!["kept".to_string()]);
    }

    #[test]
    fn println_after_collector_dropped_is_silent() {
        let (output, receiver) = Output::channel();
        drop(receiver);
        output.println("nobody listening");
    }

    #[test]
    fn limits_scale_with_multiplier() {
        let control = TestingControl {
            timeout_ms: 100,
            auto_start_wait_ms: 50,
            ..Default::default()
        };
        let limits = InvocationLimits::from_control(&control, 2.5);
        assert_eq!(limits.timeout, Duration::from_millis(250));
        assert_eq!(limits.auto_start_wait, Duration::from_millis(125));
    }

    struct Counter(i32);

    impl Receiver for Counter {
        fn call(&mut self, arguments: &[Value], _: &Output) -> Result<Value, Thrown> {
            if let Some(Value::Int(n)) = arguments.first() {
                self.0 += n;
            }
            Ok(Value::Int(self.0))
        }
    }

    #[test]
    fn method_constructor_builds_fresh_receivers() {
        let sig = Signature::new("add", vec![ValueType::Int], ValueType::Int);
        let imp = Implementation::method(sig, || Ok(Counter(10)));
        let Shape::Method(construct) = &imp.shape else {
            panic!("expected method shape");
        };
        let (output, _rx) = Output::channel();
        let mut first = construct().unwrap();
        assert_eq!(first.call(&[Value::Int(1)], &output).unwrap(), Value::Int(11));
        let mut second = construct().unwrap();
        assert_eq!(second.call(&[Value::Int(1)], &output).unwrap(), Value::Int(11));
        assert!(format!("{imp:?}").contains("method"));
    }
}
