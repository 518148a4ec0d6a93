//! Timeout policy for formatter calls.
//!
//! A formatter is user code and may hang. With a timeout configured, each
//! call runs on a short-lived helper thread and the inspection path waits at
//! most that long for the result. An expired call is reported as
//! [`FormatterError::Timeout`] for that call only; the helper thread is
//! detached and its eventual result discarded.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use super::FormatterError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallBudget {
    timeout: Option<Duration>,
}

impl CallBudget {
    /// Run every call inline with no limit.
    pub fn unbounded() -> Self {
        Self { timeout: None }
    }

    /// A zero duration means unbounded.
    pub fn with_timeout(timeout: Duration) -> Self {
        if timeout.is_zero() {
            Self::unbounded()
        } else {
            Self {
                timeout: Some(timeout),
            }
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn run<T, F>(&self, operation: &'static str, call: F) -> Result<T, FormatterError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, FormatterError> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            return call();
        };

        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("formatter-{}", operation))
            .spawn(move || {
                // The receiver is gone if we already timed out.
                let _ = tx.send(call());
            });
        if spawned.is_err() {
            return Err(FormatterError::Aborted(operation));
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FormatterError::Timeout { operation, timeout }),
            // The helper panicked before sending.
            Err(RecvTimeoutError::Disconnected) => Err(FormatterError::Aborted(operation)),
        }
    }
}
