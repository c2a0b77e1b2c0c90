//! Mock hardware adapter for testing
//!
//! This adapter stands in for an instrument without requiring physical
//! hardware. It provides:
//! - Scripted responses per command, either sticky or one-shot
//! - Controllable failure injection
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep one handle for inspection while a
//! driver owns another.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::Transport;
use crate::error::{AppResult, DaqError};

/// A call seen by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `write(command)`
    Write(String),
    /// `query(command)`
    Query(String),
}

#[derive(Default)]
struct MockState {
    one_shot: HashMap<String, VecDeque<Bytes>>,
    sticky: HashMap<String, Bytes>,
    call_log: Vec<Call>,
    fail_next: bool,
}

/// Mock transport with scripted responses
///
/// # Example
///
/// ```
/// use rust_daq_drivers::adapters::{MockAdapter, Transport};
///
/// # tokio_test_block(async {
/// let mut adapter = MockAdapter::new().with_response("FREQ?", "1.0E+06");
/// assert_eq!(adapter.query_text("FREQ?").await.unwrap(), "1.0E+06");
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Create a mock with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer every `command` query with `response`
    pub fn with_response(self, command: &str, response: impl Into<Bytes>) -> Self {
        self.set_response(command, response);
        self
    }

    /// Replace the sticky response for `command`
    pub fn set_response(&self, command: &str, response: impl Into<Bytes>) {
        self.lock().sticky.insert(command.to_string(), response.into());
    }

    /// Queue a response used once, ahead of the sticky one
    pub fn push_response(&self, command: &str, response: impl Into<Bytes>) {
        self.lock()
            .one_shot
            .entry(command.to_string())
            .or_default()
            .push_back(response.into());
    }

    /// Inject a failure for the next operation
    pub fn inject_next_failure(&self) {
        self.lock().fail_next = true;
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<Call> {
        self.lock().call_log.clone()
    }

    /// Commands passed to `write`, in order
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .call_log
            .iter()
            .filter_map(|call| match call {
                Call::Write(cmd) => Some(cmd.clone()),
                Call::Query(_) => None,
            })
            .collect()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.lock().call_log.clear();
    }

    fn take_failure(state: &mut MockState) -> AppResult<()> {
        if std::mem::take(&mut state.fail_next) {
            Err(DaqError::Transport("Injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockAdapter {
    async fn write(&mut self, command: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.call_log.push(Call::Write(command.to_string()));
        Self::take_failure(&mut state)?;
        debug!("mock write: {}", command);
        Ok(())
    }

    async fn query(&mut self, command: &str) -> AppResult<Bytes> {
        let mut state = self.lock();
        state.call_log.push(Call::Query(command.to_string()));
        Self::take_failure(&mut state)?;

        let queued = state
            .one_shot
            .get_mut(command)
            .and_then(|queue| queue.pop_front());
        let response = match queued {
            Some(response) => response,
            None => state.sticky.get(command).cloned().ok_or_else(|| {
                DaqError::Transport(format!("no scripted response for '{}'", command))
            })?,
        };
        debug!("mock query '{}' -> {} bytes", command, response.len());
        Ok(response)
    }

    fn info(&self) -> String {
        "MockAdapter".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sticky_and_one_shot_responses() {
        let mut adapter = MockAdapter::new().with_response("SPTS ?", "10");
        adapter.push_response("SPTS ?", "0");

        assert_eq!(adapter.query_text("SPTS ?").await.unwrap(), "0");
        assert_eq!(adapter.query_text("SPTS ?").await.unwrap(), "10");
        assert_eq!(adapter.query_text("SPTS ?").await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_unscripted_query_fails() {
        let mut adapter = MockAdapter::new();
        let err = adapter.query("FREQ?").await.unwrap_err();
        assert!(matches!(err, DaqError::Transport(_)));
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let mut adapter = MockAdapter::new();
        adapter.inject_next_failure();
        assert!(adapter.write("*RST").await.is_err());
        assert!(adapter.write("*RST").await.is_ok());
    }

    #[tokio::test]
    async fn test_call_log_is_shared_between_clones() {
        let handle = MockAdapter::new().with_response("PHAS?", "12.5");
        let mut driver_side = handle.clone();

        driver_side.write("PHAS 12.50").await.unwrap();
        driver_side.query("PHAS?").await.unwrap();

        assert_eq!(
            handle.call_log(),
            vec![
                Call::Write("PHAS 12.50".to_string()),
                Call::Query("PHAS?".to_string()),
            ]
        );
        assert_eq!(handle.writes(), vec!["PHAS 12.50".to_string()]);

        handle.clear_log();
        assert!(handle.call_log().is_empty());
    }
}
