//! Mock transport and connector for deterministic testing of the link.
//!
//! [`MockTransport`] implements the [`Transport`] trait over shared state.
//! Because the link manager moves the transport into its IO task, tests
//! drive and inspect it through a cloneable [`MockHandle`]: push lines as
//! if the handset printed them, read back the bytes that were written, and
//! inject read or write failures.
//!
//! [`MockConnector`] hands out pre-registered transports per address, with
//! optional connect delays and scripted failures.
//!
//! # Example
//!
//! ```
//! use dialphone_test_harness::{MockConnector, MockTransport};
//!
//! let mut transport = MockTransport::new().with_name("DialPhone");
//! // When the link requests state, answer as an idle handset would.
//! transport.expect(b"s", b"HANGUP\r\n");
//! let handle = transport.handle();
//!
//! let connector = MockConnector::new();
//! connector.add_device("00:11:22:33:44:55", transport);
//! handle.push_line("PICKUP");
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dialphone_core::error::{Error, Result};
use dialphone_core::transport::{Connector, Transport};

/// Upper bound on how long an idle `receive()` sleeps before timing out.
const IDLE_RECEIVE_SLEEP: Duration = Duration::from_millis(5);

/// A scripted reply: when `request` is written, `response` becomes readable.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    expectations: VecDeque<Expectation>,
    /// One entry per `send()` call.
    sent_log: Vec<Vec<u8>>,
    connected: bool,
    close_count: usize,
    /// Report a lost connection once `inbound` drains.
    link_dropped: bool,
    write_failure: Option<String>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] for testing the link without hardware.
///
/// Writes are recorded. A write matching the next [`expect`](Self::expect)
/// entry queues that entry's response for reading; other writes are simply
/// recorded. `receive()` returns queued bytes, or waits briefly and
/// returns [`Error::Timeout`] when there are none.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    name: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                inbound: VecDeque::new(),
                expectations: VecDeque::new(),
                sent_log: Vec::new(),
                connected: true,
                close_count: 0,
                link_dropped: false,
                write_failure: None,
            })),
            name: None,
        }
    }

    /// Set the remote device name reported by this transport.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a scripted request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// A handle for driving and inspecting this transport after it has been
    /// moved into the code under test.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if let Some(reason) = &state.write_failure {
            return Err(Error::Transport(reason.clone()));
        }

        state.sent_log.push(data.to_vec());

        if state.expectations.front().is_some_and(|e| e.request == data) {
            let response = state
                .expectations
                .pop_front()
                .map(|e| e.response)
                .unwrap_or_default();
            state.inbound.extend(response);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if !state.inbound.is_empty() {
                let n = state.inbound.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if state.link_dropped {
                return Err(Error::ConnectionLost);
            }
        }

        tokio::time::sleep(timeout.min(IDLE_RECEIVE_SLEEP)).await;
        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.close_count += 1;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn remote_name(&self) -> Option<String> {
        self.name.clone()
    }
}

/// Cloneable view of a [`MockTransport`]'s state.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queue a CRLF-terminated line for reading, as the handset prints it.
    pub fn push_line(&self, line: &str) {
        let mut state = lock(&self.state);
        state.inbound.extend(line.as_bytes());
        state.inbound.extend(b"\r\n");
    }

    /// Queue raw bytes for reading.
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes);
    }

    /// All data written so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// All data written so far, concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.state).sent_log.concat()
    }

    /// Simulate the handset going out of range: once queued bytes are
    /// read, `receive()` reports [`Error::ConnectionLost`].
    pub fn drop_link(&self) {
        lock(&self.state).link_dropped = true;
    }

    /// Make every subsequent `send()` fail with `reason`.
    pub fn fail_writes(&self, reason: &str) {
        lock(&self.state).write_failure = Some(reason.to_string());
    }

    /// Whether the transport has been closed.
    pub fn is_closed(&self) -> bool {
        !lock(&self.state).connected
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }

    /// Number of scripted replies not yet triggered.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Outcome {
    Device(MockTransport),
    Failure(String),
}

#[derive(Debug, Default)]
struct Route {
    delay: Duration,
    outcomes: VecDeque<Outcome>,
}

/// A mock [`Connector`] that serves pre-registered transports by address.
///
/// Each registered outcome is consumed by one connect attempt. The outcome
/// is taken only after the configured delay, so an attempt abandoned
/// mid-delay leaves it for the next attempt.
#[derive(Debug, Default)]
pub struct MockConnector {
    routes: Mutex<HashMap<String, Route>>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for the next connect to `address`.
    pub fn add_device(&self, address: &str, transport: MockTransport) {
        self.route(address, |r| r.outcomes.push_back(Outcome::Device(transport)));
    }

    /// Register a failure for the next connect to `address`.
    pub fn add_failure(&self, address: &str, reason: &str) {
        self.route(address, |r| {
            r.outcomes.push_back(Outcome::Failure(reason.to_string()))
        });
    }

    /// Delay every connect to `address`.
    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.route(address, |r| r.delay = delay);
    }

    /// Addresses passed to `connect`, in call order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn route(&self, address: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(routes.entry(address.to_string()).or_default());
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(address.to_string());

        let mut delay = Duration::ZERO;
        self.route(address, |r| delay = r.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut outcome = None;
        self.route(address, |r| outcome = r.outcomes.pop_front());
        match outcome {
            Some(Outcome::Device(transport)) => {
                tracing::debug!(address, "mock connector: device opened");
                Ok(Box::new(transport))
            }
            Some(Outcome::Failure(reason)) => Err(Error::Transport(reason)),
            None => Err(Error::Transport(format!("no device at {address}"))),
        }
    }
}
