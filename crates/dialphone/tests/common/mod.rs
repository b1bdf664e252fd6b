#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use dialphone::{BridgeEvent, Error, HostAdapter, HostCallState, Result};
use dialphone_test_harness::MockHandle;

pub const WAIT: Duration = Duration::from_secs(2);

/// A host that records placed calls and lets tests drive call state.
pub struct TestHost {
    call_tx: broadcast::Sender<HostCallState>,
    placed: Mutex<Vec<String>>,
    refuse: Mutex<Option<String>>,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        let (call_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            call_tx,
            placed: Mutex::new(Vec::new()),
            refuse: Mutex::new(None),
        })
    }

    pub fn set_call_state(&self, state: HostCallState) {
        let _ = self.call_tx.send(state);
    }

    pub fn placed(&self) -> Vec<String> {
        self.placed.lock().unwrap().clone()
    }

    /// Make every later `place_call` fail with `reason`.
    pub fn refuse_calls(&self, reason: &str) {
        *self.refuse.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl HostAdapter for TestHost {
    fn subscribe_call_state(&self) -> broadcast::Receiver<HostCallState> {
        self.call_tx.subscribe()
    }

    async fn place_call(&self, number: &str) -> Result<()> {
        if let Some(reason) = self.refuse.lock().unwrap().clone() {
            return Err(Error::CallFailed(reason));
        }
        self.placed.lock().unwrap().push(number.to_string());
        Ok(())
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<BridgeEvent>) -> BridgeEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for bridge event")
        .expect("bridge event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<BridgeEvent>,
    pred: impl Fn(&BridgeEvent) -> bool,
) -> BridgeEvent {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

pub fn is_connected(event: &BridgeEvent) -> bool {
    matches!(
        event,
        BridgeEvent::StateChanged {
            state: dialphone::LinkState::Connected,
            ..
        }
    )
}

/// Poll until the transport has received exactly `expected`.
pub async fn wait_for_sent(handle: &MockHandle, expected: &[u8]) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while handle.sent_bytes() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {:?}, transport got {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&handle.sent_bytes())
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait long enough for stray events to arrive, then assert there are none.
pub async fn assert_quiet(rx: &mut broadcast::Receiver<BridgeEvent>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event: {event:?}");
    }
}
