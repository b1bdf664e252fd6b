//! A host adapter backed by the terminal: call state is typed in, placed
//! calls are printed.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use dialphone::{HostAdapter, HostCallState, Result};

pub struct ConsoleHost {
    call_tx: broadcast::Sender<HostCallState>,
    calls: Mutex<Vec<String>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        let (call_tx, _) = broadcast::channel(16);
        Self {
            call_tx,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Announce a host call-state change to the bridge.
    pub fn set_call_state(&self, state: HostCallState) {
        if self.call_tx.send(state).is_err() {
            tracing::debug!(%state, "no bridge listening for call state");
        }
    }

    /// Numbers called so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl HostAdapter for ConsoleHost {
    fn subscribe_call_state(&self) -> broadcast::Receiver<HostCallState> {
        self.call_tx.subscribe()
    }

    async fn place_call(&self, number: &str) -> Result<()> {
        println!("[host] calling {number}");
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(number.to_string());
        Ok(())
    }
}
