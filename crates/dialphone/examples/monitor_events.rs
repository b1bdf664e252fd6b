//! Monitor bridge events from a real handset.
//!
//! Connects to a handset bound to an RFCOMM serial port and prints every
//! bridge event for 60 seconds. Calls are "placed" by printing the number.
//!
//! # Requirements
//!
//! - A paired handset bound to a serial device, e.g.
//!   `rfcomm bind 0 00:11:22:33:44:55`
//! - Serial port path adjusted for your system
//!
//! # Usage
//!
//! ```sh
//! cargo run -p dialphone --example monitor_events
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use dialphone::{BridgeBuilder, BridgeEvent, HostAdapter, HostCallState};

/// A host that never rings and prints outgoing calls.
struct PrintHost {
    call_tx: broadcast::Sender<HostCallState>,
}

#[async_trait]
impl HostAdapter for PrintHost {
    fn subscribe_call_state(&self) -> broadcast::Receiver<HostCallState> {
        self.call_tx.subscribe()
    }

    async fn place_call(&self, number: &str) -> dialphone::Result<()> {
        println!("  -> host would call {number}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/rfcomm0";

    let (call_tx, _) = broadcast::channel(4);
    let host = Arc::new(PrintHost { call_tx });

    println!("Connecting to handset on {}...", serial_port);
    let bridge = BridgeBuilder::new().serial_port(serial_port).build(host)?;
    let mut events = bridge.subscribe();

    println!("Monitoring for 60 seconds. Lift the receiver and dial.\n");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);

    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => match event {
                BridgeEvent::DigitDialed(d) => {
                    println!("[dial] {d}  ({})", bridge.dialed_number().await)
                }
                other => println!("[event] {other:?}"),
            },
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
        }
    }

    bridge.shutdown().await;
    println!("\nDone.");
    Ok(())
}
