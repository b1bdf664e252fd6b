//! The host telephony seam.
//!
//! The bridge never talks to a platform telephony API directly. A host
//! application implements [`HostAdapter`] over whatever it has: a phone
//! stack, a SIP client, or a console for testing.

use async_trait::async_trait;
use tokio::sync::broadcast;

use dialphone_core::error::Result;
use dialphone_core::types::HostCallState;

/// Host side of the bridge: the source of call-state changes and the sink
/// for outgoing calls.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    /// Subscribe to host call-state changes. Called once by the bridge.
    fn subscribe_call_state(&self) -> broadcast::Receiver<HostCallState>;

    /// Place an outgoing call to `number` (digits only).
    async fn place_call(&self, number: &str) -> Result<()>;
}
