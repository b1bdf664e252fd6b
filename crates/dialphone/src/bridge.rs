//! CallBridge -- keeps the handset and the host's telephony in step.
//!
//! The bridge subscribes to the [`LinkManager`]'s events and to the host's
//! call-state changes once, at construction, and handles both on a single
//! background task, so handset lines are processed strictly in arrival
//! order:
//!
//! - host `Ringing` rings the bell, `Idle`/`OffHook` silences it;
//! - dialed digits accumulate into a [`DialedNumber`] and the call is
//!   placed on the ninth;
//! - `HANGUP` clears the number and ends the call, `PICKUP` answers it;
//! - link state changes and failures are forwarded to subscribers as
//!   [`BridgeEvent`]s.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dialphone_core::error::LinkFailure;
use dialphone_core::events::LinkEvent;
use dialphone_core::types::{HostCallState, InboundMessage, LinkState, OutboundCommand};
use dialphone_link::LinkManager;

use crate::host::HostAdapter;
use crate::number::DialedNumber;

/// Broadcast channel capacity for bridge event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// An event emitted by the call bridge for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The link state changed. `remote_name` is set once the device is known.
    StateChanged {
        state: LinkState,
        remote_name: Option<String>,
    },

    /// The link failed; follows `StateChanged` to `Disconnected`.
    LinkError(LinkFailure),

    /// A digit was dialed on the handset.
    DigitDialed(char),

    /// The host accepted an outgoing call to this number.
    CallPlaced(String),

    /// The host refused or failed to place a call. The number is cleared.
    CallFailed { number: String, reason: String },

    /// The handset went on hook.
    CallEnded,

    /// The handset went off hook.
    CallAnswered,
}

struct Inner {
    link: LinkManager,
    host: Arc<dyn HostAdapter>,
    number: Mutex<DialedNumber>,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl Inner {
    fn emit(&self, event: BridgeEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn place_call(&self, number: String) {
        debug!(%number, "placing call");
        match self.host.place_call(&number).await {
            Ok(()) => {
                info!(%number, "call placed");
                self.emit(BridgeEvent::CallPlaced(number));
            }
            Err(e) => {
                warn!(%number, error = %e, "host failed to place call");
                self.emit(BridgeEvent::CallFailed {
                    number,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Bridges one handset link with the host.
///
/// Must be created inside a Tokio runtime. Dropping the bridge stops its
/// background task; [`shutdown`](Self::shutdown) also closes the link.
pub struct CallBridge {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CallBridge {
    /// Create a bridge over `link` and `host` and start its event task.
    pub fn new(link: LinkManager, host: Arc<dyn HostAdapter>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let link_rx = link.subscribe();
        let call_rx = host.subscribe_call_state();

        let inner = Arc::new(Inner {
            link,
            host,
            number: Mutex::new(DialedNumber::new()),
            event_tx,
        });
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            BridgeTask {
                inner: inner.clone(),
            }
            .run(link_rx, call_rx, cancel.clone()),
        );

        CallBridge {
            inner,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Subscribe to bridge events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.event_tx.subscribe()
    }

    /// The underlying link manager.
    pub fn link(&self) -> &LinkManager {
        &self.inner.link
    }

    /// Open the link to `address`, superseding any current one.
    pub async fn connect(&self, address: &str) {
        self.inner.link.connect(address).await;
    }

    /// Close the link. A no-op when already disconnected.
    pub async fn disconnect(&self) {
        self.inner.link.disconnect().await;
    }

    /// Remove the last dialed digit, returning it.
    pub async fn delete_last_digit(&self) -> Option<char> {
        self.inner.number.lock().await.pop()
    }

    /// Place a call to the digits dialed so far.
    ///
    /// Does nothing and returns `false` when no digit has been dialed.
    pub async fn request_call(&self) -> bool {
        let number = {
            let mut number = self.inner.number.lock().await;
            if number.is_empty() {
                debug!("call requested with no digits dialed");
                return false;
            }
            number.take()
        };
        self.inner.place_call(number).await;
        true
    }

    /// A snapshot of the number dialed so far.
    pub async fn dialed_number(&self) -> DialedNumber {
        self.inner.number.lock().await.clone()
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.link.state().await
    }

    /// Stop the event task and close the link.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.link.disconnect().await;
        debug!("call bridge shut down");
    }
}

impl Drop for CallBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Event task
// ---------------------------------------------------------------------------

struct BridgeTask {
    inner: Arc<Inner>,
}

impl BridgeTask {
    async fn run(
        self,
        mut link_rx: broadcast::Receiver<LinkEvent>,
        mut call_rx: broadcast::Receiver<HostCallState>,
        cancel: CancellationToken,
    ) {
        let mut host_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("bridge task cancelled");
                    break;
                }

                event = link_rx.recv() => match event {
                    Ok(event) => self.on_link_event(event).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "bridge lagged behind link events");
                    }
                    Err(RecvError::Closed) => break,
                },

                state = call_rx.recv(), if host_open => match state {
                    Ok(state) => self.on_call_state(state).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "bridge lagged behind host call state");
                    }
                    Err(RecvError::Closed) => {
                        debug!("host call-state channel closed");
                        host_open = false;
                    }
                },
            }
        }
    }

    async fn on_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::StateChanged(LinkState::Connected) => {
                // Ask the handset for its hook state before anything else.
                self.inner.link.send(OutboundCommand::RequestState).await;
                let remote_name = self.inner.link.remote_name().await;
                self.inner.emit(BridgeEvent::StateChanged {
                    state: LinkState::Connected,
                    remote_name,
                });
            }
            LinkEvent::StateChanged(state) => {
                self.inner.emit(BridgeEvent::StateChanged {
                    state,
                    remote_name: None,
                });
            }
            LinkEvent::LinkError(failure) => {
                self.inner.emit(BridgeEvent::LinkError(failure));
            }
            LinkEvent::LineReceived(message) => self.on_message(message).await,
        }
    }

    async fn on_message(&self, message: InboundMessage) {
        match message {
            InboundMessage::Dial(digit) => {
                let complete = {
                    let mut number = self.inner.number.lock().await;
                    let complete = number.push(digit);
                    debug!(%digit, number = %*number, "digit dialed");
                    complete.then(|| number.take())
                };
                self.inner.emit(BridgeEvent::DigitDialed(digit));
                if let Some(number) = complete {
                    self.inner.place_call(number).await;
                }
            }
            InboundMessage::HangUp => {
                self.inner.number.lock().await.clear();
                debug!("handset on hook");
                self.inner.emit(BridgeEvent::CallEnded);
            }
            InboundMessage::PickUp => {
                debug!("handset off hook");
                self.inner.emit(BridgeEvent::CallAnswered);
            }
        }
    }

    /// Ring commands are sent whatever the link state; the link drops them
    /// while disconnected.
    async fn on_call_state(&self, state: HostCallState) {
        let command = match state {
            HostCallState::Ringing => OutboundCommand::RingOn,
            HostCallState::Idle | HostCallState::OffHook => OutboundCommand::RingOff,
        };
        debug!(%state, %command, "host call state changed");
        self.inner.link.send(command).await;
    }
}
