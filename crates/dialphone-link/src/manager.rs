//! Link manager: owns the one live connection to the handset.
//!
//! Every call to [`LinkManager::connect`] starts a new *generation*. Each
//! generation has its own [`CancellationToken`] and, once open, one IO task
//! that owns the transport exclusively. The IO task multiplexes outbound
//! commands and polled reads with a biased `select!`, so reads and writes
//! never contend for the stream.
//!
//! All shared state (generation, [`LinkState`], the session) lives behind one
//! mutex. Events are emitted while holding that mutex, after checking that
//! the emitting task's generation is still current, so a superseded attempt
//! can never publish into a newer one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use dialphone_core::error::{Error, LinkFailure, Result};
use dialphone_core::events::LinkEvent;
use dialphone_core::transport::{Connector, Transport};
use dialphone_core::types::{LinkState, OutboundCommand};

use crate::protocol::{self, LineBuffer};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default limit on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read poll interval for the IO task.
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Broadcast channel capacity for link event subscribers.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Outbound commands queued per generation before new ones are dropped.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Configuration for the link manager.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound on one connect attempt.
    pub connect_timeout: Duration,
    /// How long one read waits before the IO task checks for commands again.
    pub read_poll_interval: Duration,
    /// Bytes appended after every encoded command (empty by default).
    pub command_terminator: Vec<u8>,
    /// Capacity of the link event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            command_terminator: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The IO task of an open generation.
struct Session {
    cmd_tx: mpsc::Sender<OutboundCommand>,
    task: JoinHandle<()>,
}

struct Shared {
    state: LinkState,
    generation: u64,
    started: bool,
    address: Option<String>,
    remote_name: Option<String>,
    /// Cancels the connect attempt or IO task of the current generation.
    cancel: Option<CancellationToken>,
    session: Option<Session>,
}

impl Shared {
    /// Invalidate the current generation's attempt or session.
    ///
    /// Returns the IO task handle so the caller can await the stream's
    /// release after dropping the lock.
    fn tear_down(&mut self) -> Option<JoinHandle<()>> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.remote_name = None;
        self.session.take().map(|s| s.task)
    }
}

/// Handle to the link. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct LinkManager {
    shared: Arc<Mutex<Shared>>,
    connector: Arc<dyn Connector>,
    config: Arc<LinkConfig>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl LinkManager {
    /// Create a link manager with the default configuration.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_config(connector, LinkConfig::default())
    }

    /// Create a link manager with a custom configuration.
    pub fn with_config(connector: Arc<dyn Connector>, config: LinkConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        LinkManager {
            shared: Arc::new(Mutex::new(Shared {
                state: LinkState::Disconnected,
                generation: 0,
                started: false,
                address: None,
                remote_name: None,
                cancel: None,
                session: None,
            })),
            connector,
            config: Arc::new(config),
            event_tx,
        }
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Current link state.
    pub async fn state(&self) -> LinkState {
        self.shared.lock().await.state
    }

    /// Friendly name of the connected device, once the transport knows it.
    pub async fn remote_name(&self) -> Option<String> {
        self.shared.lock().await.remote_name.clone()
    }

    /// Address of the current or most recent connection.
    pub async fn address(&self) -> Option<String> {
        self.shared.lock().await.address.clone()
    }

    /// Current connection generation. Starts at 0 and increases on every
    /// `connect` and every effective `disconnect`.
    pub async fn generation(&self) -> u64 {
        self.shared.lock().await.generation
    }

    /// Mark the manager as ready. Idempotent.
    pub async fn start(&self) {
        let mut shared = self.shared.lock().await;
        if shared.started {
            return;
        }
        shared.started = true;
        debug!(state = %shared.state, "link manager started");
    }

    /// Open a link to `address`, superseding any existing attempt or session.
    ///
    /// A superseded link is torn down like [`disconnect`](Self::disconnect):
    /// `StateChanged(Disconnected)` is emitted before the new
    /// `StateChanged(Connecting)`.
    ///
    /// Returns once the attempt is in flight; the outcome is reported as
    /// `StateChanged(Connected)` or `StateChanged(Disconnected)` followed by
    /// `LinkError(Connect)`.
    pub async fn connect(&self, address: &str) {
        let (generation, cancel, previous) = {
            let mut shared = self.shared.lock().await;
            let previous = shared.tear_down();
            if shared.state != LinkState::Disconnected {
                debug!(
                    generation = shared.generation,
                    from = %shared.state,
                    "superseding current link"
                );
                shared.generation += 1;
                shared.state = LinkState::Disconnected;
                let _ = self
                    .event_tx
                    .send(LinkEvent::StateChanged(LinkState::Disconnected));
            }
            shared.generation += 1;
            shared.state = LinkState::Connecting;
            shared.address = Some(address.to_string());
            let cancel = CancellationToken::new();
            shared.cancel = Some(cancel.clone());
            let _ = self
                .event_tx
                .send(LinkEvent::StateChanged(LinkState::Connecting));
            (shared.generation, cancel, previous)
        };

        if let Some(task) = previous {
            let _ = task.await;
        }

        debug!(address = %address, generation, "opening link");
        tokio::spawn(self.clone().open(address.to_string(), generation, cancel));
    }

    /// Close the link. A no-op when already disconnected.
    ///
    /// Returns after the stream of the closed generation has been released.
    pub async fn disconnect(&self) {
        let task = {
            let mut shared = self.shared.lock().await;
            if shared.state == LinkState::Disconnected {
                debug!("disconnect with no active link");
                return;
            }
            let task = shared.tear_down();
            shared.generation += 1;
            shared.state = LinkState::Disconnected;
            tracing::info!(address = ?shared.address, "link disconnected");
            let _ = self
                .event_tx
                .send(LinkEvent::StateChanged(LinkState::Disconnected));
            task
        };

        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Queue a command for the handset.
    ///
    /// Fire-and-forget: when the link is not connected the command is
    /// dropped without error. Write failures surface as `LinkError(Write)`.
    pub async fn send(&self, command: OutboundCommand) {
        let shared = self.shared.lock().await;
        match (&shared.state, &shared.session) {
            (LinkState::Connected, Some(session)) => {
                if let Err(e) = session.cmd_tx.try_send(command) {
                    tracing::warn!(%command, error = %e, "dropping command, link IO task backed up");
                } else {
                    trace!(%command, generation = shared.generation, "command queued");
                }
            }
            (state, _) => {
                debug!(%command, %state, "dropping command while not connected");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connect attempt
    // -----------------------------------------------------------------------

    /// Runs one connect attempt for `generation`.
    async fn open(self, address: String, generation: u64, cancel: CancellationToken) {
        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&address),
        );

        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(address = %address, generation, "connect attempt cancelled");
                return;
            }

            r = attempt => r.unwrap_or(Err(Error::Timeout)),
        };

        let mut shared = self.shared.lock().await;
        if shared.generation != generation {
            drop(shared);
            debug!(address = %address, generation, "discarding stale connect result");
            if let Ok(mut transport) = result {
                let _ = transport.close().await;
            }
            return;
        }

        match result {
            Ok(transport) => {
                shared.remote_name = transport.remote_name();
                shared.state = LinkState::Connected;

                let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
                let task = tokio::spawn(io_loop(
                    transport,
                    self.clone(),
                    generation,
                    cmd_rx,
                    cancel,
                ));
                shared.session = Some(Session { cmd_tx, task });

                tracing::info!(
                    address = %address,
                    remote_name = ?shared.remote_name,
                    generation,
                    "link connected"
                );
                let _ = self
                    .event_tx
                    .send(LinkEvent::StateChanged(LinkState::Connected));
            }
            Err(e) => {
                shared.tear_down();
                shared.state = LinkState::Disconnected;
                tracing::warn!(address = %address, generation, error = %e, "link connect failed");
                let _ = self
                    .event_tx
                    .send(LinkEvent::StateChanged(LinkState::Disconnected));
                let _ = self
                    .event_tx
                    .send(LinkEvent::LinkError(LinkFailure::Connect(e.to_string())));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Generation-checked emission
    // -----------------------------------------------------------------------

    /// Emit `event` if `generation` is still current. Returns `false` if the
    /// generation has been superseded.
    async fn emit_current(&self, generation: u64, event: LinkEvent) -> bool {
        let shared = self.shared.lock().await;
        if shared.generation != generation {
            return false;
        }
        let _ = self.event_tx.send(event);
        true
    }

    /// Terminate `generation` after a read or write failure.
    async fn fail(&self, generation: u64, failure: LinkFailure) {
        let mut shared = self.shared.lock().await;
        if shared.generation != generation || shared.state == LinkState::Disconnected {
            debug!(generation, error = %failure, "ignoring failure from stale generation");
            return;
        }
        // The failing task is the session's own; its handle is just dropped.
        shared.tear_down();
        shared.state = LinkState::Disconnected;
        tracing::warn!(address = ?shared.address, generation, error = %failure, "link lost");
        let _ = self
            .event_tx
            .send(LinkEvent::StateChanged(LinkState::Disconnected));
        let _ = self.event_tx.send(LinkEvent::LinkError(failure));
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// The per-generation IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Outbound commands
/// 3. Polled reads
///
/// The transport is closed on every exit path.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    link: LinkManager,
    generation: u64,
    mut cmd_rx: mpsc::Receiver<OutboundCommand>,
    cancel: CancellationToken,
) {
    let poll = link.config.read_poll_interval;
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 256];

    let failure = 'io: loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(generation, "link IO task cancelled");
                break None;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if let Err(e) =
                            write_command(&mut *transport, cmd, &link.config.command_terminator).await
                        {
                            break Some(LinkFailure::Write(e.to_string()));
                        }
                    }
                    None => {
                        debug!(generation, "command channel closed, exiting link IO task");
                        break None;
                    }
                }
            }

            res = transport.receive(&mut buf, poll) => {
                match res {
                    Ok(n) => {
                        lines.extend(&buf[..n]);
                        while let Some(line) = lines.next_line() {
                            match protocol::decode(&line) {
                                Some(message) => {
                                    trace!(generation, %message, "line received");
                                    if !link
                                        .emit_current(generation, LinkEvent::LineReceived(message))
                                        .await
                                    {
                                        debug!(generation, "generation superseded, dropping line");
                                        break 'io None;
                                    }
                                }
                                None => {
                                    trace!(generation, line = %line.escape_debug(), "ignoring unrecognized line");
                                }
                            }
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(e) => break Some(LinkFailure::Read(e.to_string())),
                }
            }
        }
    };

    if lines.pending() > 0 {
        debug!(generation, bytes = lines.pending(), "discarding partial line");
    }
    if let Err(e) = transport.close().await {
        debug!(generation, error = %e, "error closing transport");
    }

    if let Some(failure) = failure {
        link.fail(generation, failure).await;
    }
}

/// Encode and write one command.
async fn write_command(
    transport: &mut dyn Transport,
    command: OutboundCommand,
    terminator: &[u8],
) -> Result<()> {
    let bytes = protocol::encode(command);
    if terminator.is_empty() {
        transport.send(bytes).await?;
    } else {
        let mut framed = bytes.to_vec();
        framed.extend_from_slice(terminator);
        transport.send(&framed).await?;
    }
    trace!(%command, "command written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
