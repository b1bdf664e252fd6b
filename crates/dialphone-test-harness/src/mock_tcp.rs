//! Fake handset over TCP for end-to-end testing.
//!
//! [`MockHandset`] listens on localhost and plays a script against the
//! single client that connects: print lines the way the handset firmware
//! does, wait for commands from the host, pause, or hang up the socket.
//! Everything the client writes is recorded and returned by
//! [`wait`](MockHandset::wait).
//!
//! # Example
//!
//! ```
//! use dialphone_test_harness::MockHandset;
//!
//! # async fn example() -> dialphone_core::Result<()> {
//! let mut handset = MockHandset::new().await?;
//!
//! // Wait for the state request, then report the receiver lifted.
//! handset.await_bytes(b"s").send_line("PICKUP");
//! handset.start();
//!
//! // Connect a TcpTransport to handset.addr() ...
//! # Ok(())
//! # }
//! ```

use dialphone_core::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How long the handset waits for expected bytes before failing.
const AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Step {
    /// Print a CRLF-terminated line.
    Line(String),
    Pause(Duration),
    /// Wait until the client has written these bytes.
    Await(Vec<u8>),
    /// Close the socket.
    HangUp,
}

/// A scripted fake handset reachable over TCP.
pub struct MockHandset {
    /// The address the handset is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    listener: Option<TcpListener>,
    script: Vec<Step>,
    server_handle: Option<JoinHandle<std::result::Result<Vec<u8>, String>>>,
}

impl MockHandset {
    /// Bind a fake handset to a random localhost port.
    ///
    /// No connection is accepted until [`start`](MockHandset::start) is
    /// called, so the script can be loaded first. Connects made earlier
    /// queue in the listener backlog.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock handset: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            script: Vec::new(),
            server_handle: None,
        })
    }

    /// Get the address to connect a `TcpTransport` to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Print `line` followed by CRLF.
    pub fn send_line(&mut self, line: &str) -> &mut Self {
        self.script.push(Step::Line(line.to_string()));
        self
    }

    pub fn pause(&mut self, duration: Duration) -> &mut Self {
        self.script.push(Step::Pause(duration));
        self
    }

    /// Wait until the client has written `bytes`, after anything matched by
    /// earlier `await_bytes` steps.
    pub fn await_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.push(Step::Await(bytes.to_vec()));
        self
    }

    /// Close the connection, as when the handset powers off.
    pub fn hang_up(&mut self) -> &mut Self {
        self.script.push(Step::HangUp);
        self
    }

    /// Accept one client and play the script in a background task.
    ///
    /// Without a trailing [`hang_up`](MockHandset::hang_up), the handset
    /// keeps recording until the client closes its end.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "mock handset already started");
            return;
        };
        let script = std::mem::take(&mut self.script);

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(%peer, "mock handset: client connected");

            let mut received = Vec::new();
            let mut cursor = 0;

            for (i, step) in script.into_iter().enumerate() {
                match step {
                    Step::Line(line) => {
                        let mut bytes = line.into_bytes();
                        bytes.extend_from_slice(b"\r\n");
                        stream
                            .write_all(&bytes)
                            .await
                            .map_err(|e| format!("step {}: write error: {}", i, e))?;
                        stream
                            .flush()
                            .await
                            .map_err(|e| format!("step {}: flush error: {}", i, e))?;
                    }
                    Step::Pause(duration) => tokio::time::sleep(duration).await,
                    Step::Await(expected) => {
                        cursor = tokio::time::timeout(
                            AWAIT_TIMEOUT,
                            read_until(&mut stream, &mut received, cursor, &expected),
                        )
                        .await
                        .map_err(|_| {
                            format!(
                                "step {}: timed out waiting for {:02X?}, got {:02X?}",
                                i, expected, &received[cursor..]
                            )
                        })?
                        .map_err(|e| format!("step {}: {}", i, e))?;
                    }
                    Step::HangUp => {
                        let _ = stream.shutdown().await;
                        return Ok(received);
                    }
                }
            }

            // Record until the client goes away.
            let mut buf = [0u8; 256];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            Ok(received)
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the handset task to finish and return everything the
    /// client wrote.
    pub async fn wait(self) -> std::result::Result<Vec<u8>, String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("handset task panicked: {}", e))?,
            None => Ok(Vec::new()),
        }
    }
}

/// Read from `stream` until `expected` appears in `received[cursor..]`.
/// Returns the new cursor, just past the match.
async fn read_until(
    stream: &mut TcpStream,
    received: &mut Vec<u8>,
    cursor: usize,
    expected: &[u8],
) -> std::result::Result<usize, String> {
    let mut buf = [0u8; 256];
    loop {
        if let Some(pos) = received[cursor..]
            .windows(expected.len().max(1))
            .position(|w| w == expected)
        {
            return Ok(cursor + pos + expected.len());
        }
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| format!("read error: {}", e))?;
        if n == 0 {
            return Err(format!(
                "client disconnected while waiting for {:02X?}",
                expected
            ));
        }
        received.extend_from_slice(&buf[..n]);
    }
}
