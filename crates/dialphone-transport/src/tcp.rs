//! TCP transport for handsets reached through a network serial bridge.
//!
//! Some setups expose the handset's serial link over TCP (ser2net, an
//! ESP32 serial bridge, or the fake handset in the test harness). The link
//! address is `host:port`, and it doubles as the remote name.
//!
//! No connect timeout is applied here: the link manager bounds every
//! connect attempt and can cancel it.
//!
//! # Example
//!
//! ```no_run
//! use dialphone_transport::TcpTransport;
//! use dialphone_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> dialphone_core::Result<()> {
//! let mut handset = TcpTransport::connect("192.168.1.50:2000").await?;
//!
//! // Ask the handset for its hook state
//! handset.send(b"s").await?;
//!
//! let mut buf = [0u8; 64];
//! let n = handset.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use dialphone_core::error::{Error, Result};
use dialphone_core::transport::{Connector, Transport};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    addr: String,
}

impl TcpTransport {
    /// Connect to a serial bridge at `addr`.
    pub async fn connect(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "dialing handset bridge");

        let stream = TcpStream::connect(addr).await.map_err(|e| {
            tracing::warn!(addr = %addr, error = %e, "handset bridge unreachable");
            match e.kind() {
                ErrorKind::ConnectionRefused => {
                    Error::Transport(format!("connection refused: {addr}"))
                }
                _ => Error::Io(e),
            }
        })?;

        // Commands are single bytes; do not let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr = %addr, error = %e, "TCP_NODELAY not set");
        }

        tracing::info!(addr = %addr, "handset bridge connected");
        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(addr = %self.addr, bytes = ?data, "to handset");
        stream.write_all(data).await.map_err(map_io_error)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => Err(Error::Timeout),
            Ok(Ok(0)) => {
                tracing::debug!(addr = %self.addr, "handset bridge hung up");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(addr = %self.addr, bytes = ?&buf[..n], "from handset");
                Ok(n)
            }
            Ok(Err(e)) => Err(map_io_error(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(addr = %self.addr, error = %e, "shutdown on close failed");
        }
        tracing::info!(addr = %self.addr, "handset bridge disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn remote_name(&self) -> Option<String> {
        Some(self.addr.clone())
    }
}

/// Opens [`TcpTransport`]s for `host:port` addresses.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::connect(address).await?))
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
