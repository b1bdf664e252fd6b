//! Transport and connector traits for the handset link.
//!
//! The [`Transport`] trait abstracts over the physical link to the handset:
//! a Bluetooth RFCOMM serial device, a USB serial adapter, or a TCP bridge.
//! A [`Connector`] opens a [`Transport`] for an opaque address; the link
//! manager never knows which kind it is talking to.
//!
//! Both traits have deterministic mock implementations in the
//! `dialphone-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to the handset.
///
/// Framing is not the transport's concern: the link manager splits the
/// received bytes into lines and encodes outbound commands itself.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the handset.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying device or socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the handset into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if none
    /// arrives. A closed peer is reported as
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost).
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Friendly name of the remote device, if the transport knows one.
    fn remote_name(&self) -> Option<String> {
        None
    }
}

/// Opens a [`Transport`] to an address.
///
/// `connect` may take arbitrarily long; callers race it against a
/// cancellation token and a timeout, so implementations must be safe to
/// drop mid-flight.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `address`.
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>>;
}
