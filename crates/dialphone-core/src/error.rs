//! Error types for dialphone.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Link-level failures that are reported
//! asynchronously through the event channel use [`LinkFailure`] instead,
//! since they must be cloned to every subscriber.

/// The error type for all dialphone operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial device, RFCOMM channel, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for the link.
    ///
    /// For a connect this usually means the handset is powered off or out
    /// of range.
    #[error("timeout waiting for link")]
    Timeout,

    /// An invalid parameter was passed to a builder or command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No link to the handset has been established.
    #[error("not connected")]
    NotConnected,

    /// The link to the handset was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The host refused or failed to place a call.
    #[error("call failed: {0}")]
    CallFailed(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A link failure reported through `LinkEvent::LinkError`.
///
/// Exactly one `LinkFailure` is emitted per distinct failure; it is always
/// preceded by a `StateChanged(Disconnected)` for the same generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkFailure {
    /// Opening the link failed (unreachable, refused, or timed out).
    #[error("connect failed: {0}")]
    Connect(String),

    /// The stream closed or errored while reading.
    #[error("read failed: {0}")]
    Read(String),

    /// The stream errored while writing a command.
    #[error("write failed: {0}")]
    Write(String),
}
