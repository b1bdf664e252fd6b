//! Transport implementations for dialphone.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](dialphone_core::Transport) and
//! [`Connector`](dialphone_core::Connector) traits from `dialphone-core`:
//!
//! - [`SerialTransport`] / [`SerialConnector`]: Bluetooth RFCOMM TTYs and
//!   USB serial adapters
//! - [`TcpTransport`] / [`TcpConnector`]: handsets behind a network
//!   serial bridge

pub mod serial;
pub mod tcp;

pub use serial::{
    DataBits, FlowControl, Parity, SerialConfig, SerialConnector, SerialTransport, StopBits,
};
pub use tcp::{TcpConnector, TcpTransport};
