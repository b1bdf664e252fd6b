//! dialphone-test-harness: Mock transports, connectors and a fake handset
//! for testing dialphone.
//!
//! This crate provides [`MockTransport`] and [`MockConnector`] for
//! deterministic testing of the link manager and call bridge without a
//! real handset, and [`MockHandset`] for end-to-end tests over TCP.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::{MockConnector, MockHandle, MockTransport};
pub use mock_tcp::MockHandset;
