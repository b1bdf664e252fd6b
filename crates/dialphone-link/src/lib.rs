//! Handset link for dialphone.
//!
//! One tokio task per connection owns the transport exclusively, reads
//! newline-terminated lines from the handset and writes single-byte
//! commands to it. Superseded connections are discarded by generation.
//!
//! # Architecture
//!
//! - [`protocol`] -- command encoding, line decoding and framing
//! - [`manager`] -- the [`LinkManager`] handle, connect/disconnect, IO loop

pub mod manager;
pub mod protocol;

pub use manager::{LinkConfig, LinkManager};
