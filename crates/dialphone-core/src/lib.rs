//! dialphone-core: Core types, traits, and error definitions for dialphone.
//!
//! This crate defines the transport-agnostic abstractions shared by the link
//! manager, the transports and the call bridge. Host applications depend on
//! these types without pulling in any specific transport.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level link to the handset
//! - [`LinkEvent`] -- asynchronous link notifications
//! - [`LinkState`], [`OutboundCommand`], [`InboundMessage`], [`HostCallState`]
//! - [`Error`] / [`Result`] / [`LinkFailure`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, LinkFailure, Result};
pub use events::LinkEvent;
pub use transport::{Connector, Transport};
pub use types::*;
