//! # dialphone -- a rotary telephone as a host handset
//!
//! `dialphone` bridges a rotary/mechanical telephone handset, reached over
//! a wireless serial link, with a host's telephony: dialing on the handset
//! places calls, an incoming call rings the handset's bell, and lifting or
//! replacing the receiver answers or ends the call.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dialphone::{BridgeBuilder, BridgeEvent, HostAdapter};
//!
//! # async fn example(host: Arc<dyn HostAdapter>) -> anyhow::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .serial_port("/dev/rfcomm0")
//!     .build(host)?;
//!
//! let mut events = bridge.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let BridgeEvent::CallPlaced(number) = event {
//!         println!("calling {number}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate                    | Purpose                                          |
//! |--------------------------|--------------------------------------------------|
//! | `dialphone-core`         | Types, errors, events, `Transport` / `Connector` |
//! | `dialphone-link`         | Wire protocol and the [`LinkManager`]            |
//! | `dialphone-transport`    | Serial and TCP transports                        |
//! | **`dialphone`**          | This crate -- [`CallBridge`] and re-exports      |
//!
//! The wire protocol is deliberately tiny: the host writes single bytes
//! (`r` ring, `o` stop ringing, `s` report state) and the handset prints
//! lines (`DIAL<digit>`, `HANGUP`, `PICKUP`).

pub mod bridge;
pub mod builder;
pub mod host;
pub mod number;

pub use bridge::{BridgeEvent, CallBridge};
pub use builder::BridgeBuilder;
pub use host::HostAdapter;
pub use number::{DIAL_LENGTH, DialedNumber};

pub use dialphone_core::{
    Connector, Error, HostCallState, InboundMessage, LinkEvent, LinkFailure, LinkState,
    OutboundCommand, Result, Transport,
};
pub use dialphone_link::{LinkConfig, LinkManager, protocol};
pub use dialphone_transport::{SerialConfig, SerialConnector, TcpConnector};
