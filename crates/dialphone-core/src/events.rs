//! Asynchronous link event types.
//!
//! Events are emitted by the link manager through a
//! `tokio::sync::broadcast` channel. The call bridge subscribes once at
//! construction; diagnostics tools may subscribe as well.

use crate::error::LinkFailure;
use crate::types::{InboundMessage, LinkState};

/// An event emitted by the link manager.
///
/// Events for a superseded connection generation are never emitted, so a
/// subscriber can treat the stream as describing a single live link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link state changed.
    StateChanged(LinkState),

    /// A recognized line arrived from the handset.
    LineReceived(InboundMessage),

    /// The link failed. Always follows `StateChanged(Disconnected)`.
    LinkError(LinkFailure),
}
