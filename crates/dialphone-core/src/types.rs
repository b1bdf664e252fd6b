//! Core types shared by the link, the codec and the call bridge.

use std::fmt;
use std::str::FromStr;

/// Connection state of the handset link.
///
/// Owned by the link manager. Everyone else only observes it, either by
/// querying the manager or through `StateChanged` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// An attempt to open the link is in flight.
    Connecting,
    /// The link is open and the read loop is running.
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        write!(f, "{s}")
    }
}

/// A single-byte control signal sent to the handset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundCommand {
    /// Start the bell.
    RingOn,
    /// Stop the bell.
    RingOff,
    /// Ask the handset to report its hook state.
    RequestState,
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutboundCommand::RingOn => "ring-on",
            OutboundCommand::RingOff => "ring-off",
            OutboundCommand::RequestState => "request-state",
        };
        write!(f, "{s}")
    }
}

/// A decoded line received from the handset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundMessage {
    /// The dial returned after dialing one digit (`'0'..='9'`).
    Dial(char),
    /// The handset was put back on the hook.
    HangUp,
    /// The handset was lifted.
    PickUp,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundMessage::Dial(d) => write!(f, "dial {d}"),
            InboundMessage::HangUp => write!(f, "hang-up"),
            InboundMessage::PickUp => write!(f, "pick-up"),
        }
    }
}

/// Call state reported by the host telephony subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCallState {
    /// An incoming call is ringing.
    Ringing,
    /// No call in progress.
    Idle,
    /// A call is active or being dialed.
    OffHook,
}

impl fmt::Display for HostCallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostCallState::Ringing => "ringing",
            HostCallState::Idle => "idle",
            HostCallState::OffHook => "offhook",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`HostCallState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCallStateError(String);

impl fmt::Display for ParseCallStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown call state: {}", self.0)
    }
}

impl std::error::Error for ParseCallStateError {}

impl FromStr for HostCallState {
    type Err = ParseCallStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ringing" => Ok(HostCallState::Ringing),
            "idle" => Ok(HostCallState::Idle),
            "offhook" | "off-hook" | "off_hook" => Ok(HostCallState::OffHook),
            _ => Err(ParseCallStateError(s.to_string())),
        }
    }
}
