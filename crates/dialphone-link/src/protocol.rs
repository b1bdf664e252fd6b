//! Handset wire protocol: command encoding, line decoding and line framing.
//!
//! Outbound commands are single ASCII bytes with no terminator. Inbound
//! traffic is newline-terminated text; the handset firmware prints with
//! CRLF, so one trailing `\r` is stripped during framing. Anything that is
//! not exactly `DIAL<digit>`, `HANGUP` or `PICKUP` is ignored.

use dialphone_core::types::{InboundMessage, OutboundCommand};

/// The newline byte that terminates every inbound line.
pub const TERMINATOR: u8 = b'\n';

/// Prefix of a dialed-digit report.
pub const DIAL_PREFIX: &str = "DIAL";

/// Line sent when the handset goes on hook.
pub const HANGUP: &str = "HANGUP";

/// Line sent when the handset goes off hook.
pub const PICKUP: &str = "PICKUP";

/// Maximum bytes buffered without a terminator before the buffer is reset.
///
/// Valid lines are at most 6 bytes; anything this long is line noise.
pub const MAX_LINE_BUF: usize = 1024;

/// Encode a command into its wire bytes.
///
/// # Examples
///
/// ```
/// use dialphone_core::OutboundCommand;
/// use dialphone_link::protocol::encode;
///
/// assert_eq!(encode(OutboundCommand::RingOn), b"r");
/// assert_eq!(encode(OutboundCommand::RequestState), b"s");
/// ```
pub fn encode(command: OutboundCommand) -> &'static [u8] {
    match command {
        OutboundCommand::RingOn => b"r",
        OutboundCommand::RingOff => b"o",
        OutboundCommand::RequestState => b"s",
    }
}

/// Decode one framed line.
///
/// Returns `None` for every line that is not an exact match, including
/// empty lines, padded lines, and garbled bytes.
pub fn decode(line: &str) -> Option<InboundMessage> {
    if let Some(rest) = line.strip_prefix(DIAL_PREFIX) {
        let mut chars = rest.chars();
        return match (chars.next(), chars.next()) {
            (Some(d), None) if d.is_ascii_digit() => Some(InboundMessage::Dial(d)),
            _ => None,
        };
    }
    match line {
        HANGUP => Some(InboundMessage::HangUp),
        PICKUP => Some(InboundMessage::PickUp),
        _ => None,
    }
}

/// Accumulates raw reads and yields complete lines.
///
/// Reads from a wireless serial link arrive in arbitrary fragments, so a
/// line may span several reads and one read may carry several lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    ///
    /// Returns `false` if the buffer overflowed and was cleared.
    pub fn extend(&mut self, data: &[u8]) -> bool {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_LINE_BUF && !self.buf.contains(&TERMINATOR) {
            tracing::warn!(len = self.buf.len(), "line buffer overflow, resetting");
            self.buf.clear();
            return false;
        }
        true
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Invalid UTF-8 is replaced lossily, which can never decode.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == TERMINATOR)?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // encode
    // -----------------------------------------------------------------------

    #[test]
    fn encode_commands_are_distinct_single_bytes() {
        let all = [
            encode(OutboundCommand::RingOn),
            encode(OutboundCommand::RingOff),
            encode(OutboundCommand::RequestState),
        ];
        for bytes in all {
            assert_eq!(bytes.len(), 1);
        }
        assert_ne!(all[0], all[1]);
        assert_ne!(all[1], all[2]);
        assert_ne!(all[0], all[2]);
    }

    #[test]
    fn encoded_commands_never_decode() {
        for cmd in [
            OutboundCommand::RingOn,
            OutboundCommand::RingOff,
            OutboundCommand::RequestState,
        ] {
            let line = std::str::from_utf8(encode(cmd)).unwrap();
            assert_eq!(decode(line), None);
        }
    }

    // -----------------------------------------------------------------------
    // decode
    // -----------------------------------------------------------------------

    #[test]
    fn decode_every_digit() {
        for d in '0'..='9' {
            assert_eq!(decode(&format!("DIAL{d}")), Some(InboundMessage::Dial(d)));
        }
    }

    #[test]
    fn decode_hangup_and_pickup() {
        assert_eq!(decode("HANGUP"), Some(InboundMessage::HangUp));
        assert_eq!(decode("PICKUP"), Some(InboundMessage::PickUp));
    }

    #[test]
    fn decode_empty_line() {
        assert_eq!(decode(""), None);
    }

    #[test]
    fn decode_dial_without_digit() {
        assert_eq!(decode("DIAL"), None);
    }

    #[test]
    fn decode_dial_with_two_digits() {
        assert_eq!(decode("DIAL12"), None);
    }

    #[test]
    fn decode_dial_with_non_digit() {
        assert_eq!(decode("DIALx"), None);
        assert_eq!(decode("DIAL "), None);
        // Non-ASCII digits are not accepted.
        assert_eq!(decode("DIAL٣"), None);
    }

    #[test]
    fn decode_is_case_sensitive() {
        assert_eq!(decode("hangup"), None);
        assert_eq!(decode("dial5"), None);
    }

    #[test]
    fn decode_padded_lines() {
        assert_eq!(decode("HANGUP "), None);
        assert_eq!(decode(" PICKUP"), None);
        assert_eq!(decode("DIAL5\r"), None);
        assert_eq!(decode("HANGUP\0"), None);
    }

    #[test]
    fn decode_garbled_input() {
        assert_eq!(decode("\u{FFFD}\u{FFFD}"), None);
        assert_eq!(decode("ready v1.2"), None);
    }

    // -----------------------------------------------------------------------
    // LineBuffer
    // -----------------------------------------------------------------------

    #[test]
    fn line_buffer_single_line() {
        let mut lb = LineBuffer::new();
        lb.extend(b"HANGUP\n");
        assert_eq!(lb.next_line().as_deref(), Some("HANGUP"));
        assert_eq!(lb.next_line(), None);
    }

    #[test]
    fn line_buffer_strips_crlf() {
        let mut lb = LineBuffer::new();
        lb.extend(b"DIAL4\r\n");
        assert_eq!(lb.next_line().as_deref(), Some("DIAL4"));
    }

    #[test]
    fn line_buffer_line_split_across_reads() {
        let mut lb = LineBuffer::new();
        lb.extend(b"PIC");
        assert_eq!(lb.next_line(), None);
        assert_eq!(lb.pending(), 3);
        lb.extend(b"KUP\r");
        assert_eq!(lb.next_line(), None);
        lb.extend(b"\n");
        assert_eq!(lb.next_line().as_deref(), Some("PICKUP"));
        assert_eq!(lb.pending(), 0);
    }

    #[test]
    fn line_buffer_multiple_lines_in_one_read() {
        let mut lb = LineBuffer::new();
        lb.extend(b"DIAL1\r\nDIAL2\r\nDIA");
        assert_eq!(lb.next_line().as_deref(), Some("DIAL1"));
        assert_eq!(lb.next_line().as_deref(), Some("DIAL2"));
        assert_eq!(lb.next_line(), None);
        assert_eq!(lb.pending(), 3);
    }

    #[test]
    fn line_buffer_empty_line() {
        let mut lb = LineBuffer::new();
        lb.extend(b"\r\n");
        assert_eq!(lb.next_line().as_deref(), Some(""));
    }

    #[test]
    fn line_buffer_invalid_utf8_is_lossy() {
        let mut lb = LineBuffer::new();
        lb.extend(&[0xFF, 0xFE, b'\n']);
        let line = lb.next_line().unwrap();
        assert_eq!(decode(&line), None);
    }

    #[test]
    fn line_buffer_overflow_resets() {
        let mut lb = LineBuffer::new();
        let noise = vec![b'A'; MAX_LINE_BUF + 1];
        assert!(!lb.extend(&noise));
        assert_eq!(lb.pending(), 0);

        // Framing recovers on the next complete line.
        assert!(lb.extend(b"HANGUP\n"));
        assert_eq!(lb.next_line().as_deref(), Some("HANGUP"));
    }
}
