//! The number being dialed on the handset.

use std::fmt;

/// Digits in a complete number. The call is placed as soon as the last one
/// is dialed.
pub const DIAL_LENGTH: usize = 9;

/// Display grouping of a full number, e.g. `612 34 56 78`.
const GROUPS: [usize; 4] = [3, 2, 2, 2];

/// Ordered digits accumulated from the rotary dial.
///
/// Never holds more than [`DIAL_LENGTH`] digits. Formats with
/// [`Display`](fmt::Display) in the handset's grouping:
///
/// ```
/// use dialphone::DialedNumber;
///
/// let mut number = DialedNumber::new();
/// for d in "61234".chars() {
///     number.push(d);
/// }
/// assert_eq!(number.to_string(), "612 34");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialedNumber {
    digits: String,
}

impl DialedNumber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a digit. Non-digits and digits past [`DIAL_LENGTH`] are
    /// ignored. Returns `true` when the number is complete.
    pub fn push(&mut self, digit: char) -> bool {
        if digit.is_ascii_digit() && self.digits.len() < DIAL_LENGTH {
            self.digits.push(digit);
        }
        self.is_complete()
    }

    /// Remove the last digit.
    pub fn pop(&mut self) -> Option<char> {
        self.digits.pop()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    /// Take the digits out, leaving the number empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.digits)
    }

    pub fn is_complete(&self) -> bool {
        self.digits.len() == DIAL_LENGTH
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    /// The raw digits, ungrouped.
    pub fn as_str(&self) -> &str {
        &self.digits
    }
}

impl fmt::Display for DialedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.digits.as_str();
        let mut first = true;
        for size in GROUPS {
            if rest.is_empty() {
                break;
            }
            let (group, tail) = rest.split_at(size.min(rest.len()));
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(group)?;
            first = false;
            rest = tail;
        }
        Ok(())
    }
}
