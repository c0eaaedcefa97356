//! FIFO buffer between fragment arrival and paced reveal.

use std::collections::VecDeque;

/// Characters received from the stream, split into revealed and pending.
///
/// Arrival appends to the back of the pending queue; each pacer tick moves
/// exactly one character from the front into the revealed text.
#[derive(Debug, Default)]
pub struct RevealBuffer {
    pending: VecDeque<char>,
    revealed: String,
}

impl RevealBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fragment's characters behind everything already pending.
    pub fn push(&mut self, fragment: &str) {
        self.pending.extend(fragment.chars());
    }

    /// Reveal the next pending character.
    ///
    /// Returns the revealed text so far, or `None` if nothing was pending.
    pub fn reveal_next(&mut self) -> Option<&str> {
        let next = self.pending.pop_front()?;
        self.revealed.push(next);
        Some(&self.revealed)
    }

    /// Whether every received character has been revealed.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of characters received but not yet revealed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Text revealed so far.
    #[must_use]
    pub fn revealed(&self) -> &str {
        &self.revealed
    }

    /// Consume the buffer, discarding anything unrevealed.
    #[must_use]
    pub fn into_revealed(self) -> String {
        self.revealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveals_in_arrival_order_one_char_per_call() {
        let mut buffer = RevealBuffer::new();
        buffer.push("Hel");
        buffer.push("lo wor");
        buffer.push("ld");

        let mut partials = Vec::new();
        while let Some(partial) = buffer.reveal_next() {
            partials.push(partial.to_string());
        }

        assert_eq!(partials.len(), "Hello world".len());
        assert_eq!(partials[0], "H");
        assert_eq!(partials[2], "Hel");
        assert_eq!(buffer.revealed(), "Hello world");
        assert!(buffer.is_drained());
    }

    #[test]
    fn empty_buffer_reveals_nothing() {
        let mut buffer = RevealBuffer::new();
        assert!(buffer.reveal_next().is_none());
        assert!(buffer.is_drained());
        assert_eq!(buffer.revealed(), "");
    }

    #[test]
    fn multibyte_characters_are_single_units() {
        let mut buffer = RevealBuffer::new();
        buffer.push("né");
        assert_eq!(buffer.pending_len(), 2);
        assert_eq!(buffer.reveal_next(), Some("n"));
        assert_eq!(buffer.reveal_next(), Some("né"));
    }

    #[test]
    fn into_revealed_drops_pending_remainder() {
        let mut buffer = RevealBuffer::new();
        buffer.push("abc");
        buffer.reveal_next();
        assert_eq!(buffer.pending_len(), 2);
        assert_eq!(buffer.into_revealed(), "a");
    }
}
