//! # Frame Assembler
//!
//! Splits the incoming byte stream into command strings. A line-feed,
//! carriage-return, or semicolon ends the current command, so several commands
//! can share one line (`SOUR1:STAT ON;STAT?`).

/// Largest command, in bytes, accepted before a terminator.
pub const FRAME_CAPACITY: usize = 64;

/// Returned when a byte does not fit in a [`CommandBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Fixed-capacity byte buffer that refuses to grow past its limit.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl CommandBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, byte: u8) -> Result<(), Overflow> {
        if self.bytes.len() >= self.capacity {
            return Err(Overflow);
        }
        self.bytes.push(byte);
        Ok(())
    }

    /// Empties the buffer, returning its contents as text.
    pub fn take(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        self.bytes.clear();
        text
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// What a single pushed byte produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A terminator closed a non-empty command.
    Frame(String),
    /// The current command grew past capacity and was thrown away.
    Overflow,
}

fn is_terminator(byte: u8) -> bool {
    matches!(byte, b'\n' | b'\r' | b';')
}

#[derive(Debug, Clone)]
pub struct FrameAssembler {
    buffer: CommandBuffer,
    // Set after an overflow; the rest of the line is dropped up to the next terminator.
    discarding: bool,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: CommandBuffer::with_capacity(capacity),
            discarding: false,
        }
    }

    /// Consumes one byte from the transport.
    pub fn push(&mut self, byte: u8) -> Option<FrameEvent> {
        if is_terminator(byte) {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            if self.buffer.is_empty() {
                return None;
            }
            let frame = self.buffer.take();
            log::trace!("frame complete: {:?}", frame);
            return Some(FrameEvent::Frame(frame));
        }

        if self.discarding {
            return None;
        }
        if self.buffer.is_empty() && matches!(byte, b' ' | b'\t') {
            return None;
        }

        match self.buffer.push(byte) {
            Ok(()) => None,
            Err(Overflow) => {
                log::trace!(
                    "frame exceeded {} bytes, discarding until terminator",
                    self.buffer.capacity()
                );
                self.buffer.clear();
                self.discarding = true;
                Some(FrameEvent::Overflow)
            }
        }
    }

    /// Drops any partial command.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(framer: &mut FrameAssembler, input: &[u8]) -> Vec<FrameEvent> {
        input.iter().filter_map(|&b| framer.push(b)).collect()
    }

    fn frame(text: &str) -> FrameEvent {
        FrameEvent::Frame(String::from(text))
    }

    #[test]
    fn command_buffer_rejects_byte_past_capacity() {
        let mut buffer = CommandBuffer::with_capacity(2);
        assert_eq!(buffer.push(b'A'), Ok(()));
        assert_eq!(buffer.push(b'B'), Ok(()));
        assert_eq!(buffer.push(b'C'), Err(Overflow));
        assert_eq!(buffer.take(), "AB");
        assert!(buffer.is_empty());
    }

    #[test]
    fn each_terminator_closes_a_frame() {
        let mut framer = FrameAssembler::new();
        let events = push_all(&mut framer, b"*IDN?\nSTAT?\r*RST;*CLS\n");
        assert_eq!(
            events,
            vec![frame("*IDN?"), frame("STAT?"), frame("*RST"), frame("*CLS")]
        );
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut framer = FrameAssembler::new();
        let events = push_all(&mut framer, b"\r\n;;\n*RST\r\n\r\n");
        assert_eq!(events, vec![frame("*RST")]);
    }

    #[test]
    fn leading_whitespace_is_skipped_but_inner_whitespace_kept() {
        let mut framer = FrameAssembler::new();
        let events = push_all(&mut framer, b"  \tSOUR1:STAT ON\n;  STAT?\n");
        assert_eq!(events, vec![frame("SOUR1:STAT ON"), frame("STAT?")]);
    }

    #[test]
    fn whitespace_only_line_produces_nothing() {
        let mut framer = FrameAssembler::new();
        assert!(push_all(&mut framer, b"   \t \n").is_empty());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn frame_held_until_terminator_arrives() {
        let mut framer = FrameAssembler::new();
        assert!(push_all(&mut framer, b"SOUR2:ST").is_empty());
        assert_eq!(framer.pending(), 8);
        assert_eq!(push_all(&mut framer, b"AT?\n"), vec![frame("SOUR2:STAT?")]);
    }

    #[test]
    fn frame_at_capacity_is_accepted() {
        let mut framer = FrameAssembler::with_capacity(4);
        assert_eq!(push_all(&mut framer, b"STAT\n"), vec![frame("STAT")]);
    }

    #[test]
    fn overflow_discards_the_whole_line() {
        let mut framer = FrameAssembler::with_capacity(4);
        let events = push_all(&mut framer, b"ALL_OFF\n*RST\n");
        assert_eq!(events, vec![FrameEvent::Overflow, frame("*RST")]);
    }

    #[test]
    fn overflow_tail_after_semicolon_is_a_new_command() {
        let mut framer = FrameAssembler::with_capacity(5);
        let events = push_all(&mut framer, b"ABCDEFGHIJ;STAT?\n");
        assert_eq!(events, vec![FrameEvent::Overflow, frame("STAT?")]);
    }

    #[test]
    fn reset_drops_partial_command() {
        let mut framer = FrameAssembler::new();
        push_all(&mut framer, b"SOUR1");
        framer.reset();
        assert_eq!(push_all(&mut framer, b"*OPC?\n"), vec![frame("*OPC?")]);
    }
}
