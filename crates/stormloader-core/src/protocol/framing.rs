//! Escape-based byte framing
//!
//! Inbound, a frame is a run of argument bytes terminated by the escape
//! sentinel followed by the opcode. A literal sentinel inside the arguments
//! is sent doubled. Outbound, a response is `[ESCAPE][tag]` followed by the
//! payload with every sentinel doubled.
//!
//! ```text
//! host -> device:  a0 a1 FC FC a3 FC 07      args = [a0 a1 FC a3], opcode 0x07
//! device -> host:  FC 15                     tag OK, no payload
//! ```

use heapless::Vec;

use crate::config::{ESCAPE, RESPONSE_HEADER_LEN, RX_CAPACITY, TX_CAPACITY};
use crate::error::{Error, Result};
use crate::protocol::Response;

/// Escape a payload, doubling every sentinel byte
pub fn escape(data: &[u8]) -> impl Iterator<Item = u8> + '_ {
    data.iter().flat_map(|&b| {
        let n = if b == ESCAPE { 2 } else { 1 };
        core::iter::repeat(b).take(n)
    })
}

/// Length of `data` once escaped
pub fn escaped_len(data: &[u8]) -> usize {
    data.len() + data.iter().filter(|&&b| b == ESCAPE).count()
}

/// Result of feeding one byte to an [`Unescaper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sentinel consumed, waiting for the next byte
    Escape,
    /// A de-escaped data byte
    Data(u8),
    /// Sentinel followed by a non-sentinel byte
    Terminator(u8),
}

/// The one-bit escape state machine shared by both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct Unescaper {
    escape_pending: bool,
}

impl Unescaper {
    /// Create an unescaper with no pending sentinel
    pub const fn new() -> Self {
        Self {
            escape_pending: false,
        }
    }

    /// Feed one raw byte
    pub fn push(&mut self, byte: u8) -> Step {
        match (self.escape_pending, byte == ESCAPE) {
            (false, true) => {
                self.escape_pending = true;
                Step::Escape
            }
            (true, true) => {
                self.escape_pending = false;
                Step::Data(ESCAPE)
            }
            (true, false) => {
                self.escape_pending = false;
                Step::Terminator(byte)
            }
            (false, false) => Step::Data(byte),
        }
    }

    /// True if the last byte was an unpaired sentinel
    pub fn is_pending(&self) -> bool {
        self.escape_pending
    }

    /// Forget any pending sentinel
    pub fn reset(&mut self) {
        self.escape_pending = false;
    }
}

/// Fixed-capacity buffer holding one de-escaped command payload
pub struct RxBuffer {
    buf: Vec<u8, RX_CAPACITY>,
}

impl RxBuffer {
    /// Create an empty receive buffer
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one byte, refusing to grow past capacity
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.buf.push(byte).map_err(|_| Error::Overflow)
    }

    /// Received argument bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes received
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been received
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True if another byte would overflow
    pub fn is_full(&self) -> bool {
        self.buf.is_full()
    }

    /// Drop all received bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a [`Deframer`] did with one inbound byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Byte consumed; no frame complete yet
    Pending,
    /// Frame complete with this opcode; arguments are in the receive buffer
    Frame(u8),
    /// The receive buffer just overflowed; input is discarded until the
    /// next terminator
    Overflow,
    /// Terminator of an overflowed frame; the receive buffer was emptied
    /// and the frame must not be executed
    Discarded(u8),
}

/// Inbound framing state machine
///
/// Accumulates de-escaped bytes into an [`RxBuffer`] and reports completed
/// frames. It never clears the buffer on a completed frame; the dispatcher
/// does that after the command ran.
#[derive(Debug, Default)]
pub struct Deframer {
    unescaper: Unescaper,
    discarding: bool,
}

impl Deframer {
    /// Create a deframer in the "ready" state
    pub const fn new() -> Self {
        Self {
            unescaper: Unescaper::new(),
            discarding: false,
        }
    }

    /// Feed one byte from the UART
    pub fn push(&mut self, rx: &mut RxBuffer, byte: u8) -> FrameEvent {
        match self.unescaper.push(byte) {
            Step::Escape => FrameEvent::Pending,
            Step::Terminator(opcode) if self.discarding => {
                self.discarding = false;
                rx.clear();
                FrameEvent::Discarded(opcode)
            }
            Step::Terminator(opcode) => FrameEvent::Frame(opcode),
            Step::Data(_) if self.discarding => FrameEvent::Pending,
            Step::Data(b) => match rx.push(b) {
                Ok(()) => FrameEvent::Pending,
                Err(_) => {
                    self.discarding = true;
                    FrameEvent::Overflow
                }
            },
        }
    }

    /// True while dropping the tail of an overflowed frame
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Return to the "ready" state
    pub fn reset(&mut self) {
        self.unescaper.reset();
        self.discarding = false;
    }
}

/// Fixed-capacity buffer holding one escaped response frame
pub struct TxBuffer {
    buf: Vec<u8, TX_CAPACITY>,
    cursor: usize,
}

impl TxBuffer {
    /// Create an empty transmit buffer
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            cursor: 0,
        }
    }

    /// Stage a complete response, replacing anything still pending
    ///
    /// Either the whole frame is staged or, if it would not fit once escaped,
    /// nothing changes and [`Error::ResponseTooLarge`] is returned.
    pub fn stage(&mut self, tag: Response, payload: &[u8]) -> Result<()> {
        if RESPONSE_HEADER_LEN + escaped_len(payload) > TX_CAPACITY {
            return Err(Error::ResponseTooLarge);
        }
        self.buf.clear();
        self.cursor = 0;
        self.buf.extend([ESCAPE, tag.code()]);
        self.buf.extend(escape(payload));
        Ok(())
    }

    /// Next byte to send, if any
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.cursor).copied()
    }

    /// Mark the byte returned by [`peek`](Self::peek) as sent
    pub fn advance(&mut self) {
        if self.cursor < self.buf.len() {
            self.cursor += 1;
        }
    }

    /// Bytes staged but not yet sent
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// True when nothing is left to send
    pub fn is_empty(&self) -> bool {
        self.cursor >= self.buf.len()
    }

    /// Drop anything staged
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_RESPONSE_PAYLOAD;

    const S: u8 = ESCAPE;

    fn feed(deframer: &mut Deframer, rx: &mut RxBuffer, bytes: &[u8]) -> Option<FrameEvent> {
        let mut last = None;
        for &b in bytes {
            let ev = deframer.push(rx, b);
            if ev != FrameEvent::Pending {
                last = Some(ev);
            }
        }
        last
    }

    #[test]
    fn test_escape_unescape_round_trip() {
        let data = [0x00, S, 0x12, S, S, 0xFF, S];
        let escaped: std::vec::Vec<u8> = escape(&data).collect();
        assert_eq!(escaped.len(), data.len() + 4);
        assert_eq!(escaped.len(), escaped_len(&data));

        let mut unescaper = Unescaper::new();
        let mut out = std::vec::Vec::new();
        for b in escaped {
            match unescaper.push(b) {
                Step::Data(d) => out.push(d),
                Step::Escape => {}
                Step::Terminator(t) => panic!("unexpected terminator {t:#x}"),
            }
        }
        assert_eq!(out, data);
        assert!(!unescaper.is_pending());
    }

    #[test]
    fn test_two_frames_split_by_escape_rules() {
        let (x, y) = (0x01, 0x05);
        let mut deframer = Deframer::new();
        let mut rx = RxBuffer::new();

        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, x), FrameEvent::Frame(x));
        assert!(rx.is_empty());
        rx.clear();

        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, y), FrameEvent::Frame(y));
        assert_eq!(rx.as_slice(), &[S]);
    }

    #[test]
    fn test_frame_with_arguments() {
        let mut deframer = Deframer::new();
        let mut rx = RxBuffer::new();
        let ev = feed(&mut deframer, &mut rx, &[0xAA, S, S, 0xBB, S, 0x07]);
        assert_eq!(ev, Some(FrameEvent::Frame(0x07)));
        assert_eq!(rx.as_slice(), &[0xAA, S, 0xBB]);
    }

    #[test]
    fn test_overflow_discards_until_terminator() {
        let mut deframer = Deframer::new();
        let mut rx = RxBuffer::new();
        for _ in 0..RX_CAPACITY {
            assert_eq!(deframer.push(&mut rx, 0x11), FrameEvent::Pending);
        }
        assert!(rx.is_full());

        assert_eq!(deframer.push(&mut rx, 0x22), FrameEvent::Overflow);
        assert!(deframer.is_discarding());
        assert_eq!(rx.len(), RX_CAPACITY);

        // Escaped sentinels are dropped too
        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(rx.len(), RX_CAPACITY);

        assert_eq!(deframer.push(&mut rx, S), FrameEvent::Pending);
        assert_eq!(deframer.push(&mut rx, 0x07), FrameEvent::Discarded(0x07));
        assert!(rx.is_empty());
        assert!(!deframer.is_discarding());

        // Back to normal framing
        let ev = feed(&mut deframer, &mut rx, &[0x33, S, 0x01]);
        assert_eq!(ev, Some(FrameEvent::Frame(0x01)));
        assert_eq!(rx.as_slice(), &[0x33]);
    }

    #[test]
    fn test_full_buffer_still_terminates() {
        let mut deframer = Deframer::new();
        let mut rx = RxBuffer::new();
        for _ in 0..RX_CAPACITY {
            deframer.push(&mut rx, 0x00);
        }
        let ev = feed(&mut deframer, &mut rx, &[S, 0x10]);
        assert_eq!(ev, Some(FrameEvent::Frame(0x10)));
        assert_eq!(rx.len(), RX_CAPACITY);
    }

    #[test]
    fn test_stage_escapes_payload() {
        let mut tx = TxBuffer::new();
        tx.stage(Response::ReadRange, &[0x01, S, 0x02]).unwrap();
        assert_eq!(tx.pending(), &[S, 0x20, 0x01, S, S, 0x02]);

        let mut sent = std::vec::Vec::new();
        while let Some(b) = tx.peek() {
            sent.push(b);
            tx.advance();
        }
        assert_eq!(sent.len(), 6);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_stage_worst_case_payload_fits() {
        let mut tx = TxBuffer::new();
        let payload = [S; MAX_RESPONSE_PAYLOAD];
        tx.stage(Response::XReadRange, &payload).unwrap();
        assert_eq!(tx.pending().len(), RESPONSE_HEADER_LEN + 2 * MAX_RESPONSE_PAYLOAD);
    }

    #[test]
    fn test_stage_too_large_leaves_buffer_untouched() {
        let mut tx = TxBuffer::new();
        tx.stage(Response::Pong, &[]).unwrap();

        let payload = [S; MAX_RESPONSE_PAYLOAD + 1];
        assert_eq!(
            tx.stage(Response::XReadRange, &payload),
            Err(Error::ResponseTooLarge)
        );
        assert_eq!(tx.pending(), &[S, Response::Pong.code()]);
    }
}
