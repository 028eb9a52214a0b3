//! Emulated UART

use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_io::{ErrorType, Read, ReadReady, Write, WriteReady};

/// Byte queues standing in for the UART
///
/// Bytes pushed with [`push_input`](Self::push_input) are what the engine
/// receives; everything the engine writes is collected for
/// [`take_output`](Self::take_output).
#[derive(Debug, Default)]
pub struct SimUart {
    input: VecDeque<u8>,
    output: Vec<u8>,
    tx_blocked: bool,
}

impl SimUart {
    /// Create idle queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the engine to receive
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Number of received bytes waiting
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Bytes written by the engine so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drain the bytes written by the engine
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    /// Report the transmitter as busy
    pub fn set_tx_blocked(&mut self, blocked: bool) {
        self.tx_blocked = blocked;
    }
}

impl ErrorType for SimUart {
    type Error = Infallible;
}

impl Read for SimUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.input.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for SimUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input.is_empty())
    }
}

impl Write for SimUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.tx_blocked {
            return Ok(0);
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl WriteReady for SimUart {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.tx_blocked)
    }
}
