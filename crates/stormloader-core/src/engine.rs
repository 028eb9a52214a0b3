//! The bootloader engine
//!
//! [`Bootloader`] owns the framing buffers and the hardware handles. The
//! firmware main loop calls [`Bootloader::poll`] forever; each poll moves
//! at most one byte in each direction, so a long response drains while new
//! input keeps being accepted.

use embedded_io::{Read, ReadReady, Write, WriteReady};

use crate::config::CRC_CHUNK;
use crate::dispatch::{self, Context, Reply};
use crate::error::{Error, Result};
use crate::hal::{Board, FlashController, SpiMaster};
use crate::protocol::{Command, Deframer, FrameEvent, Response, RxBuffer, TxBuffer};
use crate::xflash;

/// Device-side protocol engine
pub struct Bootloader<U, F, S, B> {
    uart: U,
    flash: F,
    spi: S,
    board: B,
    rx: RxBuffer,
    tx: TxBuffer,
    deframer: Deframer,
    scratch: [u8; CRC_CHUNK],
    halted: bool,
}

impl<U, F, S, B> Bootloader<U, F, S, B>
where
    U: Read + ReadReady + Write + WriteReady,
    F: FlashController,
    S: SpiMaster,
    B: Board,
{
    /// Create an engine with empty buffers
    pub fn new(uart: U, flash: F, spi: S, board: B) -> Self {
        Self {
            uart,
            flash,
            spi,
            board,
            rx: RxBuffer::new(),
            tx: TxBuffer::new(),
            deframer: Deframer::new(),
            scratch: [0; CRC_CHUNK],
            halted: false,
        }
    }

    /// Bring the external flash into a known state
    ///
    /// Resets the DataFlash and selects 256-byte pages. Nothing is sent to
    /// the host.
    pub fn init(&mut self) -> Result<()> {
        log::info!("stormloader: starting");
        xflash::software_reset(&mut self.spi)?;
        xflash::init_page_size(&mut self.spi)
    }

    /// Service the UART once
    ///
    /// Sends the next pending response byte if the transmitter is free,
    /// then takes one received byte if one is waiting. Does nothing once
    /// the engine has halted.
    pub fn poll(&mut self) -> Result<()> {
        if self.halted {
            return Ok(());
        }

        if let Some(byte) = self.tx.peek() {
            if self.uart.write_ready().map_err(|_| Error::Uart)? {
                let n = self.uart.write(&[byte]).map_err(|_| Error::Uart)?;
                if n == 1 {
                    self.tx.advance();
                }
            }
        }

        if self.uart.read_ready().map_err(|_| Error::Uart)? {
            let mut byte = [0u8; 1];
            if self.uart.read(&mut byte).map_err(|_| Error::Uart)? == 1 {
                self.feed(byte[0]);
            }
        }

        Ok(())
    }

    /// Process one inbound byte, running a command if it completes a frame
    pub fn feed(&mut self, byte: u8) {
        if self.halted {
            return;
        }

        match self.deframer.push(&mut self.rx, byte) {
            FrameEvent::Pending => {}
            FrameEvent::Overflow => {
                log::warn!("stormloader: receive buffer overflow, dropping frame");
                stage(&mut self.tx, Response::Overflow, &[]);
            }
            FrameEvent::Discarded(opcode) if opcode == Command::Reset.code() => {
                log::debug!("stormloader: reset ends overflowed frame");
                self.reset();
            }
            FrameEvent::Discarded(opcode) => {
                log::warn!(
                    "stormloader: discarded truncated frame (opcode {:#04x})",
                    opcode
                );
            }
            FrameEvent::Frame(opcode) => self.run(opcode),
        }
    }

    fn run(&mut self, opcode: u8) {
        let mut ctx = Context {
            flash: &mut self.flash,
            spi: &mut self.spi,
            board: &mut self.board,
            scratch: &mut self.scratch,
        };

        match dispatch::dispatch(&mut ctx, opcode, self.rx.as_slice()) {
            Reply::Status(tag) => stage(&mut self.tx, tag, &[]),
            Reply::Data(tag, payload) => stage(&mut self.tx, tag, payload),
            Reply::Reset => {
                log::debug!("stormloader: reset");
                self.tx.clear();
                self.deframer.reset();
            }
            Reply::Halt => {
                log::info!("stormloader: halted");
                self.halted = true;
            }
        }
        self.rx.clear();
    }

    fn reset(&mut self) {
        self.tx.clear();
        self.deframer.reset();
        self.rx.clear();
    }

    /// True after CLKOUT; the engine no longer reads or writes the UART
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Escaped response bytes not yet sent
    pub fn pending_output(&self) -> &[u8] {
        self.tx.pending()
    }

    /// Bytes buffered for the frame currently being received
    pub fn pending_input(&self) -> &[u8] {
        self.rx.as_slice()
    }

    /// Borrow the UART
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// Borrow the internal flash controller
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Borrow the SPI master
    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    /// Borrow the board
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}

/// Stage a response, falling back to INTERROR if it cannot fit
fn stage(tx: &mut TxBuffer, tag: Response, payload: &[u8]) {
    if let Err(e) = tx.stage(tag, payload) {
        log::error!(
            "stormloader: {:?} response with {} bytes: {}",
            tag,
            payload.len(),
            e
        );
        // A bare header always fits
        let _ = tx.stage(Response::IntError, &[]);
    }
}
