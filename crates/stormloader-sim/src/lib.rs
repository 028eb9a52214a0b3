//! stormloader-sim - In-memory board emulator
//!
//! Provides emulated internal flash, DataFlash, UART and board services so
//! the real [`Bootloader`] engine can run on a host. Used by the test suite
//! and by the `serve` command of the CLI.

pub mod dataflash;
pub mod internal;
pub mod uart;

#[cfg(test)]
mod tests;

pub use dataflash::SimDataFlash;
pub use internal::{FlashOp, SimFlashController};
pub use uart::SimUart;

use stormloader_core::error::Result;
use stormloader_core::hal::Board;
use stormloader_core::Bootloader;

/// Board services that only record what was asked of them
#[derive(Debug, Default)]
pub struct SimBoard {
    clock_routed: bool,
}

impl SimBoard {
    /// True after the engine routed the clock to the diagnostic pin
    pub fn clock_routed(&self) -> bool {
        self.clock_routed
    }
}

impl Board for SimBoard {
    fn route_clock_out(&mut self) {
        log::info!("sim: clock routed to diagnostic pin");
        self.clock_routed = true;
    }
}

/// The engine wired to emulated hardware
pub type SimBootloader = Bootloader<SimUart, SimFlashController, SimDataFlash, SimBoard>;

/// Build an engine around the given flashes and run its start-up
pub fn bootloader(flash: SimFlashController, dataflash: SimDataFlash) -> Result<SimBootloader> {
    let mut bl = Bootloader::new(SimUart::new(), flash, dataflash, SimBoard::default());
    bl.init()?;
    Ok(bl)
}

/// Poll until all queued input is consumed and all output is written
///
/// Returns early if the engine halts or stops making progress (for
/// example while the transmitter is blocked).
pub fn run_until_idle(bl: &mut SimBootloader) -> Result<()> {
    loop {
        let before = (bl.uart_mut().input_len(), bl.pending_output().len());
        if bl.is_halted() || before == (0, 0) {
            return Ok(());
        }
        bl.poll()?;
        if (bl.uart_mut().input_len(), bl.pending_output().len()) == before {
            return Ok(());
        }
    }
}

/// Feed `input` to the engine and return everything it sent back
pub fn exchange(bl: &mut SimBootloader, input: &[u8]) -> Result<Vec<u8>> {
    bl.uart_mut().push_input(input);
    run_until_idle(bl)?;
    Ok(bl.uart_mut().take_output())
}
