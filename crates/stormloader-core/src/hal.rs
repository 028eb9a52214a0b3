//! Hardware abstraction traits
//!
//! The engine never touches registers or raw pointers. Targets implement
//! these traits over their peripherals; tests implement them over memory.
//!
//! The UART side uses the `embedded-io` traits directly: the engine needs
//! `Read + ReadReady` to take a byte only when one has arrived, and
//! `Write + WriteReady` to send a byte only when the transmitter is free.

use crate::config::DEVICE_ID_LEN;
use crate::error::Result;
use crate::spi::SpiCommand;

/// Internal flash controller
///
/// Mirrors the controller primitives the programming sequences in
/// [`crate::iflash`] are built from. Page numbers are `addr / 512`.
pub trait FlashController {
    /// Spin until the controller is idle
    fn wait_until_ready(&mut self);

    /// Fast hardware check whether a page is fully erased
    fn is_page_erased(&mut self, page: u32) -> bool;

    /// Erase a page
    ///
    /// Returns [`Error::InternalFlash`](crate::Error::InternalFlash) if the
    /// controller reports a failure.
    fn erase_page(&mut self, page: u32) -> Result<()>;

    /// Erase the user configuration page
    fn erase_user_page(&mut self) -> Result<()>;

    /// Reset the page buffer to all ones
    fn clear_page_buffer(&mut self);

    /// Write one word into the page buffer at the flash address it will
    /// be committed to
    fn write_buffer_word(&mut self, addr: u32, word: u32);

    /// Commit the page buffer to a page
    fn write_page(&mut self, page: u32) -> Result<()>;

    /// Commit the page buffer to the user configuration page
    fn write_user_page(&mut self) -> Result<()>;

    /// Invalidate the instruction/data cache in front of flash
    fn invalidate_cache(&mut self);

    /// Bounds-checked read of mapped flash
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Factory-programmed unique serial number
    fn unique_id(&mut self) -> [u8; DEVICE_ID_LEN];
}

/// SPI master attached to the external flash chip select
///
/// Each [`SpiCommand`] is one chip-select-framed transaction.
pub trait SpiMaster {
    /// Execute a single SPI transaction
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

/// Board services outside the protocol engine
pub trait Board {
    /// Route the slow RC clock to the diagnostic pin
    ///
    /// On hardware this never returns; the engine halts after calling it.
    fn route_clock_out(&mut self);
}

impl<T: FlashController + ?Sized> FlashController for &mut T {
    fn wait_until_ready(&mut self) {
        (**self).wait_until_ready()
    }

    fn is_page_erased(&mut self, page: u32) -> bool {
        (**self).is_page_erased(page)
    }

    fn erase_page(&mut self, page: u32) -> Result<()> {
        (**self).erase_page(page)
    }

    fn erase_user_page(&mut self) -> Result<()> {
        (**self).erase_user_page()
    }

    fn clear_page_buffer(&mut self) {
        (**self).clear_page_buffer()
    }

    fn write_buffer_word(&mut self, addr: u32, word: u32) {
        (**self).write_buffer_word(addr, word)
    }

    fn write_page(&mut self, page: u32) -> Result<()> {
        (**self).write_page(page)
    }

    fn write_user_page(&mut self) -> Result<()> {
        (**self).write_user_page()
    }

    fn invalidate_cache(&mut self) {
        (**self).invalidate_cache()
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn unique_id(&mut self) -> [u8; DEVICE_ID_LEN] {
        (**self).unique_id()
    }
}

impl<T: SpiMaster + ?Sized> SpiMaster for &mut T {
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
