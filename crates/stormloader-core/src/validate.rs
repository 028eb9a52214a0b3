//! Address window validation
//!
//! Pure checks run before any hardware is touched. Mutating commands use
//! the protected windows, which start above the bootloader (internal) and
//! above the attribute block (external). Reads and CRCs may cover the
//! whole device.

use crate::config::{
    EXTERNAL_CEILING, EXTERNAL_FLOOR, INTERNAL_CEILING, INTERNAL_FLOOR, INTERNAL_PAGE_SIZE,
};
use crate::error::{Error, Result};

/// A half-open address window `[floor, ceiling)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashWindow {
    /// Lowest allowed address
    pub floor: u32,
    /// One past the highest allowed address
    pub ceiling: u32,
}

impl FlashWindow {
    /// Create a window
    pub const fn new(floor: u32, ceiling: u32) -> Self {
        Self { floor, ceiling }
    }

    /// True if `[addr, addr + len)` lies inside the window
    ///
    /// Computed in 64 bits so `addr + len` cannot wrap.
    pub const fn contains(&self, addr: u32, len: u32) -> bool {
        addr >= self.floor && addr as u64 + len as u64 <= self.ceiling as u64
    }

    /// Like [`contains`](Self::contains), also requiring `addr` to be a
    /// multiple of `align` (a power of two; 1 means no alignment)
    pub const fn allows(&self, addr: u32, len: u32, align: u32) -> bool {
        self.contains(addr, len) && addr & (align - 1) == 0
    }

    /// [`allows`](Self::allows) as a `Result`
    pub fn check(&self, addr: u32, len: u32, align: u32) -> Result<()> {
        if self.allows(addr, len, align) {
            Ok(())
        } else {
            Err(Error::BadAddress)
        }
    }
}

/// Internal flash that may be erased/programmed
pub const INTERNAL_WINDOW: FlashWindow = FlashWindow::new(INTERNAL_FLOOR, INTERNAL_CEILING);
/// Internal flash that may be read or hashed
pub const INTERNAL_READ_WINDOW: FlashWindow = FlashWindow::new(0, INTERNAL_CEILING);
/// External flash that may be erased/programmed
pub const EXTERNAL_WINDOW: FlashWindow = FlashWindow::new(EXTERNAL_FLOOR, EXTERNAL_CEILING);
/// External flash that may be read or hashed
pub const EXTERNAL_READ_WINDOW: FlashWindow = FlashWindow::new(0, EXTERNAL_CEILING);

/// Page-granular internal flash check
pub const fn internal_range_ok(addr: u32, len: u32) -> bool {
    INTERNAL_WINDOW.allows(addr, len, INTERNAL_PAGE_SIZE as u32)
}

/// External flash check with the alignment the operation needs
///
/// Block erase passes the block size, page program the page size, and
/// reads pass 1.
pub const fn external_range_ok(addr: u32, len: u32, align: u32) -> bool {
    EXTERNAL_WINDOW.allows(addr, len, align)
}

/// Internal read/CRC check
pub const fn internal_readable(addr: u32, len: u32) -> bool {
    INTERNAL_READ_WINDOW.contains(addr, len)
}

/// External read/CRC check
pub const fn external_readable(addr: u32, len: u32) -> bool {
    EXTERNAL_READ_WINDOW.contains(addr, len)
}
