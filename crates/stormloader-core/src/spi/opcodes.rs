//! DataFlash opcodes
//!
//! AT45-family serial DataFlash commands used by the bootloader. Addresses
//! are 24-bit, big endian, in power-of-two page mode.

use bitflags::bitflags;

// ============================================================================
// Status / configuration
// ============================================================================

/// Status Register Read (two bytes follow)
pub const RDSR: u8 = 0xD7;
/// Software reset; followed by [`RESET_SEQ`]
pub const RESET: u8 = 0xF0;
/// Remaining bytes of the software reset sequence
pub const RESET_SEQ: [u8; 3] = [0x00, 0x00, 0x00];
/// Configuration command prefix
pub const CONFIGURE: u8 = 0x3D;
/// Remaining bytes of "set page size to 256 bytes"
pub const POWER_OF_TWO_SEQ: [u8; 3] = [0x2A, 0x80, 0xA6];

// ============================================================================
// Read
// ============================================================================

/// Continuous Array Read (high frequency), two dummy bytes
pub const READ_HF: u8 = 0x1B;
/// Dummy bytes after the address of [`READ_HF`]
pub const READ_HF_DUMMY: u8 = 2;

// ============================================================================
// Program / erase
// ============================================================================

/// Main Memory Page Program through Buffer 1 with built-in erase
pub const PP_BUF1: u8 = 0x82;
/// Read-Modify-Write through Buffer 1 (no prior erase needed)
pub const RMW_BUF1: u8 = 0x58;
/// Page Erase
pub const PE: u8 = 0x81;
/// Block Erase (8 pages)
pub const BE: u8 = 0x50;

bitflags! {
    /// Second status register byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status2: u8 {
        /// Device ready (not busy)
        const RDY = 1 << 7;
        /// Erase/program error in the last operation
        const EPE = 1 << 5;
        /// Sector lockdown enabled
        const SLE = 1 << 3;
        /// Program suspended (buffer 2)
        const PS2 = 1 << 2;
        /// Program suspended (buffer 1)
        const PS1 = 1 << 1;
        /// Erase suspended
        const ES = 1 << 0;
    }
}

bitflags! {
    /// First status register byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status1: u8 {
        /// Device ready (not busy)
        const RDY = 1 << 7;
        /// Main memory does not match buffer after compare
        const COMP = 1 << 6;
        /// Sector protection enabled
        const PROTECT = 1 << 1;
        /// Power-of-two page size configured
        const PAGE_SIZE = 1 << 0;
    }
}
