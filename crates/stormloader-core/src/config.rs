//! Build-time configuration constants
//!
//! Flash windows never include the bootloader's own code region or the
//! attribute block at the start of external flash.

/// Escape sentinel. Doubled when it appears in data; followed by any other
/// byte it terminates a frame and that byte is the opcode.
pub const ESCAPE: u8 = 0xFC;

/// Receive buffer capacity in bytes
pub const RX_CAPACITY: usize = 4096;

/// Transmit buffer capacity in bytes (escaped form, header included)
pub const TX_CAPACITY: usize = 4096;

/// Response header length: `[ESCAPE][tag]`
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Largest raw payload a handler may stage
///
/// Escaping can double every byte, so this guarantees the staged frame fits.
pub const MAX_RESPONSE_PAYLOAD: usize = (TX_CAPACITY - RESPONSE_HEADER_LEN) / 2;

// ============================================================================
// Internal flash
// ============================================================================

/// Lowest internal flash address that may be erased or programmed
pub const INTERNAL_FLOOR: u32 = 0x0001_0000;
/// One past the highest internal flash address
pub const INTERNAL_CEILING: u32 = 0x0008_0000;
/// Internal flash page size
pub const INTERNAL_PAGE_SIZE: usize = 512;
/// log2 of [`INTERNAL_PAGE_SIZE`]
pub const INTERNAL_PAGE_SHIFT: u32 = 9;
/// Address of the user configuration page
pub const USER_PAGE_ADDR: u32 = 0x0080_0000;

// ============================================================================
// External flash
// ============================================================================

/// Lowest external flash address that may be erased or programmed
pub const EXTERNAL_FLOOR: u32 = 0x0000_0800;
/// One past the highest external flash address (8 MiB)
pub const EXTERNAL_CEILING: u32 = 0x0080_0000;
/// External flash erase block size
pub const EXTERNAL_BLOCK_SIZE: u32 = 2048;
/// External flash program page size (power-of-two mode)
pub const EXTERNAL_PAGE_SIZE: usize = 256;

/// Status reads before an external erase/program is declared timed out
pub const XFLASH_POLL_LIMIT: u32 = 50_000;
/// Delay between status reads
pub const XFLASH_POLL_DELAY_US: u32 = 5;

// ============================================================================
// CRC / attributes / misc
// ============================================================================

/// External flash is hashed in chunks of this many bytes
pub const CRC_CHUNK: usize = 4096;

/// Number of attribute slots
pub const ATTR_SLOTS: u8 = 16;
/// Size of one attribute record
pub const ATTR_RECORD_SIZE: usize = 64;
/// Attribute tag length
pub const ATTR_TAG_LEN: usize = 8;
/// Maximum attribute value length
pub const ATTR_MAX_VALUE: usize = ATTR_RECORD_SIZE - ATTR_TAG_LEN - 1;

/// Length of the info response payload (`[len][text][zero padding]`)
pub const INFO_LEN: usize = 193;
/// Length of the unique device serial
pub const DEVICE_ID_LEN: usize = 16;
