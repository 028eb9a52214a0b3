//! CRC-32 over buffers and flash ranges
//!
//! Standard CRC-32 (reflected, polynomial 0x04C11DB7, init and final XOR
//! 0xFFFFFFFF). Ranges are fed through one streaming digest, so hashing in
//! chunks gives the same value as hashing the whole range at once.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::config::CRC_CHUNK;
use crate::error::{Error, Result};
use crate::hal::{FlashController, SpiMaster};
use crate::spi::{opcodes, SpiCommand};
use crate::validate::{EXTERNAL_READ_WINDOW, INTERNAL_READ_WINDOW};

/// The CRC-32 algorithm used on the wire
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Reported for an empty receive buffer instead of a computed CRC
pub const EMPTY_SENTINEL: u32 = 0xFFFF_FFFF;

/// CRC-32 of a byte slice
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// CRC-32 of the receive buffer contents
///
/// An empty buffer yields [`EMPTY_SENTINEL`].
pub fn receive_buffer(data: &[u8]) -> u32 {
    if data.is_empty() {
        EMPTY_SENTINEL
    } else {
        checksum(data)
    }
}

/// CRC-32 of `len` bytes of internal flash at `addr`
///
/// `scratch` bounds how much is read per step.
pub fn internal_range<F: FlashController + ?Sized>(
    flash: &mut F,
    addr: u32,
    len: u32,
    scratch: &mut [u8],
) -> Result<u32> {
    INTERNAL_READ_WINDOW.check(addr, len, 1)?;
    if scratch.is_empty() {
        return Err(Error::BadArgs);
    }
    flash.invalidate_cache();

    let mut digest = CRC32.digest();
    let mut offset = 0u32;
    while offset < len {
        let n = chunk_len(len - offset, scratch.len());
        let chunk = &mut scratch[..n];
        flash.read(addr + offset, chunk)?;
        digest.update(chunk);
        offset += n as u32;
    }
    Ok(digest.finalize())
}

/// CRC-32 of `len` bytes of external flash at `addr`
///
/// The device is read in chunks of at most [`CRC_CHUNK`] bytes.
pub fn external_range<M: SpiMaster + ?Sized>(
    master: &mut M,
    addr: u32,
    len: u32,
    scratch: &mut [u8],
) -> Result<u32> {
    EXTERNAL_READ_WINDOW.check(addr, len, 1)?;
    let step = scratch.len().min(CRC_CHUNK);
    if step == 0 {
        return Err(Error::BadArgs);
    }
    log::debug!("crc: external {:#08x}+{:#x}", addr, len);

    let mut digest = CRC32.digest();
    let mut offset = 0u32;
    while offset < len {
        let n = chunk_len(len - offset, step);
        let chunk = &mut scratch[..n];
        let mut cmd = SpiCommand::read(
            opcodes::READ_HF,
            addr + offset,
            opcodes::READ_HF_DUMMY,
            chunk,
        );
        master.execute(&mut cmd)?;
        digest.update(chunk);
        offset += n as u32;
    }
    Ok(digest.finalize())
}

fn chunk_len(remaining: u32, max: usize) -> usize {
    (remaining as usize).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_receive_buffer() {
        assert_eq!(receive_buffer(&[]), EMPTY_SENTINEL);
        assert_eq!(receive_buffer(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_digest_chaining_matches_one_pass() {
        let data: std::vec::Vec<u8> = (0..10_000u32).map(|i| (i * 7) as u8).collect();
        let mut digest = CRC32.digest();
        for chunk in data.chunks(CRC_CHUNK) {
            digest.update(chunk);
        }
        assert_eq!(digest.finalize(), checksum(&data));
    }

    #[test]
    fn test_chunk_len() {
        assert_eq!(chunk_len(10, 4096), 10);
        assert_eq!(chunk_len(10_000, 4096), 4096);
    }
}
