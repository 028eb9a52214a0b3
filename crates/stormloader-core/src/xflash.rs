//! External flash engine
//!
//! Command sequences for the SPI DataFlash. Erase and program are followed
//! by a bounded busy-poll that ends in one of three ways:
//!
//! - ready: `Ok(())`
//! - erase/program error bit set: [`Error::XflashProgramError`]
//! - poll budget exhausted: [`Error::XflashTimeout`]
//!
//! Reads are immediate on this device and are not polled.

use crate::config::{
    EXTERNAL_BLOCK_SIZE, EXTERNAL_PAGE_SIZE, XFLASH_POLL_DELAY_US, XFLASH_POLL_LIMIT,
};
use crate::error::{Error, Result};
use crate::hal::SpiMaster;
use crate::spi::{opcodes, SpiCommand, Status1, Status2};
use crate::validate::{EXTERNAL_READ_WINDOW, EXTERNAL_WINDOW};

/// Read both status register bytes
pub fn read_status<M: SpiMaster + ?Sized>(master: &mut M) -> Result<(Status1, Status2)> {
    let mut buf = [0u8; 2];
    let mut cmd = SpiCommand::read_reg(opcodes::RDSR, &mut buf);
    master.execute(&mut cmd)?;
    Ok((
        Status1::from_bits_retain(buf[0]),
        Status2::from_bits_retain(buf[1]),
    ))
}

/// Poll the status register until the device is ready
///
/// The error bit is checked before the ready bit, so a failed operation is
/// reported as such even though the device is idle again.
pub fn wait_ready<M: SpiMaster + ?Sized>(master: &mut M, max_polls: u32) -> Result<()> {
    for _ in 0..max_polls {
        let (_, status) = read_status(master)?;
        if status.contains(Status2::EPE) {
            log::error!("xflash: erase/program error (status {:#04x})", status.bits());
            return Err(Error::XflashProgramError);
        }
        if status.contains(Status2::RDY) {
            return Ok(());
        }
        master.delay_us(XFLASH_POLL_DELAY_US);
    }

    log::error!("xflash: still busy after {} polls", max_polls);
    Err(Error::XflashTimeout)
}

/// Software reset, aborting any operation in progress
pub fn software_reset<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    let mut cmd = SpiCommand::write_reg(opcodes::RESET, &opcodes::RESET_SEQ);
    master.execute(&mut cmd)
}

/// Switch the device to 256-byte (power-of-two) pages
///
/// A one-time configuration; harmless to repeat.
pub fn init_page_size<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    log::debug!("xflash: selecting power-of-two page size");
    let mut cmd = SpiCommand::write_reg(opcodes::CONFIGURE, &opcodes::POWER_OF_TWO_SEQ);
    master.execute(&mut cmd)
}

/// Erase the block starting at `addr`
pub fn erase_block<M: SpiMaster + ?Sized>(master: &mut M, addr: u32) -> Result<()> {
    EXTERNAL_WINDOW.check(addr, EXTERNAL_BLOCK_SIZE, EXTERNAL_BLOCK_SIZE)?;
    log::debug!("xflash: erase block {:#08x}", addr);

    let mut cmd = SpiCommand::erase(opcodes::BE, addr);
    master.execute(&mut cmd)?;
    wait_ready(master, XFLASH_POLL_LIMIT)
}

/// Erase the page starting at `addr`
pub fn erase_page<M: SpiMaster + ?Sized>(master: &mut M, addr: u32) -> Result<()> {
    let page = EXTERNAL_PAGE_SIZE as u32;
    EXTERNAL_WINDOW.check(addr, page, page)?;
    log::debug!("xflash: erase page {:#08x}", addr);

    let mut cmd = SpiCommand::erase(opcodes::PE, addr);
    master.execute(&mut cmd)?;
    wait_ready(master, XFLASH_POLL_LIMIT)
}

/// Program one full page at `addr`
///
/// Goes through the device buffer with built-in erase, so the page does
/// not need to be erased first.
pub fn program_page<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, data: &[u8]) -> Result<()> {
    if data.len() != EXTERNAL_PAGE_SIZE {
        return Err(Error::BadArgs);
    }
    let page = EXTERNAL_PAGE_SIZE as u32;
    EXTERNAL_WINDOW.check(addr, page, page)?;
    log::debug!("xflash: program page {:#08x}", addr);

    let mut cmd = SpiCommand::write(opcodes::PP_BUF1, addr, data);
    master.execute(&mut cmd)?;
    wait_ready(master, XFLASH_POLL_LIMIT)
}

/// Read `buf.len()` bytes starting at `addr`
pub fn read<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, buf: &mut [u8]) -> Result<()> {
    let len = u32::try_from(buf.len()).map_err(|_| Error::BadArgs)?;
    EXTERNAL_READ_WINDOW.check(addr, len, 1)?;

    let mut cmd = SpiCommand::read(opcodes::READ_HF, addr, opcodes::READ_HF_DUMMY, buf);
    master.execute(&mut cmd)
}

/// Rewrite `data` in place at `addr`, leaving the rest of the page intact
///
/// Used for records below the protected floor, so only the device bounds
/// are checked here.
pub(crate) fn read_modify_write<M: SpiMaster + ?Sized>(
    master: &mut M,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::BadArgs)?;
    EXTERNAL_READ_WINDOW.check(addr, len, 1)?;

    let mut cmd = SpiCommand::write(opcodes::RMW_BUF1, addr, data);
    master.execute(&mut cmd)?;
    wait_ready(master, XFLASH_POLL_LIMIT)
}
