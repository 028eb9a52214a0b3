//! Command dispatch
//!
//! One handler per command. Each handler checks its argument length
//! exactly, then calls into the flash engines. Errors are turned into wire
//! codes in [`dispatch`] and nowhere else.

use core::fmt::Write as _;

use heapless::String;
use zerocopy::IntoBytes;

use crate::attr;
use crate::checksum;
use crate::config::{
    ATTR_RECORD_SIZE, ATTR_TAG_LEN, DEVICE_ID_LEN, EXTERNAL_PAGE_SIZE, INFO_LEN,
    INTERNAL_PAGE_SIZE, MAX_RESPONSE_PAYLOAD,
};
use crate::error::{Error, Result};
use crate::hal::{Board, FlashController, SpiMaster};
use crate::iflash;
use crate::protocol::{Command, Response};
use crate::xflash;

/// Start of the INFO banner; the crate version follows
pub const INFO_TEXT_PREFIX: &str = "StormLoader ";

/// Closing lines of the INFO banner
pub const INFO_TEXT_NOTICE: &str =
    "\n\nThis is free software, and you are welcome to redistribute it\n";

/// What the engine should do after a command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'s> {
    /// Stage a response with no payload
    Status(Response),
    /// Stage a response carrying `payload`
    Data(Response, &'s [u8]),
    /// Drop all buffered input and output; nothing is sent
    Reset,
    /// Stop processing; nothing is sent
    Halt,
}

/// Hardware and scratch space a handler may use
pub struct Context<'a, F: ?Sized, S: ?Sized, B: ?Sized> {
    /// Internal flash controller
    pub flash: &'a mut F,
    /// SPI master for the external flash
    pub spi: &'a mut S,
    /// Board services
    pub board: &'a mut B,
    /// Response payloads are built here
    pub scratch: &'a mut [u8],
}

/// Run the command `opcode` with the de-escaped `args`
pub fn dispatch<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    opcode: u8,
    args: &[u8],
) -> Reply<'s>
where
    F: FlashController + ?Sized,
    S: SpiMaster + ?Sized,
    B: Board + ?Sized,
{
    log::trace!("dispatch: opcode {:#04x}, {} arg bytes", opcode, args.len());

    let Some(cmd) = Command::from_u8(opcode) else {
        log::warn!("dispatch: unknown opcode {:#04x}", opcode);
        return Reply::Status(Response::Unknown);
    };

    let res = match cmd {
        Command::Ping => Ok(Reply::Status(Response::Pong)),
        Command::Info => info_handler(ctx),
        Command::Id => id_handler(ctx),
        Command::Reset => Ok(Reply::Reset),
        Command::ErasePage => erase_page_handler(ctx, args),
        Command::WritePage => write_page_handler(ctx, args),
        Command::WriteUser => write_user_handler(ctx, args),
        Command::XEraseBlock => xerase_block_handler(ctx, args),
        Command::XErasePage => xerase_page_handler(ctx, args),
        Command::XWritePage => xwrite_page_handler(ctx, args),
        Command::XInit => xflash::init_page_size(ctx.spi).map(|()| Reply::Status(Response::Ok)),
        Command::CrcRx => crc_rx_handler(ctx, args),
        Command::ReadRange => read_range_handler(ctx, args),
        Command::XReadRange => xread_range_handler(ctx, args),
        Command::CrcInternal => crc_internal_handler(ctx, args),
        Command::CrcExternal => crc_external_handler(ctx, args),
        Command::SetAttr => set_attr_handler(ctx, args),
        Command::GetAttr => get_attr_handler(ctx, args),
        Command::ClockOut => {
            log::debug!("dispatch: routing clock to diagnostic pin");
            ctx.board.route_clock_out();
            Ok(Reply::Halt)
        }
    };

    res.unwrap_or_else(|e| {
        log::debug!("dispatch: {:?} failed: {}", cmd, e);
        Reply::Status(e.response())
    })
}

// ============================================================================
// Argument parsing
// ============================================================================

fn le_u32(bytes: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::BadArgs)?;
    Ok(u32::from_le_bytes(arr))
}

fn le_u16(bytes: &[u8]) -> Result<u16> {
    let arr: [u8; 2] = bytes.try_into().map_err(|_| Error::BadArgs)?;
    Ok(u16::from_le_bytes(arr))
}

/// `addr:4` followed by exactly `data_len` bytes
fn addr_and_data(args: &[u8], data_len: usize) -> Result<(u32, &[u8])> {
    if args.len() != 4 + data_len {
        log::warn!(
            "dispatch: expected {} arg bytes, got {}",
            4 + data_len,
            args.len()
        );
        return Err(Error::BadArgs);
    }
    let (addr, data) = args.split_at(4);
    Ok((le_u32(addr)?, data))
}

/// `addr:4, len:2`
fn addr_and_len16(args: &[u8]) -> Result<(u32, usize)> {
    let (addr, len) = addr_and_data(args, 2)?;
    Ok((addr, le_u16(len)? as usize))
}

/// `addr:4, len:4`
fn addr_and_len32(args: &[u8]) -> Result<(u32, u32)> {
    let (addr, len) = addr_and_data(args, 4)?;
    Ok((addr, le_u32(len)?))
}

fn ok(res: Result<()>) -> Result<Reply<'static>> {
    res.map(|()| Reply::Status(Response::Ok))
}

// ============================================================================
// Identification
// ============================================================================

fn info_handler<'s, F, S, B>(ctx: &'s mut Context<'_, F, S, B>) -> Result<Reply<'s>>
where
    F: ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let mut text: String<{ INFO_LEN - 1 }> = String::new();
    write!(
        text,
        "{}{}{}",
        INFO_TEXT_PREFIX,
        env!("CARGO_PKG_VERSION"),
        INFO_TEXT_NOTICE
    )
        .map_err(|_| Error::ResponseTooLarge)?;

    let out = &mut ctx.scratch[..INFO_LEN];
    out.fill(0);
    out[0] = text.len() as u8;
    out[1..=text.len()].copy_from_slice(text.as_bytes());
    Ok(Reply::Data(Response::Info, out))
}

fn id_handler<'s, F, S, B>(ctx: &'s mut Context<'_, F, S, B>) -> Result<Reply<'s>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let id = ctx.flash.unique_id();
    let out = &mut ctx.scratch[..DEVICE_ID_LEN];
    out.copy_from_slice(&id);
    Ok(Reply::Data(Response::Id, out))
}

// ============================================================================
// Internal flash
// ============================================================================

fn erase_page_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let (addr, _) = addr_and_data(args, 0)?;
    ok(iflash::erase_page(ctx.flash, addr))
}

fn write_page_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let (addr, data) = addr_and_data(args, INTERNAL_PAGE_SIZE)?;
    ok(iflash::program_page(ctx.flash, addr, data))
}

fn write_user_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    if args.len() != 8 {
        return Err(Error::BadArgs);
    }
    let words = [le_u32(&args[..4])?, le_u32(&args[4..])?];
    ok(iflash::program_user_page(ctx.flash, words))
}

fn read_range_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let (addr, len) = addr_and_len16(args)?;
    if len > MAX_RESPONSE_PAYLOAD {
        return Err(Error::BadArgs);
    }
    let out = &mut ctx.scratch[..len];
    iflash::read(ctx.flash, addr, out)?;
    Ok(Reply::Data(Response::ReadRange, out))
}

fn crc_internal_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: FlashController + ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let (addr, len) = addr_and_len32(args)?;
    let crc = checksum::internal_range(ctx.flash, addr, len, ctx.scratch)?;
    let out = &mut ctx.scratch[..4];
    out.copy_from_slice(&crc.to_le_bytes());
    Ok(Reply::Data(Response::CrcInternal, out))
}

// ============================================================================
// External flash
// ============================================================================

fn xerase_block_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let (addr, _) = addr_and_data(args, 0)?;
    ok(xflash::erase_block(ctx.spi, addr))
}

fn xerase_page_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let (addr, _) = addr_and_data(args, 0)?;
    ok(xflash::erase_page(ctx.spi, addr))
}

fn xwrite_page_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let (addr, data) = addr_and_data(args, EXTERNAL_PAGE_SIZE)?;
    ok(xflash::program_page(ctx.spi, addr, data))
}

fn xread_range_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let (addr, len) = addr_and_len16(args)?;
    if len > MAX_RESPONSE_PAYLOAD {
        return Err(Error::BadArgs);
    }
    let out = &mut ctx.scratch[..len];
    xflash::read(ctx.spi, addr, out)?;
    Ok(Reply::Data(Response::XReadRange, out))
}

fn crc_external_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let (addr, len) = addr_and_len32(args)?;
    let crc = checksum::external_range(ctx.spi, addr, len, ctx.scratch)?;
    let out = &mut ctx.scratch[..4];
    out.copy_from_slice(&crc.to_le_bytes());
    Ok(Reply::Data(Response::CrcExternal, out))
}

// ============================================================================
// Receive buffer CRC
// ============================================================================

/// Hashes the arguments of this very frame, which are the receive buffer
fn crc_rx_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: ?Sized,
    S: ?Sized,
    B: ?Sized,
{
    let crc = checksum::receive_buffer(args);
    let len = u16::try_from(args.len()).map_err(|_| Error::BadArgs)?;
    let out = &mut ctx.scratch[..6];
    out[..2].copy_from_slice(&len.to_le_bytes());
    out[2..].copy_from_slice(&crc.to_le_bytes());
    Ok(Reply::Data(Response::CrcRx, out))
}

// ============================================================================
// Attributes
// ============================================================================

fn set_attr_handler<F, S, B>(
    ctx: &mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'static>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    const HEADER: usize = 1 + ATTR_TAG_LEN + 1;
    if args.len() < HEADER {
        return Err(Error::BadArgs);
    }
    let slot = args[0];
    let tag: [u8; ATTR_TAG_LEN] = args[1..=ATTR_TAG_LEN]
        .try_into()
        .map_err(|_| Error::BadArgs)?;
    let vlen = args[HEADER - 1] as usize;
    if args.len() != HEADER + vlen {
        log::warn!(
            "dispatch: attribute value length {} does not match frame ({} bytes)",
            vlen,
            args.len()
        );
        return Err(Error::BadArgs);
    }
    ok(attr::set_attribute(ctx.spi, slot, tag, &args[HEADER..]))
}

fn get_attr_handler<'s, F, S, B>(
    ctx: &'s mut Context<'_, F, S, B>,
    args: &[u8],
) -> Result<Reply<'s>>
where
    F: ?Sized,
    S: SpiMaster + ?Sized,
    B: ?Sized,
{
    let [slot] = args else {
        return Err(Error::BadArgs);
    };
    let record = attr::get_attribute(ctx.spi, *slot)?;
    let out = &mut ctx.scratch[..ATTR_RECORD_SIZE];
    out.copy_from_slice(record.as_bytes());
    Ok(Reply::Data(Response::GetAttr, out))
}
