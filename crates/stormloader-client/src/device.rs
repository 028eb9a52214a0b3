//! Bootloader client
//!
//! This module provides the [`Client`] struct that drives a stormloader
//! device over any [`Transport`].

use stormloader_core::checksum;
use stormloader_core::config::{
    ATTR_RECORD_SIZE, DEVICE_ID_LEN, ESCAPE, EXTERNAL_BLOCK_SIZE, EXTERNAL_PAGE_SIZE,
    INTERNAL_PAGE_SIZE,
};
use stormloader_core::protocol::{Command, Response};

use crate::error::{ClientError, Result};
use crate::protocol::*;
use crate::transport::Transport;

/// Largest range requested per RRANGE/XRRANGE
pub const READ_CHUNK: usize = 1024;

/// Ping attempts made by [`Client::connect`]
pub const PING_ATTEMPTS: u32 = 30;

/// Wait for each ping answer
const PING_TIMEOUT_MS: u32 = 500;

/// Quiet time that ends a drain of stale input
const DRAIN_TIMEOUT_MS: u32 = 1;

/// Connection to a stormloader device
pub struct Client<T: Transport> {
    transport: T,
}

impl<T: Transport> Client<T> {
    /// Wrap a transport without talking to the device
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Wrap a transport and wait until the bootloader answers a ping
    pub fn connect(transport: T) -> Result<Self> {
        let mut client = Self::new(transport);
        client.wait_for_bootloader(PING_ATTEMPTS)?;
        Ok(client)
    }

    /// Reset the board into the bootloader and wait for it to answer
    pub fn enter_bootloader(&mut self) -> Result<()> {
        self.transport.enter_bootloader()?;
        self.wait_for_bootloader(PING_ATTEMPTS)
    }

    /// Reset the board into the application
    pub fn exit_bootloader(&mut self) -> Result<()> {
        self.transport.exit_bootloader()
    }

    /// Ping until PONG comes back, at most `attempts` times
    pub fn wait_for_bootloader(&mut self, attempts: u32) -> Result<()> {
        let ping = encode_frame(Command::Ping, &[]);
        for attempt in 1..=attempts {
            self.transport.write(&ping)?;
            let mut buf = [0u8; 2];
            let n = self.read_with_timeout(&mut buf, PING_TIMEOUT_MS)?;
            if n == 2 && buf == [ESCAPE, Response::Pong.code()] {
                log::debug!("stormloader: pong after {} attempt(s)", attempt);
                return Ok(());
            }
            log::trace!("stormloader: ping attempt {} got {:02x?}", attempt, &buf[..n]);
        }
        Err(ClientError::NoPong(attempts))
    }

    /// Read until `buf` is full or no byte arrives for `timeout_ms`
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.transport.read_nonblock(&mut buf[filled..], timeout_ms)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Throw away bytes left over from an earlier exchange, such as an
    /// OVERFLOW notice nobody read
    fn drain(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 64];
        let mut dropped = 0;
        loop {
            let n = self.transport.read_nonblock(&mut scratch, DRAIN_TIMEOUT_MS)?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            log::debug!("stormloader: dropped {} stale byte(s)", dropped);
        }
        Ok(dropped)
    }

    /// Send one command and read its response
    ///
    /// Stale input is drained and a sync sequence is sent first, so
    /// leftovers from an earlier, interrupted exchange cannot corrupt this
    /// frame.
    fn command(
        &mut self,
        cmd: Command,
        args: &[u8],
        expect: Response,
        payload_len: usize,
    ) -> Result<Vec<u8>> {
        log::trace!("stormloader: {:?} with {} arg bytes", cmd, args.len());
        self.drain()?;
        self.transport.write(&SYNC)?;
        self.transport.write(&encode_frame(cmd, args))?;
        self.transport.flush()?;

        let mut header = [0u8; 2];
        self.transport.read(&mut header)?;
        if header[0] != ESCAPE {
            return Err(ClientError::Malformed(format!(
                "response starts with 0x{:02X}",
                header[0]
            )));
        }
        if header[1] != expect.code() {
            return Err(match Response::from_u8(header[1]) {
                Some(resp) => ClientError::from_device(cmd, resp).unwrap_or(
                    ClientError::UnexpectedResponse {
                        command: cmd,
                        response: header[1],
                    },
                ),
                None => ClientError::UnexpectedResponse {
                    command: cmd,
                    response: header[1],
                },
            });
        }

        let mut decoder = PayloadDecoder::new(payload_len);
        let mut raw = vec![0u8; payload_len];
        while !decoder.is_complete() {
            let chunk = &mut raw[..decoder.remaining()];
            self.transport.read(chunk)?;
            for &b in chunk.iter() {
                decoder.push(b)?;
            }
        }
        Ok(decoder.into_inner())
    }

    fn command_ok(&mut self, cmd: Command, args: &[u8]) -> Result<()> {
        self.command(cmd, args, Response::Ok, 0).map(|_| ())
    }

    fn command_u32(&mut self, cmd: Command, args: &[u8], expect: Response) -> Result<u32> {
        let payload = self.command(cmd, args, expect, CRC_PAYLOAD_LEN)?;
        let bytes: [u8; 4] = payload
            .try_into()
            .map_err(|_| ClientError::Malformed("short CRC payload".into()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    // ========================================================================
    // Identification and control
    // ========================================================================

    /// Single ping
    pub fn ping(&mut self) -> Result<()> {
        self.command(Command::Ping, &[], Response::Pong, 0).map(|_| ())
    }

    /// Bootloader version text
    pub fn info(&mut self) -> Result<String> {
        let payload = self.command(Command::Info, &[], Response::Info, INFO_PAYLOAD_LEN)?;
        parse_info(&payload)
    }

    /// Unique serial number of the chip
    pub fn device_id(&mut self) -> Result<[u8; DEVICE_ID_LEN]> {
        let payload = self.command(Command::Id, &[], Response::Id, DEVICE_ID_LEN)?;
        payload
            .try_into()
            .map_err(|_| ClientError::Malformed("short ID payload".into()))
    }

    /// Send `data` and have the device hash it as received
    ///
    /// Returns the length and CRC the device saw. Useful for checking the
    /// link's escaping end to end.
    pub fn crc_rx(&mut self, data: &[u8]) -> Result<(u16, u32)> {
        let payload = self.command(Command::CrcRx, data, Response::CrcRx, CRC_RX_PAYLOAD_LEN)?;
        let len = u16::from_le_bytes([payload[0], payload[1]]);
        let crc = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]);
        Ok((len, crc))
    }

    /// Route the diagnostic clock out; the bootloader stops responding
    pub fn clock_out(&mut self) -> Result<()> {
        self.transport.write(&SYNC)?;
        self.transport.write(&encode_frame(Command::ClockOut, &[]))?;
        self.transport.flush()
    }

    // ========================================================================
    // Internal flash
    // ========================================================================

    /// Erase one internal flash page
    pub fn erase_page(&mut self, addr: u32) -> Result<()> {
        self.command_ok(Command::ErasePage, &addr_args(addr))
    }

    /// Erase and program one internal flash page
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if data.len() != INTERNAL_PAGE_SIZE {
            return Err(ClientError::InvalidParameter(format!(
                "page data must be {} bytes, got {}",
                INTERNAL_PAGE_SIZE,
                data.len()
            )));
        }
        self.command_ok(Command::WritePage, &addr_data_args(addr, data))
    }

    /// Program the two user page words
    pub fn write_user_page(&mut self, word0: u32, word1: u32) -> Result<()> {
        let mut args = word0.to_le_bytes().to_vec();
        args.extend(word1.to_le_bytes());
        self.command_ok(Command::WriteUser, &args)
    }

    /// Read up to [`READ_CHUNK`] bytes of internal flash
    pub fn read_range(&mut self, addr: u32, len: u16) -> Result<Vec<u8>> {
        self.command(
            Command::ReadRange,
            &range16_args(addr, len),
            Response::ReadRange,
            len as usize,
        )
    }

    /// CRC-32 of an internal flash range
    pub fn crc_internal(&mut self, addr: u32, len: u32) -> Result<u32> {
        self.command_u32(
            Command::CrcInternal,
            &range32_args(addr, len),
            Response::CrcInternal,
        )
    }

    /// Write an image to internal flash and verify it
    ///
    /// The image is padded with 0xFF to whole pages. `progress` is called
    /// with the number of bytes written so far. Returns the verified CRC.
    pub fn flash_image<P>(&mut self, addr: u32, image: &[u8], mut progress: P) -> Result<u32>
    where
        P: FnMut(usize),
    {
        let padded = pad_to_pages(image, INTERNAL_PAGE_SIZE);
        for (i, page) in padded.chunks(INTERNAL_PAGE_SIZE).enumerate() {
            let offset = i * INTERNAL_PAGE_SIZE;
            self.write_page(addr + offset as u32, page)?;
            progress(offset + page.len());
        }
        self.verify_internal(addr, &padded)
    }

    /// Compare the device's CRC of `[addr, addr + data.len())` with `data`
    pub fn verify_internal(&mut self, addr: u32, data: &[u8]) -> Result<u32> {
        let expected = checksum::checksum(data);
        let actual = self.crc_internal(addr, len_u32(data)?)?;
        check_crc(expected, actual)
    }

    /// Read any length of internal flash in chunks
    pub fn read_internal<P>(&mut self, addr: u32, len: usize, progress: P) -> Result<Vec<u8>>
    where
        P: FnMut(usize),
    {
        self.read_chunked(addr, len, progress, |c, a, n| c.read_range(a, n))
    }

    // ========================================================================
    // External flash
    // ========================================================================

    /// Re-send the page size configuration to the DataFlash
    pub fn xflash_init(&mut self) -> Result<()> {
        self.command_ok(Command::XInit, &[])
    }

    /// Erase one 2 KiB external block
    pub fn xerase_block(&mut self, addr: u32) -> Result<()> {
        self.command_ok(Command::XEraseBlock, &addr_args(addr))
    }

    /// Erase one 256-byte external page
    pub fn xerase_page(&mut self, addr: u32) -> Result<()> {
        self.command_ok(Command::XErasePage, &addr_args(addr))
    }

    /// Erase every block overlapping `[addr, addr + len)`
    ///
    /// `addr` must be block aligned.
    pub fn xerase_range<P>(&mut self, addr: u32, len: u32, mut progress: P) -> Result<()>
    where
        P: FnMut(usize),
    {
        let blocks = len.div_ceil(EXTERNAL_BLOCK_SIZE);
        for i in 0..blocks {
            self.xerase_block(addr + i * EXTERNAL_BLOCK_SIZE)?;
            progress(((i + 1) * EXTERNAL_BLOCK_SIZE).min(len) as usize);
        }
        Ok(())
    }

    /// Program one external page
    pub fn xwrite_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if data.len() != EXTERNAL_PAGE_SIZE {
            return Err(ClientError::InvalidParameter(format!(
                "external page data must be {} bytes, got {}",
                EXTERNAL_PAGE_SIZE,
                data.len()
            )));
        }
        self.command_ok(Command::XWritePage, &addr_data_args(addr, data))
    }

    /// Read up to [`READ_CHUNK`] bytes of external flash
    pub fn xread_range(&mut self, addr: u32, len: u16) -> Result<Vec<u8>> {
        self.command(
            Command::XReadRange,
            &range16_args(addr, len),
            Response::XReadRange,
            len as usize,
        )
    }

    /// CRC-32 of an external flash range
    pub fn crc_external(&mut self, addr: u32, len: u32) -> Result<u32> {
        self.command_u32(
            Command::CrcExternal,
            &range32_args(addr, len),
            Response::CrcExternal,
        )
    }

    /// Write an image to external flash and verify it
    ///
    /// Padded with 0xFF to whole 256-byte pages.
    pub fn xflash_image<P>(&mut self, addr: u32, image: &[u8], mut progress: P) -> Result<u32>
    where
        P: FnMut(usize),
    {
        let padded = pad_to_pages(image, EXTERNAL_PAGE_SIZE);
        for (i, page) in padded.chunks(EXTERNAL_PAGE_SIZE).enumerate() {
            let offset = i * EXTERNAL_PAGE_SIZE;
            self.xwrite_page(addr + offset as u32, page)?;
            progress(offset + page.len());
        }
        let expected = checksum::checksum(&padded);
        let actual = self.crc_external(addr, len_u32(&padded)?)?;
        check_crc(expected, actual)
    }

    /// Read any length of external flash in chunks
    pub fn read_external<P>(&mut self, addr: u32, len: usize, progress: P) -> Result<Vec<u8>>
    where
        P: FnMut(usize),
    {
        self.read_chunked(addr, len, progress, |c, a, n| c.xread_range(a, n))
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Store an attribute
    pub fn set_attribute(&mut self, slot: u8, tag: &[u8], value: &[u8]) -> Result<()> {
        let args = set_attr_args(slot, tag, value)?;
        self.command_ok(Command::SetAttr, &args)
    }

    /// Read an attribute; `None` if the slot is erased
    pub fn get_attribute(&mut self, slot: u8) -> Result<Option<Attribute>> {
        let record = self.command(Command::GetAttr, &[slot], Response::GetAttr, ATTR_RECORD_SIZE)?;
        Attribute::parse(&record)
    }

    fn read_chunked<P, R>(
        &mut self,
        addr: u32,
        len: usize,
        mut progress: P,
        mut read: R,
    ) -> Result<Vec<u8>>
    where
        P: FnMut(usize),
        R: FnMut(&mut Self, u32, u16) -> Result<Vec<u8>>,
    {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let n = (len - out.len()).min(READ_CHUNK);
            let chunk_addr = addr + out.len() as u32;
            out.extend(read(self, chunk_addr, n as u16)?);
            progress(out.len());
        }
        Ok(out)
    }
}

fn len_u32(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len())
        .map_err(|_| ClientError::InvalidParameter("image larger than 4 GiB".into()))
}

fn check_crc(expected: u32, actual: u32) -> Result<u32> {
    if expected != actual {
        log::error!(
            "stormloader: verify failed: expected 0x{:08X}, got 0x{:08X}",
            expected,
            actual
        );
        return Err(ClientError::VerifyFailed { expected, actual });
    }
    Ok(actual)
}
