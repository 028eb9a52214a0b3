//! Host side of the wire format
//!
//! Requests are `escape(args) ++ [ESCAPE, opcode]`. Responses carry no
//! terminator, so the host must know how many payload bytes each response
//! tag carries and decode exactly that many.

use stormloader_core::config::{ATTR_MAX_VALUE, ATTR_RECORD_SIZE, ATTR_TAG_LEN, ESCAPE};
use stormloader_core::protocol::{escape, Command, Step, Unescaper};

use crate::error::{ClientError, Result};

/// Sent before every command: a throwaway byte followed by RESET, which
/// empties the device's buffers without producing a response
pub const SYNC: [u8; 3] = [0x00, ESCAPE, Command::Reset.code()];

/// Payload length of an INFO response
pub const INFO_PAYLOAD_LEN: usize = stormloader_core::config::INFO_LEN;
/// Payload length of a CRCRX response
pub const CRC_RX_PAYLOAD_LEN: usize = 6;
/// Payload length of CRCIF/CRCXF responses
pub const CRC_PAYLOAD_LEN: usize = 4;

/// Encode a request frame
pub fn encode_frame(cmd: Command, args: &[u8]) -> Vec<u8> {
    let mut frame: Vec<u8> = escape(args).collect();
    frame.extend([ESCAPE, cmd.code()]);
    frame
}

/// `addr:4`
pub fn addr_args(addr: u32) -> Vec<u8> {
    addr.to_le_bytes().to_vec()
}

/// `addr:4, data`
pub fn addr_data_args(addr: u32, data: &[u8]) -> Vec<u8> {
    let mut args = Vec::with_capacity(4 + data.len());
    args.extend(addr.to_le_bytes());
    args.extend_from_slice(data);
    args
}

/// `addr:4, len:2`
pub fn range16_args(addr: u32, len: u16) -> Vec<u8> {
    addr_data_args(addr, &len.to_le_bytes())
}

/// `addr:4, len:4`
pub fn range32_args(addr: u32, len: u32) -> Vec<u8> {
    addr_data_args(addr, &len.to_le_bytes())
}

/// `slot:1, tag:8, vlen:1, value`
pub fn set_attr_args(slot: u8, tag: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    if tag.len() > ATTR_TAG_LEN {
        return Err(ClientError::InvalidParameter(format!(
            "attribute tag longer than {} bytes",
            ATTR_TAG_LEN
        )));
    }
    if value.len() > ATTR_MAX_VALUE {
        return Err(ClientError::InvalidParameter(format!(
            "attribute value longer than {} bytes",
            ATTR_MAX_VALUE
        )));
    }
    let mut args = Vec::with_capacity(1 + ATTR_TAG_LEN + 1 + value.len());
    args.push(slot);
    args.extend_from_slice(tag);
    args.resize(1 + ATTR_TAG_LEN, 0);
    args.push(value.len() as u8);
    args.extend_from_slice(value);
    Ok(args)
}

/// Collects exactly `want` de-escaped payload bytes
#[derive(Debug)]
pub struct PayloadDecoder {
    unescaper: Unescaper,
    data: Vec<u8>,
    want: usize,
}

impl PayloadDecoder {
    /// Expect `want` payload bytes
    pub fn new(want: usize) -> Self {
        Self {
            unescaper: Unescaper::new(),
            data: Vec::with_capacity(want),
            want,
        }
    }

    /// Payload bytes still missing
    ///
    /// Every raw byte yields at most one payload byte, so reading this many
    /// raw bytes never consumes past the end of the response.
    pub fn remaining(&self) -> usize {
        self.want - self.data.len()
    }

    /// True once all payload bytes arrived
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Feed one raw byte
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.is_complete() {
            return Err(ClientError::Malformed("payload longer than expected".into()));
        }
        match self.unescaper.push(byte) {
            Step::Data(b) => self.data.push(b),
            Step::Escape => {}
            Step::Terminator(t) => {
                return Err(ClientError::Malformed(format!(
                    "unescaped sentinel followed by 0x{:02X} in payload",
                    t
                )))
            }
        }
        Ok(())
    }

    /// The decoded payload
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// One attribute slot as read back from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Tag with trailing zero padding removed
    pub tag: Vec<u8>,
    /// Value bytes
    pub value: Vec<u8>,
}

impl Attribute {
    /// Parse a 64-byte record
    ///
    /// Returns `None` for an erased slot.
    pub fn parse(record: &[u8]) -> Result<Option<Self>> {
        if record.len() != ATTR_RECORD_SIZE {
            return Err(ClientError::Malformed(format!(
                "attribute record is {} bytes",
                record.len()
            )));
        }
        if record.iter().all(|&b| b == 0xFF) {
            return Ok(None);
        }
        let tag = &record[..ATTR_TAG_LEN];
        let tag_len = tag.iter().position(|&b| b == 0).unwrap_or(ATTR_TAG_LEN);
        let len = (record[ATTR_TAG_LEN] as usize).min(ATTR_MAX_VALUE);
        let value_start = ATTR_TAG_LEN + 1;
        Ok(Some(Self {
            tag: tag[..tag_len].to_vec(),
            value: record[value_start..value_start + len].to_vec(),
        }))
    }

    /// Tag as text, lossily
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// Extract the text of an INFO payload
pub fn parse_info(payload: &[u8]) -> Result<String> {
    let len = *payload
        .first()
        .ok_or_else(|| ClientError::Malformed("empty info payload".into()))? as usize;
    let text = payload
        .get(1..=len)
        .ok_or_else(|| ClientError::Malformed(format!("info length {} too large", len)))?;
    Ok(String::from_utf8_lossy(text).into_owned())
}

/// Pad `data` with 0xFF up to a multiple of `page`
pub fn pad_to_pages(data: &[u8], page: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    let rem = out.len() % page;
    if rem != 0 {
        out.resize(out.len() + page - rem, 0xFF);
    }
    out
}
