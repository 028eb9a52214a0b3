//! Command and response codes
//!
//! Values are shared with the host tools and must not change.

/// Command opcodes (the byte that terminates a frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Liveness check, answers `PONG`
    Ping = 0x01,
    /// Bootloader version/info text
    Info = 0x03,
    /// Unique device serial
    Id = 0x04,
    /// Clear receive and transmit buffers
    Reset = 0x05,
    /// Erase one internal flash page
    ErasePage = 0x06,
    /// Erase and program one internal flash page
    WritePage = 0x07,
    /// Erase one external flash block
    XEraseBlock = 0x08,
    /// Program one external flash page
    XWritePage = 0x09,
    /// CRC of the receive buffer
    CrcRx = 0x10,
    /// Read an internal flash range
    ReadRange = 0x11,
    /// Read an external flash range
    XReadRange = 0x12,
    /// Write one attribute slot
    SetAttr = 0x13,
    /// Read one attribute slot
    GetAttr = 0x14,
    /// CRC of an internal flash range
    CrcInternal = 0x15,
    /// CRC of an external flash range
    CrcExternal = 0x16,
    /// Erase one external flash page
    XErasePage = 0x17,
    /// Switch external flash to power-of-two pages
    XInit = 0x18,
    /// Route a clock to a pin for measurement; does not return
    ClockOut = 0x19,
    /// Erase and program the user configuration page
    WriteUser = 0x20,
}

impl Command {
    /// Decode an opcode byte
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::Ping,
            0x03 => Self::Info,
            0x04 => Self::Id,
            0x05 => Self::Reset,
            0x06 => Self::ErasePage,
            0x07 => Self::WritePage,
            0x08 => Self::XEraseBlock,
            0x09 => Self::XWritePage,
            0x10 => Self::CrcRx,
            0x11 => Self::ReadRange,
            0x12 => Self::XReadRange,
            0x13 => Self::SetAttr,
            0x14 => Self::GetAttr,
            0x15 => Self::CrcInternal,
            0x16 => Self::CrcExternal,
            0x17 => Self::XErasePage,
            0x18 => Self::XInit,
            0x19 => Self::ClockOut,
            0x20 => Self::WriteUser,
            _ => return None,
        })
    }

    /// Opcode byte
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::from_u8(byte).ok_or(byte)
    }
}

/// Response tags (second byte of every response frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Response {
    /// Receive buffer overflowed
    Overflow = 0x10,
    /// Answer to `PING`
    Pong = 0x11,
    /// Address out of window or misaligned
    BadAddr = 0x12,
    /// Internal flash failure
    IntError = 0x13,
    /// Payload length mismatch or invalid argument
    BadArgs = 0x14,
    /// Success with no payload
    Ok = 0x15,
    /// Unknown opcode
    Unknown = 0x16,
    /// External flash busy timeout
    XfTimeout = 0x17,
    /// External flash erase/program error
    XfEpe = 0x18,
    /// Receive buffer CRC: `[len:2][crc:4]`
    CrcRx = 0x19,
    /// Internal range data
    ReadRange = 0x20,
    /// External range data
    XReadRange = 0x21,
    /// 64-byte attribute record
    GetAttr = 0x22,
    /// Internal range CRC
    CrcInternal = 0x23,
    /// External range CRC
    CrcExternal = 0x24,
    /// Info text
    Info = 0x25,
    /// Unique device serial
    Id = 0x26,
}

impl Response {
    /// Decode a response tag
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x10 => Self::Overflow,
            0x11 => Self::Pong,
            0x12 => Self::BadAddr,
            0x13 => Self::IntError,
            0x14 => Self::BadArgs,
            0x15 => Self::Ok,
            0x16 => Self::Unknown,
            0x17 => Self::XfTimeout,
            0x18 => Self::XfEpe,
            0x19 => Self::CrcRx,
            0x20 => Self::ReadRange,
            0x21 => Self::XReadRange,
            0x22 => Self::GetAttr,
            0x23 => Self::CrcInternal,
            0x24 => Self::CrcExternal,
            0x25 => Self::Info,
            0x26 => Self::Id,
            _ => return None,
        })
    }

    /// Tag byte
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for codes that report a failure
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::Overflow
                | Self::BadAddr
                | Self::IntError
                | Self::BadArgs
                | Self::Unknown
                | Self::XfTimeout
                | Self::XfEpe
        )
    }
}

impl TryFrom<u8> for Response {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::from_u8(byte).ok_or(byte)
    }
}
