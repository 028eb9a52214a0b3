//! Error types for stormloader-core
//!
//! Every variant that can end a command maps to exactly one wire response
//! code, see [`Error::response`].

use core::fmt;

use crate::protocol::Response;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Request errors
    /// Payload length does not match the command's contract
    BadArgs,
    /// Address outside the allowed window or misaligned
    BadAddress,
    /// Opcode is not a known command
    UnknownCommand,

    // Device errors
    /// Internal flash controller reported an erase/program failure
    InternalFlash,
    /// External flash stayed busy for the whole poll budget
    XflashTimeout,
    /// External flash reported an erase/program error
    XflashProgramError,
    /// SPI transfer failed at the bus level
    SpiTransferFailed,

    // Framing errors
    /// Receive buffer is full
    Overflow,
    /// Response does not fit the transmit buffer once escaped
    ResponseTooLarge,

    // Transport errors
    /// UART read or write failed
    Uart,
}

impl Error {
    /// Wire response code reported to the host for this error
    pub const fn response(self) -> Response {
        match self {
            Self::BadArgs => Response::BadArgs,
            Self::BadAddress => Response::BadAddr,
            Self::UnknownCommand => Response::Unknown,
            Self::InternalFlash => Response::IntError,
            Self::XflashTimeout => Response::XfTimeout,
            // A bus that cannot complete a transfer looks unresponsive to the host
            Self::SpiTransferFailed => Response::XfTimeout,
            Self::XflashProgramError => Response::XfEpe,
            Self::Overflow => Response::Overflow,
            Self::ResponseTooLarge | Self::Uart => Response::IntError,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadArgs => write!(f, "bad command arguments"),
            Self::BadAddress => write!(f, "address out of range or misaligned"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::InternalFlash => write!(f, "internal flash operation failed"),
            Self::XflashTimeout => write!(f, "external flash busy timeout"),
            Self::XflashProgramError => write!(f, "external flash erase/program error"),
            Self::SpiTransferFailed => write!(f, "SPI transfer failed"),
            Self::Overflow => write!(f, "receive buffer overflow"),
            Self::ResponseTooLarge => write!(f, "response does not fit transmit buffer"),
            Self::Uart => write!(f, "UART I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
