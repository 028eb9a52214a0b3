//! Error types for client operations

use stormloader_core::protocol::{Command, Response};
use thiserror::Error;

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to connect to the device or server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The bootloader never answered a ping
    #[error("No pong received after {0} attempts")]
    NoPong(u32),

    /// Device dropped an oversized frame
    #[error("Device receive buffer overflowed")]
    Overflow,

    /// Device rejected the address
    #[error("{0:?}: address out of range or misaligned")]
    BadAddress(Command),

    /// Device internal flash failed
    #[error("{0:?}: internal flash error")]
    InternalError(Command),

    /// Device rejected the argument layout
    #[error("{0:?}: bad arguments")]
    BadArgs(Command),

    /// Device does not know the command
    #[error("{0:?}: unknown command")]
    UnknownCommand(Command),

    /// External flash stayed busy
    #[error("{0:?}: external flash timeout")]
    XflashTimeout(Command),

    /// External flash reported an erase/program error
    #[error("{0:?}: external flash erase/program error")]
    XflashProgramError(Command),

    /// Response tag was valid but not the one expected
    #[error("Unexpected response 0x{response:02X} to {command:?}")]
    UnexpectedResponse {
        /// Command that was sent
        command: Command,
        /// Tag that came back
        response: u8,
    },

    /// Response bytes did not form a valid frame
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Read-back CRC disagrees with the data sent
    #[error("CRC mismatch: expected 0x{expected:08X}, device reported 0x{actual:08X}")]
    VerifyFailed {
        /// Locally computed CRC
        expected: u32,
        /// CRC reported by the device
        actual: u32,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Timeout during communication
    #[error("Communication timeout")]
    Timeout,

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

impl ClientError {
    /// Map a failure code reported by the device
    ///
    /// Returns `None` for codes that do not report a failure.
    pub fn from_device(command: Command, response: Response) -> Option<Self> {
        Some(match response {
            Response::Overflow => Self::Overflow,
            Response::BadAddr => Self::BadAddress(command),
            Response::IntError => Self::InternalError(command),
            Response::BadArgs => Self::BadArgs(command),
            Response::Unknown => Self::UnknownCommand(command),
            Response::XfTimeout => Self::XflashTimeout(command),
            Response::XfEpe => Self::XflashProgramError(command),
            _ => return None,
        })
    }
}

/// Result type for client operations
pub type Result<T> = core::result::Result<T, ClientError>;

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ClientError::Timeout,
            _ => ClientError::IoError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_code_maps() {
        for code in 0x10..=0x26u8 {
            let Some(resp) = Response::from_u8(code) else {
                continue;
            };
            let mapped = ClientError::from_device(Command::Ping, resp);
            assert_eq!(mapped.is_some(), resp.is_error(), "{:?}", resp);
        }
    }
}
