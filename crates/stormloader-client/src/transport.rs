//! Transport layer abstraction
//!
//! The bootloader is reached over a serial port on real hardware, or over
//! TCP when talking to the `serve` simulator.

use crate::error::Result;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    ///
    /// Returns [`ClientError::Timeout`](crate::ClientError::Timeout) if the
    /// bytes do not arrive in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`
    ///
    /// Returns the number of bytes read, or 0 on timeout.
    fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()>;

    /// Reset the board into the bootloader
    ///
    /// Only meaningful for transports with modem control lines.
    fn enter_bootloader(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reset the board into the application
    fn exit_bootloader(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "serial")]
pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use crate::error::ClientError;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};
    use std::thread;
    use std::time::Duration;

    /// Default baud rate of the bootloader UART
    pub const DEFAULT_BAUD: u32 = 115_200;

    /// Serial port transport
    ///
    /// DTR drives the board reset line and RTS the bootloader select line.
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port, 8N1 without flow control
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(500))
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self { port })
        }

        /// Set the read timeout
        pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port.set_timeout(timeout)?;
            Ok(())
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.port.write_all(data)?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.port.read_exact(buf)?;
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
            let old_timeout = self.port.timeout();
            self.port
                .set_timeout(Duration::from_millis(timeout_ms as u64))?;

            let result = match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(ClientError::from(e)),
            };

            self.port.set_timeout(old_timeout)?;
            result
        }

        fn flush(&mut self) -> Result<()> {
            self.port.flush()?;
            Ok(())
        }

        fn enter_bootloader(&mut self) -> Result<()> {
            log::debug!("Resetting board into bootloader");
            self.port.write_data_terminal_ready(true)?;
            self.port.write_request_to_send(true)?;
            thread::sleep(Duration::from_millis(100));
            self.port.write_data_terminal_ready(false)?;
            // select must be held while the bootloader samples it
            thread::sleep(Duration::from_millis(500));
            self.port.write_request_to_send(false)?;
            Ok(())
        }

        fn exit_bootloader(&mut self) -> Result<()> {
            log::debug!("Resetting board into application");
            self.port.write_data_terminal_ready(true)?;
            self.port.write_request_to_send(false)?;
            thread::sleep(Duration::from_millis(100));
            self.port.write_data_terminal_ready(false)?;
            Ok(())
        }
    }
}

pub mod tcp {
    //! TCP socket transport implementation

    use super::*;
    use crate::error::ClientError;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// TCP socket transport
    pub struct TcpTransport {
        stream: TcpStream,
    }

    impl TcpTransport {
        /// Connect to a bootloader simulator at `host:port`
        pub fn connect(host: &str, port: u16) -> Result<Self> {
            let addr = format!("{}:{}", host, port);
            log::info!("Connecting to bootloader at {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

            stream.set_nodelay(true).map_err(|e| {
                ClientError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
            stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).map_err(|e| {
                ClientError::ConnectionFailed(format!("Failed to set read timeout: {}", e))
            })?;
            stream.set_write_timeout(Some(DEFAULT_TIMEOUT)).map_err(|e| {
                ClientError::ConnectionFailed(format!("Failed to set write timeout: {}", e))
            })?;

            log::info!("Connected to bootloader at {}", addr);

            Ok(Self { stream })
        }
    }

    impl Transport for TcpTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.stream.write_all(data)?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.stream.read_exact(buf)?;
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
            self.stream
                .set_read_timeout(Some(Duration::from_millis(timeout_ms.max(1) as u64)))?;

            let result = match self.stream.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(ClientError::from(e)),
            };

            self.stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
            result
        }

        fn flush(&mut self) -> Result<()> {
            self.stream.flush()?;
            Ok(())
        }
    }
}
