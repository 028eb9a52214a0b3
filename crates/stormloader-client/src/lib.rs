//! stormloader-client - Host side of the stormloader protocol
//!
//! Talks to the bootloader over a serial port (real hardware) or TCP (the
//! `serve` simulator). Every request is preceded by a sync sequence so a
//! half-sent frame from an earlier run cannot corrupt it.
//!
//! # Example
//!
//! ```no_run
//! use stormloader_client::{Client, SerialTransport};
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", None)?;
//! let mut client = Client::connect(transport)?;
//! println!("{}", client.info()?);
//!
//! let image = std::fs::read("app.bin")?;
//! client.flash_image(0x30000, &image, |_| {})?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;

pub use device::Client;
pub use error::{ClientError, Result};
pub use protocol::Attribute;
#[cfg(feature = "serial")]
pub use transport::serial::SerialTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
