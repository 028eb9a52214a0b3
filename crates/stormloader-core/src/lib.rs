//! stormloader-core - Serial bootloader protocol engine
//!
//! This crate implements the device side of the StormLoader serial
//! bootloader protocol. It is `no_std` and talks to hardware only through
//! the traits in [`hal`], so the same engine runs on the target and against
//! the in-memory emulators used for testing.
//!
//! # Layers
//!
//! - [`protocol`] - wire codes and the escape-based framing state machine
//! - [`validate`] - address window checks for every address-taking command
//! - [`iflash`] - internal flash page erase/program sequences
//! - [`xflash`] - external SPI DataFlash erase/program/read with busy polling
//! - [`attr`] - fixed-slot attribute table stored in external flash
//! - [`checksum`] - CRC-32 over buffers and flash ranges
//! - [`dispatch`] - opcode to handler mapping
//! - [`engine`] - the [`Bootloader`] object that owns the buffers and polls
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use stormloader_core::Bootloader;
//!
//! let mut bl = Bootloader::new(uart, flash, dataflash, board);
//! bl.init()?;
//! loop {
//!     bl.poll()?;
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod attr;
pub mod checksum;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hal;
pub mod iflash;
pub mod protocol;
pub mod spi;
pub mod validate;
pub mod xflash;

pub use engine::Bootloader;
pub use error::{Error, Result};
