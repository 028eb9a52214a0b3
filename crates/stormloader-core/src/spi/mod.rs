//! SPI types and command structures
//!
//! This module provides the transaction type handed to
//! [`SpiMaster`](crate::hal::SpiMaster) and the DataFlash opcodes.

mod command;
pub mod opcodes;

pub use command::{SpiCommand, ADDRESS_BYTES};
pub use opcodes::*;
