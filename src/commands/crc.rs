//! CRC command implementation

use std::fs;
use std::path::Path;

use stormloader_core::checksum;

use crate::cli::{ConnectionArgs, Memory};
use crate::connection;

/// Run the crc command
///
/// With `file`, the file's CRC is compared against the device's and a
/// mismatch is reported as an error.
pub fn run_crc(
    conn: &ConnectionArgs,
    address: u32,
    length: u32,
    memory: Memory,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let expected = match file {
        Some(path) => {
            let data = fs::read(path)?;
            if data.len() != length as usize {
                log::warn!(
                    "{:?} is {} bytes, comparing against {} bytes of flash",
                    path,
                    data.len(),
                    length
                );
            }
            Some(checksum::checksum(&data))
        }
        None => None,
    };

    let mut client = connection::open(conn)?;

    let crc = match memory {
        Memory::Internal => client.crc_internal(address, length)?,
        Memory::External => client.crc_external(address, length)?,
    };

    println!("CRC-32 of 0x{:08X}+{}: 0x{:08X}", address, length, crc);

    if let Some(expected) = expected {
        if expected != crc {
            return Err(format!("Mismatch: file CRC is 0x{:08X}", expected).into());
        }
        println!("Matches file");
    }

    Ok(())
}
