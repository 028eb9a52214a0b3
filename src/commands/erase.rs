//! Erase command implementation

use stormloader_core::config::{EXTERNAL_BLOCK_SIZE, INTERNAL_PAGE_SIZE};

use crate::cli::{ConnectionArgs, Memory};
use crate::connection;

/// Run the erase command
pub fn run_erase(
    conn: &ConnectionArgs,
    address: u32,
    length: u32,
    memory: Memory,
) -> Result<(), Box<dyn std::error::Error>> {
    let unit = match memory {
        Memory::Internal => INTERNAL_PAGE_SIZE as u32,
        Memory::External => EXTERNAL_BLOCK_SIZE,
    };
    if address % unit != 0 {
        return Err(format!("Address 0x{:08X} is not aligned to {} bytes", address, unit).into());
    }

    let mut client = connection::open(conn)?;

    let pb = super::progress_bar(length as u64, "Erasing");
    match memory {
        Memory::Internal => {
            let pages = length.div_ceil(unit);
            for i in 0..pages {
                client.erase_page(address + i * unit)?;
                pb.set_position(((i + 1) * unit).min(length) as u64);
            }
        }
        Memory::External => {
            client.xerase_range(address, length, |done| pb.set_position(done as u64))?;
        }
    }
    pb.finish_with_message("Erase complete");

    println!("Erased 0x{:08X}..0x{:08X}", address, address as u64 + length as u64);

    Ok(())
}
