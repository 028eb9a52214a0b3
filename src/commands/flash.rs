//! Flash command implementation

use std::fs;
use std::path::Path;

use crate::cli::{ConnectionArgs, Memory};
use crate::connection;

/// Run the flash command
///
/// Internal flash is written page by page (the device erases each page
/// itself). External flash is written in 256-byte pages; the target blocks
/// are erased first. Both are verified with a device-side CRC.
pub fn run_flash(
    conn: &ConnectionArgs,
    input: &Path,
    address: u32,
    memory: Memory,
    run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = fs::read(input)?;
    if image.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }
    println!("Read {} bytes from {:?}", image.len(), input);

    let mut client = connection::open(conn)?;

    let pb = super::progress_bar(image.len() as u64, "Writing");
    let crc = match memory {
        Memory::Internal => {
            client.flash_image(address, &image, |done| pb.set_position(done as u64))?
        }
        Memory::External => {
            // re-send the page size configuration before relying on it
            client.xflash_init()?;
            let erase_len = u32::try_from(image.len())?;
            log::info!(
                "Erasing external flash 0x{:08X}..0x{:08X}",
                address,
                address.saturating_add(erase_len)
            );
            client.xerase_range(address, erase_len, |_| {})?;
            client.xflash_image(address, &image, |done| pb.set_position(done as u64))?
        }
    };
    pb.finish_with_message("Write complete");

    println!("Verified: CRC-32 0x{:08X} at 0x{:08X}", crc, address);

    if run {
        log::info!("Resetting into the application");
        client.exit_bootloader()?;
    }

    Ok(())
}
