//! Read command implementation

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::cli::{ConnectionArgs, Memory};
use crate::connection;

/// Run the read command
pub fn run_read(
    conn: &ConnectionArgs,
    output: &Path,
    address: u32,
    length: u32,
    memory: Memory,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;

    let pb = super::progress_bar(length as u64, "Reading");
    let progress = |done: usize| pb.set_position(done as u64);
    let data = match memory {
        Memory::Internal => client.read_internal(address, length as usize, progress)?,
        Memory::External => client.read_external(address, length as usize, progress)?,
    };
    pb.finish_with_message("Read complete");

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}
