//! Ping and info commands

use crate::cli::ConnectionArgs;
use crate::connection;

/// Run the ping command
pub fn run_ping(conn: &ConnectionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;
    client.ping()?;
    println!("Bootloader is alive");
    Ok(())
}

/// Run the info command
pub fn run_info(conn: &ConnectionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;

    let version = client.info()?;
    let id = client.device_id()?;

    println!("Bootloader Information");
    println!("======================");
    println!();
    println!("Version:         {}", version);
    println!("Serial:          {}", format_id(&id));

    Ok(())
}

fn format_id(id: &[u8]) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_id() {
        assert_eq!(format_id(&[0x00, 0xAB, 0x10]), "00ab10");
    }
}
