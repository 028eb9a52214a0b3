//! Attribute table commands

use stormloader_client::Attribute;
use stormloader_core::config::ATTR_SLOTS;

use crate::cli::ConnectionArgs;
use crate::connection;

/// Run `attr list`
pub fn cmd_list(conn: &ConnectionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;

    let mut found = 0;
    for slot in 0..ATTR_SLOTS {
        if let Some(attr) = client.get_attribute(slot)? {
            println!("{}", format_attribute(slot, &attr));
            found += 1;
        }
    }

    if found == 0 {
        println!("No attributes set");
    }
    Ok(())
}

/// Run `attr get`
pub fn cmd_get(conn: &ConnectionArgs, slot: u8) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;
    match client.get_attribute(slot)? {
        Some(attr) => println!("{}", format_attribute(slot, &attr)),
        None => println!("{:2}: (empty)", slot),
    }
    Ok(())
}

/// Run `attr set`
pub fn cmd_set(
    conn: &ConnectionArgs,
    slot: u8,
    tag: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;
    client.set_attribute(slot, tag.as_bytes(), value.as_bytes())?;
    println!("Slot {} set: {} = {}", slot, tag, value);
    Ok(())
}

fn format_attribute(slot: u8, attr: &Attribute) -> String {
    format!(
        "{:2}: {:8} = {}",
        slot,
        attr.tag_str(),
        String::from_utf8_lossy(&attr.value)
    )
}
