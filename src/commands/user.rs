//! User page command implementation

use crate::cli::ConnectionArgs;
use crate::connection;

/// Run the user command
pub fn run_user(
    conn: &ConnectionArgs,
    word0: u32,
    word1: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connection::open(conn)?;
    client.write_user_page(word0, word1)?;
    println!("User page set to 0x{:08X} 0x{:08X}", word0, word1);
    Ok(())
}
