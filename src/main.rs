//! stormloader - Serial bootloader flashing tool
//!
//! Talks the stormloader protocol to a board over a serial port, or to the
//! built-in emulator started with `stormloader serve`.
//!
//! # Architecture
//!
//! - `stormloader-core` is the device-side engine: framing, command
//!   dispatch and the flash drivers, written against small hardware traits.
//! - `stormloader-sim` implements those traits in memory.
//! - `stormloader-client` is the host side of the protocol.
//!
//! This binary wires the client to the command line and exposes the
//! emulator over TCP.

mod cli;
mod commands;
mod config;
mod connection;

use clap::Parser;
use cli::{AttrCommands, Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Ping { conn } => commands::info::run_ping(&conn),
        Commands::Info { conn } => commands::info::run_info(&conn),
        Commands::Flash {
            conn,
            input,
            address,
            memory,
            run,
        } => commands::flash::run_flash(&conn, &input, address, memory, run),
        Commands::Read {
            conn,
            output,
            address,
            length,
            memory,
        } => commands::read::run_read(&conn, &output, address, length, memory),
        Commands::Erase {
            conn,
            address,
            length,
            memory,
        } => commands::erase::run_erase(&conn, address, length, memory),
        Commands::Crc {
            conn,
            address,
            length,
            memory,
            file,
        } => commands::crc::run_crc(&conn, address, length, memory, file.as_deref()),
        Commands::User { conn, word0, word1 } => commands::user::run_user(&conn, word0, word1),
        Commands::Attr(subcmd) => match subcmd {
            AttrCommands::List { conn } => commands::attr::cmd_list(&conn),
            AttrCommands::Get { conn, slot } => commands::attr::cmd_get(&conn, slot),
            AttrCommands::Set {
                conn,
                slot,
                tag,
                value,
            } => commands::attr::cmd_set(&conn, slot, &tag, &value),
        },
        Commands::Serve { listen, config } => {
            commands::serve::run_serve(&listen, config.as_deref())
        }
    }
}
