//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let v = parse_hex_u32(s)?;
    u8::try_from(v).map_err(|_| format!("Value {} does not fit in a byte", v))
}

#[derive(Parser)]
#[command(name = "stormloader")]
#[command(author, version, about = "Serial bootloader flashing tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach the bootloader
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Serial port of the board (e.g. /dev/ttyUSB0)
    #[arg(short, long, required_unless_present = "tcp", conflicts_with = "tcp")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Connect to a `serve` simulator at HOST:PORT instead
    #[arg(long)]
    pub tcp: Option<String>,

    /// Reset the board into the bootloader with DTR/RTS first
    #[arg(long)]
    pub reset: bool,
}

/// Which flash a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Memory {
    /// On-chip flash
    Internal,
    /// SPI DataFlash
    External,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the bootloader answers
    Ping {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Show bootloader version and device serial
    Info {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Write an image and verify it by CRC
    Flash {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Image file
        #[arg(short, long)]
        input: PathBuf,

        /// Load address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0x30000")]
        address: u32,

        /// Target flash
        #[arg(short, long, value_enum, default_value_t = Memory::Internal)]
        memory: Memory,

        /// Reset into the application when done
        #[arg(long)]
        run: bool,
    },

    /// Read flash contents to a file
    Read {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Source flash
        #[arg(short, long, value_enum, default_value_t = Memory::Internal)]
        memory: Memory,
    },

    /// Erase a flash region
    Erase {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Start address (hex or decimal); must be page (internal) or block
        /// (external) aligned
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Target flash
        #[arg(short, long, value_enum, default_value_t = Memory::Internal)]
        memory: Memory,
    },

    /// Print the CRC-32 the device computes over a region
    Crc {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Source flash
        #[arg(short, long, value_enum, default_value_t = Memory::Internal)]
        memory: Memory,

        /// Compare against the CRC of this file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Program the two user page words
    User {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// First word (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        word0: u32,

        /// Second word (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        word1: u32,
    },

    /// Attribute table operations
    #[command(subcommand)]
    Attr(AttrCommands),

    /// Run the bootloader on emulated hardware, reachable over TCP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7777")]
        listen: String,

        /// Simulator configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Attribute subcommands
#[derive(Subcommand)]
pub enum AttrCommands {
    /// Print every populated slot
    List {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Print one slot
    Get {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Slot number (0-15)
        #[arg(value_parser = parse_hex_u8)]
        slot: u8,
    },

    /// Store a tag/value pair in a slot
    Set {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Slot number (0-15)
        #[arg(value_parser = parse_hex_u8)]
        slot: u8,

        /// Tag, at most 8 bytes
        tag: String,

        /// Value, at most 55 bytes
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x30000"), Ok(0x30000));
        assert_eq!(parse_hex_u32("0X10"), Ok(16));
        assert_eq!(parse_hex_u32("512"), Ok(512));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert!(parse_hex_u8("0x100").is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flash_defaults() {
        let cli = Cli::try_parse_from(["stormloader", "flash", "--tcp", "h:1", "-i", "a.bin"])
            .unwrap();
        match cli.command {
            Commands::Flash {
                address, memory, ..
            } => {
                assert_eq!(address, 0x30000);
                assert_eq!(memory, Memory::Internal);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_port_or_tcp_required() {
        assert!(Cli::try_parse_from(["stormloader", "ping"]).is_err());
        assert!(Cli::try_parse_from(["stormloader", "ping", "-p", "/dev/x", "--tcp", "h:1"]).is_err());
    }
}
