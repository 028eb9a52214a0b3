//! Opening a client from command line arguments

use stormloader_client::{Client, Result as ClientResult, TcpTransport, Transport};

#[cfg(feature = "serial")]
use stormloader_client::SerialTransport;

use crate::cli::ConnectionArgs;

/// Any transport the CLI can open
pub enum Connection {
    #[cfg(feature = "serial")]
    Serial(SerialTransport),
    Tcp(TcpTransport),
}

impl Transport for Connection {
    fn write(&mut self, data: &[u8]) -> ClientResult<()> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.write(data),
            Connection::Tcp(t) => t.write(data),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> ClientResult<()> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.read(buf),
            Connection::Tcp(t) => t.read(buf),
        }
    }

    fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> ClientResult<usize> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.read_nonblock(buf, timeout_ms),
            Connection::Tcp(t) => t.read_nonblock(buf, timeout_ms),
        }
    }

    fn flush(&mut self) -> ClientResult<()> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.flush(),
            Connection::Tcp(t) => t.flush(),
        }
    }

    fn enter_bootloader(&mut self) -> ClientResult<()> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.enter_bootloader(),
            Connection::Tcp(t) => t.enter_bootloader(),
        }
    }

    fn exit_bootloader(&mut self) -> ClientResult<()> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial(t) => t.exit_bootloader(),
            Connection::Tcp(t) => t.exit_bootloader(),
        }
    }
}

/// Split `HOST:PORT`
pub fn parse_host_port(s: &str) -> Result<(&str, u16), String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("Expected HOST:PORT, got '{}'", s))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("Invalid port '{}': {}", port, e))?;
    Ok((host, port))
}

fn open_transport(args: &ConnectionArgs) -> Result<Connection, Box<dyn std::error::Error>> {
    if let Some(addr) = &args.tcp {
        let (host, port) = parse_host_port(addr)?;
        return Ok(Connection::Tcp(TcpTransport::connect(host, port)?));
    }

    #[cfg(feature = "serial")]
    if let Some(port) = &args.port {
        return Ok(Connection::Serial(SerialTransport::open(port, args.baud)?));
    }

    #[cfg(not(feature = "serial"))]
    if args.port.is_some() {
        return Err("Serial support not compiled in; rebuild with the 'serial' feature".into());
    }

    Err("No connection given; use --port or --tcp".into())
}

/// Open a transport and wait for the bootloader to answer
pub fn open(args: &ConnectionArgs) -> Result<Client<Connection>, Box<dyn std::error::Error>> {
    let transport = open_transport(args)?;
    let client = if args.reset {
        let mut client = Client::new(transport);
        client.enter_bootloader()?;
        client
    } else {
        Client::connect(transport)?
    };
    log::debug!("Bootloader is answering");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("127.0.0.1:7777"), Ok(("127.0.0.1", 7777)));
        assert_eq!(parse_host_port("[::1]:80"), Ok(("[::1]", 80)));
        assert!(parse_host_port("localhost").is_err());
        assert!(parse_host_port("localhost:99999").is_err());
    }
}
