//! Serve command: the bootloader engine on emulated hardware
//!
//! Each TCP client is a UART session: bytes received are fed to the
//! engine, everything it transmits is written back. One client is served
//! at a time. Flash contents survive across clients and, when configured,
//! are written back to their image files on disconnect.

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

use stormloader_sim::{SimBootloader, SimDataFlash, SimFlashController};

use crate::config::{FlashImage, SimConfig};

/// How long a read waits before the engine is polled again
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run the serve command
pub fn run_serve(listen: &str, config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => {
            let config = SimConfig::load(path)?;
            log::info!("Loaded simulator configuration from {:?}", path);
            config
        }
        None => SimConfig::default(),
    };

    let mut bl = build_bootloader(&config)?;

    let listener = TcpListener::bind(listen)?;
    println!("Bootloader listening on {}", listener.local_addr()?);

    for stream in listener.incoming() {
        let stream = stream?;
        let peer = stream.peer_addr()?;
        log::info!("Client connected from {}", peer);

        if let Err(e) = serve_connection(&mut bl, stream) {
            log::warn!("Session with {} ended: {}", peer, e);
        } else {
            log::info!("Client {} disconnected", peer);
        }

        persist(&config, &mut bl)?;

        if bl.is_halted() {
            println!("Bootloader halted (clock routed out), exiting");
            break;
        }
    }

    Ok(())
}

/// Build the engine around flashes prepared from `config`
pub fn build_bootloader(config: &SimConfig) -> Result<SimBootloader, Box<dyn std::error::Error>> {
    let mut flash = SimFlashController::new();
    load_image(&config.internal, flash.data_mut(), "internal")?;
    if let Some(id) = config.unique_id()? {
        flash.set_unique_id(id);
    }
    flash.set_fail_erase(config.faults.internal_erase_error);
    flash.set_fail_write(config.faults.internal_write_error);

    let mut dataflash = SimDataFlash::new();
    load_image(&config.external, dataflash.data_mut(), "external")?;
    dataflash.set_busy_polls(config.faults.busy_polls);
    dataflash.set_stuck_busy(config.faults.stuck_busy);
    dataflash.set_program_error(config.faults.program_error);

    Ok(stormloader_sim::bootloader(flash, dataflash)?)
}

fn load_image(
    image: &FlashImage,
    memory: &mut [u8],
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = &image.image else {
        return Ok(());
    };
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound && image.persist => {
            log::info!("{} image {:?} does not exist yet, starting erased", name, path);
            return Ok(());
        }
        Err(e) => return Err(format!("Failed to read {:?}: {}", path, e).into()),
    };

    let offset = image.offset as usize;
    let end = offset
        .checked_add(data.len())
        .filter(|&end| end <= memory.len())
        .ok_or_else(|| {
            format!(
                "{} image {:?} ({} bytes at 0x{:X}) does not fit in {} bytes of flash",
                name,
                path,
                data.len(),
                offset,
                memory.len()
            )
        })?;
    memory[offset..end].copy_from_slice(&data);
    log::info!("Loaded {} bytes into {} flash at 0x{:X}", data.len(), name, offset);
    Ok(())
}

fn persist(config: &SimConfig, bl: &mut SimBootloader) -> Result<(), Box<dyn std::error::Error>> {
    if let (true, Some(path)) = (config.internal.persist, &config.internal.image) {
        fs::write(path, bl.flash_mut().data())?;
        log::debug!("Saved internal flash to {:?}", path);
    }
    if let (true, Some(path)) = (config.external.persist, &config.external.image) {
        fs::write(path, bl.spi_mut().data())?;
        log::debug!("Saved external flash to {:?}", path);
    }
    Ok(())
}

/// Shuttle bytes between one client and the engine until either side ends
pub fn serve_connection(bl: &mut SimBootloader, mut stream: TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                log::trace!("rx {:02x?}", &buf[..n]);
                bl.uart_mut().push_input(&buf[..n]);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }

        stormloader_sim::run_until_idle(bl).map_err(io::Error::other)?;

        let out = bl.uart_mut().take_output();
        if !out.is_empty() {
            log::trace!("tx {:02x?}", out);
            stream.write_all(&out)?;
        }

        if bl.is_halted() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use stormloader_client::{Client, TcpTransport};

    #[test]
    fn test_build_bootloader_applies_config() {
        let config = SimConfig::from_toml_str(
            "unique_id = \"0f0e0d0c0b0a09080706050403020100\"\n[faults]\nbusy_polls = 0\n",
        )
        .unwrap();
        let mut bl = build_bootloader(&config).unwrap();
        assert!(bl.spi_mut().is_power_of_two());
        assert!(!bl.is_halted());
    }

    #[test]
    fn test_load_image_rejects_oversized() {
        let image = FlashImage {
            image: Some(std::env::temp_dir().join("stormloader-serve-missing.bin")),
            offset: 0,
            persist: true,
        };
        let mut memory = [0xFFu8; 16];
        // Missing file with persist starts erased
        load_image(&image, &mut memory, "test").unwrap();
        assert!(memory.iter().all(|&b| b == 0xFF));

        let path = std::env::temp_dir().join(format!("stormloader-serve-{}.bin", std::process::id()));
        fs::write(&path, [1u8; 8]).unwrap();
        let image = FlashImage {
            image: Some(path.clone()),
            offset: 12,
            persist: false,
        };
        assert!(load_image(&image, &mut memory, "test").is_err());
        let image = FlashImage { offset: 8, ..image };
        load_image(&image, &mut memory, "test").unwrap();
        assert_eq!(&memory[8..], &[1u8; 8]);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_client_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let mut bl = build_bootloader(&SimConfig::default()).unwrap();
            let (stream, _) = listener.accept().unwrap();
            serve_connection(&mut bl, stream).unwrap();
            bl
        });

        let transport = TcpTransport::connect("127.0.0.1", port).unwrap();
        let mut client = Client::connect(transport).unwrap();
        assert!(client.info().unwrap().starts_with("StormLoader "));

        let image: Vec<u8> = (0..700u32).map(|i| (i * 7) as u8).collect();
        client.flash_image(0x30000, &image, |_| {}).unwrap();
        let back = client.read_internal(0x30000, image.len(), |_| {}).unwrap();
        assert_eq!(back, image);
        drop(client);

        let mut bl = server.join().unwrap();
        assert_eq!(&bl.flash_mut().data()[0x30000..0x30000 + 700], &image[..]);
        // padded to a whole page
        assert!(bl.flash_mut().data()[0x30000 + 700..0x30400].iter().all(|&b| b == 0xFF));
    }
}
