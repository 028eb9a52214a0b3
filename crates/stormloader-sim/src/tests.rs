//! End-to-end tests: host frames in, response bytes out, through the real
//! engine running on emulated hardware.

use stormloader_core::checksum;
use stormloader_core::config::{
    ESCAPE, EXTERNAL_PAGE_SIZE, INFO_LEN, INTERNAL_PAGE_SIZE, RX_CAPACITY, XFLASH_POLL_DELAY_US,
    XFLASH_POLL_LIMIT,
};
use stormloader_core::dispatch::{INFO_TEXT_NOTICE, INFO_TEXT_PREFIX};
use stormloader_core::Bootloader;
use stormloader_core::protocol::{escape, Command, Response, Step, Unescaper};
use stormloader_core::spi::opcodes;

use super::*;

fn setup() -> SimBootloader {
    bootloader(SimFlashController::new(), SimDataFlash::new()).unwrap()
}

fn frame(cmd: Command, args: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = escape(args).collect();
    out.extend([ESCAPE, cmd.code()]);
    out
}

/// Split one response into its tag and de-escaped payload
fn parse(bytes: &[u8]) -> (Response, Vec<u8>) {
    assert!(bytes.len() >= 2, "short response: {:02x?}", bytes);
    assert_eq!(bytes[0], ESCAPE);
    let tag = Response::from_u8(bytes[1]).unwrap();
    let mut unescaper = Unescaper::new();
    let mut payload = Vec::new();
    for &b in &bytes[2..] {
        match unescaper.push(b) {
            Step::Data(d) => payload.push(d),
            Step::Escape => {}
            Step::Terminator(t) => panic!("unexpected terminator {:#04x}", t),
        }
    }
    (tag, payload)
}

fn request(bl: &mut SimBootloader, cmd: Command, args: &[u8]) -> (Response, Vec<u8>) {
    let out = exchange(bl, &frame(cmd, args)).unwrap();
    parse(&out)
}

fn addr_len16(addr: u32, len: u16) -> Vec<u8> {
    let mut args = addr.to_le_bytes().to_vec();
    args.extend(len.to_le_bytes());
    args
}

fn addr_len32(addr: u32, len: u32) -> Vec<u8> {
    let mut args = addr.to_le_bytes().to_vec();
    args.extend(len.to_le_bytes());
    args
}

fn xwrite_args(addr: u32) -> Vec<u8> {
    let mut args = addr.to_le_bytes().to_vec();
    args.extend((0..EXTERNAL_PAGE_SIZE).map(|i| i as u8));
    args
}

#[test]
fn test_init_configures_dataflash() {
    let mut bl = setup();
    assert!(bl.spi_mut().is_power_of_two());
    assert!(bl.pending_output().is_empty());
}

#[test]
fn test_ping() {
    let mut bl = setup();
    let out = exchange(&mut bl, &frame(Command::Ping, &[])).unwrap();
    assert_eq!(out, [ESCAPE, Response::Pong.code()]);
}

#[test]
fn test_stray_payload_on_ping_is_ignored() {
    let mut bl = setup();
    let (tag, _) = request(&mut bl, Command::Ping, &[0x00, 0x12]);
    assert_eq!(tag, Response::Pong);
}

#[test]
fn test_unknown_opcode() {
    let mut bl = setup();
    let out = exchange(&mut bl, &[0x01, 0x02, ESCAPE, 0x7E]).unwrap();
    assert_eq!(out, [ESCAPE, Response::Unknown.code()]);
    // buffer was cleared, so the next command sees no leftovers
    let (tag, payload) = request(&mut bl, Command::CrcRx, &[]);
    assert_eq!(tag, Response::CrcRx);
    assert_eq!(&payload[..2], &[0, 0]);
    assert_eq!(&payload[2..], &checksum::EMPTY_SENTINEL.to_le_bytes());
}

#[test]
fn test_info() {
    let mut bl = setup();
    let (tag, payload) = request(&mut bl, Command::Info, &[]);
    assert_eq!(tag, Response::Info);
    assert_eq!(payload.len(), INFO_LEN);
    let len = payload[0] as usize;
    let text = std::str::from_utf8(&payload[1..=len]).unwrap();
    assert!(text.starts_with(INFO_TEXT_PREFIX));
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
    assert!(text.ends_with(INFO_TEXT_NOTICE));
    assert!(payload[len + 1..].iter().all(|&b| b == 0));
}

#[test]
fn test_device_id() {
    let mut bl = setup();
    let id = [0xFC; 16];
    bl.flash_mut().set_unique_id(id);
    let (tag, payload) = request(&mut bl, Command::Id, &[]);
    assert_eq!(tag, Response::Id);
    assert_eq!(payload, id);
}

#[test]
fn test_reset_sync_produces_no_output() {
    let mut bl = setup();
    // leftover arguments, then the host's sync sequence
    let out = exchange(&mut bl, &[0xAA, 0xBB, 0x00, ESCAPE, Command::Reset.code()]).unwrap();
    assert!(out.is_empty());
    assert!(bl.pending_input().is_empty());
    let (tag, _) = request(&mut bl, Command::Ping, &[]);
    assert_eq!(tag, Response::Pong);
}

#[test]
fn test_reset_drops_pending_output() {
    let mut bl = setup();
    for b in frame(Command::Info, &[]) {
        bl.feed(b);
    }
    assert!(!bl.pending_output().is_empty());
    for b in frame(Command::Reset, &[]) {
        bl.feed(b);
    }
    assert!(bl.pending_output().is_empty());
}

#[test]
fn test_overflow_discards_frame() {
    let mut bl = setup();
    let mut input = vec![0x00; RX_CAPACITY + 10];
    input.extend([ESCAPE, Command::Ping.code()]);
    let out = exchange(&mut bl, &input).unwrap();
    assert_eq!(out, [ESCAPE, Response::Overflow.code()]);
    assert!(bl.pending_input().is_empty());

    let (tag, _) = request(&mut bl, Command::Ping, &[]);
    assert_eq!(tag, Response::Pong);
}

#[test]
fn test_sync_after_overflow_clears_notice() {
    let mut bl = setup();
    // oversized frame with no terminator, nothing transmitted yet
    for _ in 0..RX_CAPACITY + 10 {
        bl.feed(0x00);
    }
    assert_eq!(bl.pending_output(), [ESCAPE, Response::Overflow.code()]);

    for b in [0x00, ESCAPE, Command::Reset.code()] {
        bl.feed(b);
    }
    assert!(bl.pending_output().is_empty());
    assert!(bl.pending_input().is_empty());

    let out = exchange(&mut bl, &frame(Command::Ping, &[])).unwrap();
    assert_eq!(out, [ESCAPE, Response::Pong.code()]);
}

#[test]
fn test_crc_rx_with_escaped_bytes() {
    let mut bl = setup();
    let args = [0x01, ESCAPE, 0x02, ESCAPE, ESCAPE];
    let (tag, payload) = request(&mut bl, Command::CrcRx, &args);
    assert_eq!(tag, Response::CrcRx);
    assert_eq!(&payload[..2], &5u16.to_le_bytes());
    assert_eq!(&payload[2..], &checksum::checksum(&args).to_le_bytes());
}

#[test]
fn test_write_page_read_back() {
    let mut bl = setup();
    let data: Vec<u8> = (0..INTERNAL_PAGE_SIZE).map(|i| (i % 253) as u8 ^ 0xFC).collect();
    let mut args = 0x0001_0000u32.to_le_bytes().to_vec();
    args.extend(&data);
    let (tag, _) = request(&mut bl, Command::WritePage, &args);
    assert_eq!(tag, Response::Ok);
    assert_eq!(&bl.flash_mut().data()[0x10000..0x10200], &data[..]);

    let (tag, payload) = request(&mut bl, Command::ReadRange, &addr_len16(0x10000, 512));
    assert_eq!(tag, Response::ReadRange);
    assert_eq!(payload, data);

    let (tag, payload) = request(&mut bl, Command::CrcInternal, &addr_len32(0x10000, 512));
    assert_eq!(tag, Response::CrcInternal);
    assert_eq!(payload, checksum::checksum(&data).to_le_bytes());
}

#[test]
fn test_write_page_wrong_length() {
    let mut bl = setup();
    let mut args = 0x0001_0000u32.to_le_bytes().to_vec();
    args.extend([0u8; 511]);
    let (tag, _) = request(&mut bl, Command::WritePage, &args);
    assert_eq!(tag, Response::BadArgs);
    assert!(bl.flash_mut().ops().is_empty());
}

#[test]
fn test_erase_protected_page() {
    let mut bl = setup();
    let (tag, _) = request(&mut bl, Command::ErasePage, &0x0000_0200u32.to_le_bytes());
    assert_eq!(tag, Response::BadAddr);
    let (tag, _) = request(&mut bl, Command::ErasePage, &0x0001_0100u32.to_le_bytes());
    assert_eq!(tag, Response::BadAddr);
    let (tag, _) = request(&mut bl, Command::ErasePage, &0x0008_0000u32.to_le_bytes());
    assert_eq!(tag, Response::BadAddr);
    assert!(bl.flash_mut().ops().is_empty());
}

#[test]
fn test_erase_skips_blank_page() {
    let mut bl = setup();
    let (tag, _) = request(&mut bl, Command::ErasePage, &0x0002_0000u32.to_le_bytes());
    assert_eq!(tag, Response::Ok);
    assert_eq!(bl.flash_mut().erase_count(), 0);

    bl.flash_mut().data_mut()[0x20010] = 0x00;
    let (tag, _) = request(&mut bl, Command::ErasePage, &0x0002_0000u32.to_le_bytes());
    assert_eq!(tag, Response::Ok);
    assert_eq!(bl.flash_mut().erase_count(), 1);
    assert_eq!(bl.flash_mut().data()[0x20010], 0xFF);
}

#[test]
fn test_internal_flash_failure() {
    let mut bl = setup();
    bl.flash_mut().set_fail_write(true);
    let mut args = 0x0001_0000u32.to_le_bytes().to_vec();
    args.extend([0u8; INTERNAL_PAGE_SIZE]);
    let (tag, _) = request(&mut bl, Command::WritePage, &args);
    assert_eq!(tag, Response::IntError);
}

#[test]
fn test_write_user_page() {
    let mut bl = setup();
    let mut args = 0xAABB_CCDDu32.to_le_bytes().to_vec();
    args.extend(0x1122_3344u32.to_le_bytes());
    let (tag, _) = request(&mut bl, Command::WriteUser, &args);
    assert_eq!(tag, Response::Ok);
    let user = bl.flash_mut().user_page();
    assert_eq!(&user[..4], &0x1122_3344u32.to_le_bytes());
    assert_eq!(&user[4..8], &0xAABB_CCDDu32.to_le_bytes());
}

#[test]
fn test_read_range_limits() {
    let mut bl = setup();
    let (tag, _) = request(&mut bl, Command::ReadRange, &addr_len16(0x7FF00, 0x200));
    assert_eq!(tag, Response::BadAddr);
    let (tag, _) = request(&mut bl, Command::ReadRange, &addr_len16(0, 4000));
    assert_eq!(tag, Response::BadArgs);
    // the bootloader region is readable
    let (tag, payload) = request(&mut bl, Command::ReadRange, &addr_len16(0, 16));
    assert_eq!(tag, Response::ReadRange);
    assert_eq!(payload.len(), 16);
}

#[test]
fn test_xwrite_page_read_back() {
    let mut bl = setup();
    let data: Vec<u8> = (0..256u32).map(|i| (i * 3) as u8).collect();
    let mut args = 0x0000_1000u32.to_le_bytes().to_vec();
    args.extend(&data);
    let (tag, _) = request(&mut bl, Command::XWritePage, &args);
    assert_eq!(tag, Response::Ok);

    let (tag, payload) = request(&mut bl, Command::XReadRange, &addr_len16(0x1000, 256));
    assert_eq!(tag, Response::XReadRange);
    assert_eq!(payload, data);
}

#[test]
fn test_misaligned_xwrite_touches_nothing() {
    let mut bl = setup();
    bl.spi_mut().clear_transactions();
    let mut args = 0x0000_1001u32.to_le_bytes().to_vec();
    args.extend([0u8; 256]);
    let (tag, _) = request(&mut bl, Command::XWritePage, &args);
    assert_eq!(tag, Response::BadAddr);
    assert!(bl.spi_mut().transactions().is_empty());
}

#[test]
fn test_xerase_attribute_block_rejected() {
    let mut bl = setup();
    bl.spi_mut().clear_transactions();
    let (tag, _) = request(&mut bl, Command::XEraseBlock, &0u32.to_le_bytes());
    assert_eq!(tag, Response::BadAddr);
    let (tag, _) = request(&mut bl, Command::XErasePage, &0x0000_0700u32.to_le_bytes());
    assert_eq!(tag, Response::BadAddr);
    assert!(bl.spi_mut().transactions().is_empty());
}

#[test]
fn test_xerase_block_and_page() {
    let mut bl = setup();
    bl.spi_mut().data_mut()[0x800..0x1000].fill(0);
    let (tag, _) = request(&mut bl, Command::XErasePage, &0x0000_0900u32.to_le_bytes());
    assert_eq!(tag, Response::Ok);
    assert!(bl.spi_mut().data()[0x900..0xA00].iter().all(|&b| b == 0xFF));
    assert_eq!(bl.spi_mut().data()[0x800], 0);

    let (tag, _) = request(&mut bl, Command::XEraseBlock, &0x0000_0800u32.to_le_bytes());
    assert_eq!(tag, Response::Ok);
    assert!(bl.spi_mut().data()[0x800..0x1000].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_xinit_selects_power_of_two_pages() {
    // engine that skipped its start-up, so the DataFlash is in binary pages
    let mut bl = Bootloader::new(
        SimUart::new(),
        SimFlashController::new(),
        SimDataFlash::new(),
        SimBoard::default(),
    );
    assert!(!bl.spi_mut().is_power_of_two());

    let (tag, payload) = request(&mut bl, Command::XInit, &[]);
    assert_eq!(tag, Response::Ok);
    assert!(payload.is_empty());
    assert!(bl.spi_mut().is_power_of_two());
    assert_eq!(bl.spi_mut().transactions(), &[opcodes::CONFIGURE]);

    // repeating it is harmless
    let (tag, _) = request(&mut bl, Command::XInit, &[]);
    assert_eq!(tag, Response::Ok);
}

#[test]
fn test_stuck_busy_times_out() {
    let mut bl = setup();
    bl.spi_mut().set_stuck_busy(true);
    bl.spi_mut().clear_transactions();
    let delay_before = bl.spi_mut().delay_total_us();

    let (tag, _) = request(&mut bl, Command::XEraseBlock, &0x0000_0800u32.to_le_bytes());
    assert_eq!(tag, Response::XfTimeout);
    assert_eq!(bl.spi_mut().count(opcodes::BE), 1);
    assert_eq!(bl.spi_mut().count(opcodes::RDSR), XFLASH_POLL_LIMIT as usize);
    assert_eq!(
        bl.spi_mut().delay_total_us() - delay_before,
        XFLASH_POLL_LIMIT as u64 * XFLASH_POLL_DELAY_US as u64
    );
}

#[test]
fn test_xwrite_stuck_busy_times_out() {
    let mut bl = setup();
    bl.spi_mut().set_stuck_busy(true);
    bl.spi_mut().clear_transactions();

    let (tag, _) = request(&mut bl, Command::XWritePage, &xwrite_args(0x1000));
    assert_eq!(tag, Response::XfTimeout);
    assert_eq!(bl.spi_mut().count(opcodes::PP_BUF1), 1);
    assert_eq!(bl.spi_mut().count(opcodes::RDSR), XFLASH_POLL_LIMIT as usize);
}

#[test]
fn test_set_attribute_stuck_busy_times_out() {
    let mut bl = setup();
    bl.spi_mut().set_stuck_busy(true);
    bl.spi_mut().clear_transactions();

    let mut args = vec![1u8];
    args.extend(b"name\0\0\0\0");
    args.push(1);
    args.push(b'x');
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::XfTimeout);
    assert_eq!(bl.spi_mut().count(opcodes::RMW_BUF1), 1);
    assert_eq!(bl.spi_mut().count(opcodes::RDSR), XFLASH_POLL_LIMIT as usize);
}

#[test]
fn test_slow_dataflash_still_completes() {
    let mut bl = setup();
    bl.spi_mut().set_busy_polls(XFLASH_POLL_LIMIT - 1);
    bl.spi_mut().clear_transactions();

    let (tag, _) = request(&mut bl, Command::XWritePage, &xwrite_args(0x1000));
    assert_eq!(tag, Response::Ok);
    assert_eq!(bl.spi_mut().count(opcodes::RDSR), XFLASH_POLL_LIMIT as usize);
}

#[test]
fn test_program_error_reported() {
    let mut bl = setup();
    bl.spi_mut().set_program_error(true);
    let (tag, _) = request(&mut bl, Command::XEraseBlock, &0x0000_1000u32.to_le_bytes());
    assert_eq!(tag, Response::XfEpe);
}

#[test]
fn test_xwrite_program_error_reported() {
    let mut bl = setup();
    bl.spi_mut().set_program_error(true);
    let (tag, _) = request(&mut bl, Command::XWritePage, &xwrite_args(0x1000));
    assert_eq!(tag, Response::XfEpe);

    let mut args = vec![2u8];
    args.extend(b"name\0\0\0\0");
    args.push(0);
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::XfEpe);
}

#[test]
fn test_external_crc_spans_chunks() {
    let mut bl = setup();
    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 + 7) as u8).collect();
    bl.spi_mut().data_mut()[0x800..0x800 + data.len()].copy_from_slice(&data);
    let (tag, payload) = request(
        &mut bl,
        Command::CrcExternal,
        &addr_len32(0x800, data.len() as u32),
    );
    assert_eq!(tag, Response::CrcExternal);
    assert_eq!(payload, checksum::checksum(&data).to_le_bytes());
}

#[test]
fn test_external_crc_out_of_range() {
    let mut bl = setup();
    let (tag, _) = request(&mut bl, Command::CrcExternal, &addr_len32(0x10, u32::MAX));
    assert_eq!(tag, Response::BadAddr);
}

#[test]
fn test_set_then_get_attribute() {
    let mut bl = setup();
    let mut args = vec![3u8];
    args.extend(b"version\0");
    args.push(2);
    args.extend(b"hi");
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::Ok);

    let (tag, payload) = request(&mut bl, Command::GetAttr, &[3]);
    assert_eq!(tag, Response::GetAttr);
    assert_eq!(payload.len(), 64);
    assert_eq!(&payload[..8], b"version\0");
    assert_eq!(payload[8], 2);
    assert_eq!(&payload[9..11], b"hi");
    assert_eq!(bl.spi_mut().count(opcodes::RMW_BUF1), 1);
}

#[test]
fn test_bad_attribute_arguments() {
    let mut bl = setup();
    bl.spi_mut().clear_transactions();

    let mut args = vec![16u8];
    args.extend([0u8; 8]);
    args.push(0);
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::BadArgs);

    let mut args = vec![0u8];
    args.extend([0u8; 8]);
    args.push(56);
    args.extend([0u8; 56]);
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::BadArgs);

    // declared length disagrees with the frame
    let mut args = vec![0u8];
    args.extend([0u8; 8]);
    args.push(4);
    args.extend([0u8; 2]);
    let (tag, _) = request(&mut bl, Command::SetAttr, &args);
    assert_eq!(tag, Response::BadArgs);

    let (tag, _) = request(&mut bl, Command::GetAttr, &[16]);
    assert_eq!(tag, Response::BadArgs);

    assert!(bl.spi_mut().transactions().is_empty());
}

#[test]
fn test_clock_out_halts() {
    let mut bl = setup();
    let out = exchange(&mut bl, &frame(Command::ClockOut, &[])).unwrap();
    assert!(out.is_empty());
    assert!(bl.is_halted());
    assert!(bl.board_mut().clock_routed());

    bl.uart_mut().push_input(&frame(Command::Ping, &[]));
    for _ in 0..10 {
        bl.poll().unwrap();
    }
    assert!(bl.uart_mut().output().is_empty());
}

#[test]
fn test_blocked_transmitter_keeps_response() {
    let mut bl = setup();
    bl.uart_mut().set_tx_blocked(true);
    exchange(&mut bl, &frame(Command::Ping, &[])).unwrap();
    assert_eq!(bl.pending_output(), [ESCAPE, Response::Pong.code()]);

    bl.uart_mut().set_tx_blocked(false);
    run_until_idle(&mut bl).unwrap();
    assert_eq!(bl.uart_mut().output(), [ESCAPE, Response::Pong.code()]);
}
