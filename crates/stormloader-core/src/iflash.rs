//! Internal flash engine
//!
//! Page erase/program sequences for the on-chip flash controller. The
//! order of controller steps matters:
//!
//! 1. wait ready, erase, invalidate cache, wait ready
//! 2. clear the page buffer, wait ready
//! 3. fill the page buffer two words at a time, writing all-ones to each
//!    word pair immediately before the real data
//! 4. wait ready, commit, invalidate cache, wait ready
//!
//! A controller failure ends the operation with [`Error::InternalFlash`];
//! nothing is retried here.

use crate::config::{INTERNAL_PAGE_SHIFT, INTERNAL_PAGE_SIZE, USER_PAGE_ADDR};
use crate::error::{Error, Result};
use crate::hal::FlashController;
use crate::validate::{INTERNAL_READ_WINDOW, INTERNAL_WINDOW};

/// Page number containing `addr`
pub const fn page_number(addr: u32) -> u32 {
    addr >> INTERNAL_PAGE_SHIFT
}

/// Erase the page at `addr`
///
/// If the controller's quick check shows the page is already blank, no
/// erase is issued.
pub fn erase_page<F: FlashController + ?Sized>(flash: &mut F, addr: u32) -> Result<()> {
    let page_size = INTERNAL_PAGE_SIZE as u32;
    INTERNAL_WINDOW.check(addr, page_size, page_size)?;
    let page = page_number(addr);

    flash.wait_until_ready();
    if flash.is_page_erased(page) {
        log::trace!("iflash: page {} already erased", page);
        return Ok(());
    }

    log::debug!("iflash: erase page {}", page);
    flash.wait_until_ready();
    let res = flash.erase_page(page);
    flash.invalidate_cache();
    res?;
    flash.wait_until_ready();
    Ok(())
}

/// Erase the page at `addr` and program it with `data`
pub fn program_page<F: FlashController + ?Sized>(
    flash: &mut F,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    if data.len() != INTERNAL_PAGE_SIZE {
        return Err(Error::BadArgs);
    }
    let page_size = INTERNAL_PAGE_SIZE as u32;
    INTERNAL_WINDOW.check(addr, page_size, page_size)?;
    let page = page_number(addr);
    log::debug!("iflash: program page {}", page);

    flash.wait_until_ready();
    let res = flash.erase_page(page);
    flash.invalidate_cache();
    res?;
    flash.wait_until_ready();

    flash.clear_page_buffer();
    flash.wait_until_ready();

    for (i, pair) in data.chunks_exact(8).enumerate() {
        let word_addr = addr + (i as u32) * 8;
        let lo = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let hi = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        fill_word_pair(flash, [word_addr, word_addr + 4], [lo, hi]);
    }

    commit(flash, |f| f.write_page(page))
}

/// Erase the user configuration page and program its two fuse words
///
/// `words[0]` goes to offset 4 and `words[1]` to offset 0, matching the
/// order the host tools send them.
pub fn program_user_page<F: FlashController + ?Sized>(flash: &mut F, words: [u32; 2]) -> Result<()> {
    log::debug!(
        "iflash: program user page {:#010x} {:#010x}",
        words[0],
        words[1]
    );

    flash.wait_until_ready();
    let res = flash.erase_user_page();
    flash.invalidate_cache();
    res?;
    flash.wait_until_ready();

    flash.clear_page_buffer();
    flash.wait_until_ready();

    fill_word_pair(
        flash,
        [USER_PAGE_ADDR + 4, USER_PAGE_ADDR],
        [words[0], words[1]],
    );

    commit(flash, |f| f.write_user_page())
}

/// Read mapped internal flash into `buf`
///
/// The cache is invalidated first so reads after a host-side write see
/// the new contents.
pub fn read<F: FlashController + ?Sized>(flash: &mut F, addr: u32, buf: &mut [u8]) -> Result<()> {
    let len = u32::try_from(buf.len()).map_err(|_| Error::BadArgs)?;
    INTERNAL_READ_WINDOW.check(addr, len, 1)?;
    flash.invalidate_cache();
    flash.read(addr, buf)
}

fn fill_word_pair<F: FlashController + ?Sized>(flash: &mut F, addrs: [u32; 2], words: [u32; 2]) {
    flash.write_buffer_word(addrs[0], 0xFFFF_FFFF);
    flash.write_buffer_word(addrs[1], 0xFFFF_FFFF);
    flash.write_buffer_word(addrs[0], words[0]);
    flash.write_buffer_word(addrs[1], words[1]);
}

fn commit<F, W>(flash: &mut F, write: W) -> Result<()>
where
    F: FlashController + ?Sized,
    W: FnOnce(&mut F) -> Result<()>,
{
    flash.wait_until_ready();
    let res = write(flash);
    flash.invalidate_cache();
    flash.wait_until_ready();
    res
}
