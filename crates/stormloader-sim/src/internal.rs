//! Emulated internal flash controller

use stormloader_core::config::{
    DEVICE_ID_LEN, INTERNAL_CEILING, INTERNAL_PAGE_SIZE, USER_PAGE_ADDR,
};
use stormloader_core::error::{Error, Result};
use stormloader_core::hal::FlashController;

/// One controller primitive, as recorded by [`SimFlashController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Page erase
    Erase(u32),
    /// User page erase
    EraseUser,
    /// Page buffer cleared
    ClearBuffer,
    /// Word written into the page buffer
    BufferWord(u32, u32),
    /// Page buffer committed to a page
    Write(u32),
    /// Page buffer committed to the user page
    WriteUser,
}

/// In-memory flash controller
///
/// Programming only clears bits, like real NOR flash: committing the page
/// buffer ANDs it into the page, so a page must be erased first to take
/// new data.
pub struct SimFlashController {
    memory: Vec<u8>,
    page_buffer: [u8; INTERNAL_PAGE_SIZE],
    user_page: [u8; INTERNAL_PAGE_SIZE],
    unique_id: [u8; DEVICE_ID_LEN],
    ops: Vec<FlashOp>,
    cache_invalidations: usize,
    fail_erase: bool,
    fail_write: bool,
}

impl SimFlashController {
    /// Create a fully erased flash
    pub fn new() -> Self {
        let mut unique_id = [0u8; DEVICE_ID_LEN];
        for (i, b) in unique_id.iter_mut().enumerate() {
            *b = 0x50 + i as u8;
        }
        Self {
            memory: vec![0xFF; INTERNAL_CEILING as usize],
            page_buffer: [0xFF; INTERNAL_PAGE_SIZE],
            user_page: [0xFF; INTERNAL_PAGE_SIZE],
            unique_id,
            ops: Vec::new(),
            cache_invalidations: 0,
            fail_erase: false,
            fail_write: false,
        }
    }

    /// Create a flash whose first bytes are `image`
    pub fn with_data(image: &[u8]) -> Self {
        let mut flash = Self::new();
        let len = image.len().min(flash.memory.len());
        flash.memory[..len].copy_from_slice(&image[..len]);
        flash
    }

    /// Whole flash contents
    pub fn data(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable flash contents, for seeding tests
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// User configuration page contents
    pub fn user_page(&self) -> &[u8] {
        &self.user_page
    }

    /// Replace the reported unique serial
    pub fn set_unique_id(&mut self, id: [u8; DEVICE_ID_LEN]) {
        self.unique_id = id;
    }

    /// Make every erase report a controller failure
    pub fn set_fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Make every page commit report a controller failure
    pub fn set_fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    /// Every primitive issued so far
    pub fn ops(&self) -> &[FlashOp] {
        &self.ops
    }

    /// Number of physical page erases issued
    pub fn erase_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Erase(_)))
            .count()
    }

    /// Number of cache invalidations issued
    pub fn cache_invalidations(&self) -> usize {
        self.cache_invalidations
    }

    fn page_range(&self, page: u32) -> Result<core::ops::Range<usize>> {
        let start = page as usize * INTERNAL_PAGE_SIZE;
        let end = start + INTERNAL_PAGE_SIZE;
        if end > self.memory.len() {
            return Err(Error::InternalFlash);
        }
        Ok(start..end)
    }
}

impl Default for SimFlashController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashController for SimFlashController {
    fn wait_until_ready(&mut self) {}

    fn is_page_erased(&mut self, page: u32) -> bool {
        match self.page_range(page) {
            Ok(range) => self.memory[range].iter().all(|&b| b == 0xFF),
            Err(_) => false,
        }
    }

    fn erase_page(&mut self, page: u32) -> Result<()> {
        self.ops.push(FlashOp::Erase(page));
        if self.fail_erase {
            log::debug!("sim: injected erase failure on page {}", page);
            return Err(Error::InternalFlash);
        }
        let range = self.page_range(page)?;
        self.memory[range].fill(0xFF);
        Ok(())
    }

    fn erase_user_page(&mut self) -> Result<()> {
        self.ops.push(FlashOp::EraseUser);
        if self.fail_erase {
            return Err(Error::InternalFlash);
        }
        self.user_page.fill(0xFF);
        Ok(())
    }

    fn clear_page_buffer(&mut self) {
        self.ops.push(FlashOp::ClearBuffer);
        self.page_buffer.fill(0xFF);
    }

    fn write_buffer_word(&mut self, addr: u32, word: u32) {
        self.ops.push(FlashOp::BufferWord(addr, word));
        let offset = (addr as usize % INTERNAL_PAGE_SIZE) & !3;
        self.page_buffer[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
    }

    fn write_page(&mut self, page: u32) -> Result<()> {
        self.ops.push(FlashOp::Write(page));
        if self.fail_write {
            log::debug!("sim: injected write failure on page {}", page);
            return Err(Error::InternalFlash);
        }
        let range = self.page_range(page)?;
        for (dst, src) in self.memory[range].iter_mut().zip(&self.page_buffer) {
            *dst &= *src;
        }
        self.page_buffer.fill(0xFF);
        Ok(())
    }

    fn write_user_page(&mut self) -> Result<()> {
        self.ops.push(FlashOp::WriteUser);
        if self.fail_write {
            return Err(Error::InternalFlash);
        }
        for (dst, src) in self.user_page.iter_mut().zip(&self.page_buffer) {
            *dst &= *src;
        }
        self.page_buffer.fill(0xFF);
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        self.cache_invalidations += 1;
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        if addr >= USER_PAGE_ADDR {
            let offset = start - USER_PAGE_ADDR as usize;
            let src = self
                .user_page
                .get(offset..offset + buf.len())
                .ok_or(Error::BadAddress)?;
            buf.copy_from_slice(src);
            return Ok(());
        }
        let src = self
            .memory
            .get(start..start + buf.len())
            .ok_or(Error::BadAddress)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn unique_id(&mut self) -> [u8; DEVICE_ID_LEN] {
        self.unique_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormloader_core::iflash;

    #[test]
    fn test_program_requires_erase() {
        let mut flash = SimFlashController::new();
        flash.data_mut()[0x10000..0x10200].fill(0x0F);
        flash.clear_page_buffer();
        flash.write_buffer_word(0x10000, 0xF0F0_F0F0);
        flash.write_page(0x80).unwrap();
        assert_eq!(&flash.data()[0x10000..0x10004], &[0x00; 4]);
    }

    #[test]
    fn test_program_page_sequence() {
        let mut flash = SimFlashController::new();
        let data: Vec<u8> = (0..512u32).map(|i| i as u8).collect();
        iflash::program_page(&mut flash, 0x10200, &data).unwrap();
        assert_eq!(&flash.data()[0x10200..0x10400], &data[..]);

        let ops = flash.ops();
        assert_eq!(ops[0], FlashOp::Erase(0x81));
        assert_eq!(ops[1], FlashOp::ClearBuffer);
        // all-ones guard before each word pair
        assert_eq!(ops[2], FlashOp::BufferWord(0x10200, 0xFFFF_FFFF));
        assert_eq!(ops[3], FlashOp::BufferWord(0x10204, 0xFFFF_FFFF));
        assert_eq!(ops[4], FlashOp::BufferWord(0x10200, 0x0302_0100));
        assert_eq!(ops[5], FlashOp::BufferWord(0x10204, 0x0706_0504));
        assert_eq!(*ops.last().unwrap(), FlashOp::Write(0x81));
    }

    #[test]
    fn test_user_page_word_order() {
        let mut flash = SimFlashController::new();
        iflash::program_user_page(&mut flash, [0x1122_3344, 0x5566_7788]).unwrap();
        assert_eq!(&flash.user_page()[..4], &0x5566_7788u32.to_le_bytes());
        assert_eq!(&flash.user_page()[4..8], &0x1122_3344u32.to_le_bytes());
    }

    #[test]
    fn test_erase_failure() {
        let mut flash = SimFlashController::new();
        flash.data_mut()[0x20000] = 0;
        flash.set_fail_erase(true);
        assert_eq!(iflash::erase_page(&mut flash, 0x20000), Err(Error::InternalFlash));
    }
}
