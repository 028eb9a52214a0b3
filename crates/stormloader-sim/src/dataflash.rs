//! Emulated AT45 DataFlash behind an SPI master

use stormloader_core::config::{EXTERNAL_BLOCK_SIZE, EXTERNAL_CEILING, EXTERNAL_PAGE_SIZE};
use stormloader_core::error::{Error, Result};
use stormloader_core::hal::SpiMaster;
use stormloader_core::spi::{opcodes, SpiCommand, Status1, Status2};

/// Status reads that report busy after each erase/program
const DEFAULT_BUSY_POLLS: u32 = 2;

/// In-memory DataFlash
///
/// Emulates the subset of the AT45 command set the bootloader uses. After
/// an erase or program the device reports busy for a configurable number of
/// status reads. Faults can be injected to keep it busy forever or to set
/// the erase/program error bit.
pub struct SimDataFlash {
    data: Vec<u8>,
    power_of_two: bool,
    busy_polls: u32,
    busy_remaining: u32,
    stuck_busy: bool,
    program_error: bool,
    epe: bool,
    transactions: Vec<u8>,
    delay_total_us: u64,
}

impl SimDataFlash {
    /// Create a fully erased 8 MiB device
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; EXTERNAL_CEILING as usize],
            power_of_two: false,
            busy_polls: DEFAULT_BUSY_POLLS,
            busy_remaining: 0,
            stuck_busy: false,
            program_error: false,
            epe: false,
            transactions: Vec::new(),
            delay_total_us: 0,
        }
    }

    /// Create a device whose first bytes are `image`
    pub fn with_data(image: &[u8]) -> Self {
        let mut flash = Self::new();
        let len = image.len().min(flash.data.len());
        flash.data[..len].copy_from_slice(&image[..len]);
        flash
    }

    /// Whole device contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable device contents, for seeding tests
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// True once the power-of-two page configuration was sent
    pub fn is_power_of_two(&self) -> bool {
        self.power_of_two
    }

    /// Status reads reporting busy after each erase/program
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Never report ready
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Set the erase/program error bit after every erase/program
    pub fn set_program_error(&mut self, fail: bool) {
        self.program_error = fail;
    }

    /// Opcodes of every transaction so far
    pub fn transactions(&self) -> &[u8] {
        &self.transactions
    }

    /// Number of transactions with the given opcode
    pub fn count(&self, opcode: u8) -> usize {
        self.transactions.iter().filter(|&&op| op == opcode).count()
    }

    /// Total time spent in `delay_us`
    pub fn delay_total_us(&self) -> u64 {
        self.delay_total_us
    }

    /// Forget recorded transactions
    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    fn range(&self, cmd: &SpiCommand<'_>, len: usize) -> Result<core::ops::Range<usize>> {
        let start = cmd.address.ok_or(Error::SpiTransferFailed)? as usize;
        let end = start + len;
        if end > self.data.len() {
            log::debug!("sim: DataFlash access past end ({:#x})", end);
            return Err(Error::SpiTransferFailed);
        }
        Ok(start..end)
    }

    fn aligned(&self, cmd: &SpiCommand<'_>, size: usize) -> Result<core::ops::Range<usize>> {
        let addr = cmd.address.ok_or(Error::SpiTransferFailed)? as usize;
        let start = addr & !(size - 1);
        let end = start + size;
        if end > self.data.len() {
            return Err(Error::SpiTransferFailed);
        }
        Ok(start..end)
    }

    fn start_operation(&mut self) {
        self.busy_remaining = self.busy_polls;
        self.epe = self.program_error;
    }

    fn status(&mut self) -> (Status1, Status2) {
        let ready = if self.stuck_busy {
            false
        } else if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            false
        } else {
            true
        };

        let mut s1 = Status1::empty();
        let mut s2 = Status2::empty();
        if ready {
            s1 |= Status1::RDY;
            s2 |= Status2::RDY;
        }
        if self.power_of_two {
            s1 |= Status1::PAGE_SIZE;
        }
        if self.epe {
            s2 |= Status2::EPE;
        }
        (s1, s2)
    }

    fn handle_erase(&mut self, cmd: &SpiCommand<'_>, size: usize) -> Result<()> {
        let range = self.aligned(cmd, size)?;
        self.data[range].fill(0xFF);
        self.start_operation();
        Ok(())
    }

    /// Program through the buffer with built-in erase: the rest of the page
    /// reads back erased
    fn handle_program(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        let page = self.aligned(cmd, EXTERNAL_PAGE_SIZE)?;
        let target = self.range(cmd, cmd.write_data.len())?;
        if target.end > page.end {
            return Err(Error::SpiTransferFailed);
        }
        self.data[page].fill(0xFF);
        self.data[target].copy_from_slice(cmd.write_data);
        self.start_operation();
        Ok(())
    }

    /// Read-modify-write: bytes outside the written range keep their value
    fn handle_rewrite(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        let target = self.range(cmd, cmd.write_data.len())?;
        self.data[target].copy_from_slice(cmd.write_data);
        self.start_operation();
        Ok(())
    }

    fn handle_read(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let range = self.range(cmd, cmd.read_buf.len())?;
        cmd.read_buf.copy_from_slice(&self.data[range]);
        Ok(())
    }
}

impl Default for SimDataFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiMaster for SimDataFlash {
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        self.transactions.push(cmd.opcode);

        match cmd.opcode {
            opcodes::RDSR => {
                let (s1, s2) = self.status();
                if let Some(b) = cmd.read_buf.get_mut(0) {
                    *b = s1.bits();
                }
                if let Some(b) = cmd.read_buf.get_mut(1) {
                    *b = s2.bits();
                }
                Ok(())
            }

            opcodes::RESET if cmd.write_data == opcodes::RESET_SEQ => {
                self.busy_remaining = 0;
                self.epe = false;
                Ok(())
            }

            opcodes::CONFIGURE if cmd.write_data == opcodes::POWER_OF_TWO_SEQ => {
                self.power_of_two = true;
                Ok(())
            }

            opcodes::READ_HF => self.handle_read(cmd),
            opcodes::BE => self.handle_erase(cmd, EXTERNAL_BLOCK_SIZE as usize),
            opcodes::PE => self.handle_erase(cmd, EXTERNAL_PAGE_SIZE),
            opcodes::PP_BUF1 => self.handle_program(cmd),
            opcodes::RMW_BUF1 => self.handle_rewrite(cmd),

            op => {
                log::debug!("sim: unsupported DataFlash opcode {:#04x}", op);
                Err(Error::SpiTransferFailed)
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_total_us += us as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormloader_core::xflash;

    #[test]
    fn test_busy_then_ready() {
        let mut flash = SimDataFlash::new();
        flash.set_busy_polls(3);
        xflash::erase_block(&mut flash, 0x800).unwrap();
        // erase + 3 busy reads + 1 ready read
        assert_eq!(flash.count(opcodes::RDSR), 4);
        assert_eq!(flash.delay_total_us(), 15);
    }

    #[test]
    fn test_program_error_reported() {
        let mut flash = SimDataFlash::new();
        flash.set_program_error(true);
        let page = [0u8; EXTERNAL_PAGE_SIZE];
        assert_eq!(
            xflash::program_page(&mut flash, 0x1000, &page),
            Err(Error::XflashProgramError)
        );
    }

    #[test]
    fn test_program_erases_rest_of_page() {
        let mut flash = SimDataFlash::new();
        flash.data_mut()[0x1000..0x1100].fill(0x00);
        let page: Vec<u8> = (0..EXTERNAL_PAGE_SIZE).map(|i| i as u8).collect();
        xflash::program_page(&mut flash, 0x1000, &page).unwrap();
        let mut buf = [0u8; EXTERNAL_PAGE_SIZE];
        xflash::read(&mut flash, 0x1000, &mut buf).unwrap();
        assert_eq!(&buf[..], &page[..]);
    }

    #[test]
    fn test_init_sequence() {
        let mut flash = SimDataFlash::new();
        xflash::software_reset(&mut flash).unwrap();
        xflash::init_page_size(&mut flash).unwrap();
        assert!(flash.is_power_of_two());
        assert_eq!(flash.transactions(), &[opcodes::RESET, opcodes::CONFIGURE]);
    }
}
