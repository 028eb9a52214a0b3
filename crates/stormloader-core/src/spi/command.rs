//! SPI command structure

/// Number of address bytes sent after the opcode (24-bit, big endian)
pub const ADDRESS_BYTES: usize = 3;

/// A single SPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
/// On the wire: opcode, optional 3-byte address, `dummy_bytes` zero bytes,
/// `write_data`, then `read_buf.len()` bytes clocked in.
pub struct SpiCommand<'a> {
    /// The opcode byte
    pub opcode: u8,

    /// Address (if any)
    pub address: Option<u32>,

    /// Number of don't-care bytes after the address
    pub dummy_bytes: u8,

    /// Data to write after opcode/address/dummy
    pub write_data: &'a [u8],

    /// Buffer to read into (mutable)
    pub read_buf: &'a mut [u8],
}

impl<'a> SpiCommand<'a> {
    /// Create a read register command with no address (e.g., status read)
    pub fn read_reg(opcode: u8, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: None,
            dummy_bytes: 0,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create a write command with no address (e.g., configuration sequences)
    pub fn write_reg(opcode: u8, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: None,
            dummy_bytes: 0,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create an addressed read command
    pub fn read(opcode: u8, addr: u32, dummy_bytes: u8, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            dummy_bytes,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create an addressed write command
    pub fn write(opcode: u8, addr: u32, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            dummy_bytes: 0,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create an addressed erase command
    pub fn erase(opcode: u8, addr: u32) -> Self {
        Self {
            opcode,
            address: Some(addr),
            dummy_bytes: 0,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Returns true if this command has an address phase
    pub fn has_address(&self) -> bool {
        self.address.is_some()
    }

    /// Bytes before `write_data`: opcode, address, dummy
    pub fn header_len(&self) -> usize {
        let addr = if self.has_address() { ADDRESS_BYTES } else { 0 };
        1 + addr + self.dummy_bytes as usize
    }

    /// Encode opcode, address and dummy bytes into `buf`
    ///
    /// `buf` must hold at least [`header_len`](Self::header_len) bytes.
    /// Returns the number of bytes written.
    pub fn encode_header(&self, buf: &mut [u8]) -> usize {
        let len = self.header_len();
        buf[0] = self.opcode;
        if let Some(addr) = self.address {
            buf[1] = (addr >> 16) as u8;
            buf[2] = (addr >> 8) as u8;
            buf[3] = addr as u8;
        }
        let dummy_start = len - self.dummy_bytes as usize;
        buf[dummy_start..len].fill(0);
        len
    }

    /// Calculate the total number of bytes clocked on the bus
    pub fn total_bytes(&self) -> usize {
        self.header_len() + self.write_data.len() + self.read_buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_read_header() {
        let mut buf = [0u8; 4];
        let cmd = SpiCommand::read(0x1B, 0x01_2345, 2, &mut buf);
        let mut header = [0xAAu8; 8];
        let n = cmd.encode_header(&mut header);
        assert_eq!(n, 6);
        assert_eq!(&header[..n], &[0x1B, 0x01, 0x23, 0x45, 0x00, 0x00]);
        assert_eq!(cmd.total_bytes(), 10);
    }

    #[test]
    fn test_encode_simple_header() {
        let cmd = SpiCommand::write_reg(0x3D, &[0x2A, 0x80, 0xA6]);
        let mut header = [0u8; 4];
        assert_eq!(cmd.encode_header(&mut header), 1);
        assert_eq!(header[0], 0x3D);
        assert!(!cmd.has_address());
    }
}
