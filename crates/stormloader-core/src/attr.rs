//! Attribute store
//!
//! Sixteen fixed 64-byte records at the start of external flash, each
//! laid out as `[tag:8][len:1][value:len][padding]`. A set rewrites only
//! the tag/length/value prefix of one record through the device buffer.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::{ATTR_MAX_VALUE, ATTR_RECORD_SIZE, ATTR_SLOTS, ATTR_TAG_LEN};
use crate::error::{Error, Result};
use crate::hal::SpiMaster;
use crate::xflash;

/// One attribute slot as stored in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct AttributeRecord {
    /// Attribute name, usually ASCII padded with zeros
    pub tag: [u8; ATTR_TAG_LEN],
    /// Number of valid bytes in `value`
    pub len: u8,
    /// Value bytes; only the first `len` are meaningful
    pub value: [u8; ATTR_MAX_VALUE],
}

const _: () = assert!(core::mem::size_of::<AttributeRecord>() == ATTR_RECORD_SIZE);

impl AttributeRecord {
    /// Build a record, rejecting values longer than the slot allows
    pub fn new(tag: [u8; ATTR_TAG_LEN], value: &[u8]) -> Result<Self> {
        if value.len() > ATTR_MAX_VALUE {
            return Err(Error::BadArgs);
        }
        let mut record = Self {
            tag,
            len: value.len() as u8,
            value: [0; ATTR_MAX_VALUE],
        };
        record.value[..value.len()].copy_from_slice(value);
        Ok(record)
    }

    /// Valid value bytes
    ///
    /// An erased slot reads back with `len == 0xFF`; the length is clamped
    /// so the slice never runs past the record.
    pub fn value(&self) -> &[u8] {
        let len = (self.len as usize).min(ATTR_MAX_VALUE);
        &self.value[..len]
    }

    /// True if the slot holds erased flash
    pub fn is_erased(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0xFF)
    }

    /// Bytes actually written by a set: tag, length and value
    fn written_prefix(&self) -> &[u8] {
        &self.as_bytes()[..ATTR_TAG_LEN + 1 + self.value().len()]
    }
}

/// External flash address of a slot
pub const fn slot_address(slot: u8) -> u32 {
    slot as u32 * ATTR_RECORD_SIZE as u32
}

fn check_slot(slot: u8) -> Result<()> {
    if slot >= ATTR_SLOTS {
        log::warn!("attr: slot {} out of range", slot);
        return Err(Error::BadArgs);
    }
    Ok(())
}

/// Store `tag`/`value` in `slot`
///
/// All argument checks happen before any SPI traffic.
pub fn set_attribute<M: SpiMaster + ?Sized>(
    master: &mut M,
    slot: u8,
    tag: [u8; ATTR_TAG_LEN],
    value: &[u8],
) -> Result<()> {
    check_slot(slot)?;
    let record = AttributeRecord::new(tag, value)?;
    log::debug!("attr: set slot {} ({} value bytes)", slot, value.len());
    xflash::read_modify_write(master, slot_address(slot), record.written_prefix())
}

/// Read the full record in `slot`
pub fn get_attribute<M: SpiMaster + ?Sized>(master: &mut M, slot: u8) -> Result<AttributeRecord> {
    check_slot(slot)?;
    let mut buf = [0u8; ATTR_RECORD_SIZE];
    xflash::read(master, slot_address(slot), &mut buf)?;
    AttributeRecord::read_from_bytes(&buf).map_err(|_| Error::BadArgs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let record = AttributeRecord::new(*b"version\0", b"hi").unwrap();
        let bytes = record.as_bytes();
        assert_eq!(bytes.len(), ATTR_RECORD_SIZE);
        assert_eq!(&bytes[..8], b"version\0");
        assert_eq!(bytes[8], 2);
        assert_eq!(&bytes[9..11], b"hi");
        assert_eq!(record.written_prefix().len(), 11);
    }

    #[test]
    fn test_value_too_long() {
        let value = [0u8; ATTR_MAX_VALUE + 1];
        assert_eq!(AttributeRecord::new([0; 8], &value), Err(Error::BadArgs));
        assert!(AttributeRecord::new([0; 8], &value[..ATTR_MAX_VALUE]).is_ok());
    }

    #[test]
    fn test_erased_record_value_is_clamped() {
        let record = AttributeRecord::read_from_bytes(&[0xFF; ATTR_RECORD_SIZE]).unwrap();
        assert!(record.is_erased());
        assert_eq!(record.value().len(), ATTR_MAX_VALUE);
    }

    #[test]
    fn test_slot_addresses() {
        assert_eq!(slot_address(0), 0);
        assert_eq!(slot_address(15), 960);
        assert_eq!(check_slot(16), Err(Error::BadArgs));
    }
}
