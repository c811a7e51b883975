use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::bio::BufData;

const FSMAGIC: u32 = 0x10203040;

/// Disk layout:
/// [ boot block | super block | log | data blocks ]
///
/// mkfs computes the super block and builds an initial file system. The
/// super block describes the disk layout:
#[repr(C)]
#[derive(Copy, Clone, FromZeroes, FromBytes, AsBytes)]
pub struct Superblock {
    /// Must be FSMAGIC
    magic: U32<LittleEndian>,

    /// Size of file system image (blocks)
    size: U32<LittleEndian>,

    /// Number of data blocks
    nblocks: U32<LittleEndian>,

    /// Number of log blocks
    nlog: U32<LittleEndian>,

    /// Block number of first log block
    logstart: U32<LittleEndian>,
}

impl Superblock {
    /// Assembles the super block for a fresh image of `size` blocks whose
    /// log region spans `nlog` blocks starting at `logstart`.
    pub fn new(size: u32, nlog: u32, logstart: u32) -> Self {
        Self {
            magic: U32::new(FSMAGIC),
            size: U32::new(size),
            nblocks: U32::new(size - logstart - nlog),
            nlog: U32::new(nlog),
            logstart: U32::new(logstart),
        }
    }

    /// Reads the super block out of its buffer.
    pub fn read(data: &BufData) -> Self {
        let sb = Superblock::read_from_prefix(&data[..]).expect("superblock: short block");
        assert_eq!(sb.magic.get(), FSMAGIC, "invalid file system");
        sb
    }

    /// Serializes the super block into a buffer; the caller flushes it.
    pub fn write(&self, data: &mut BufData) {
        self.write_to_prefix(&mut data[..])
            .expect("superblock: short block");
    }

    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn nlog(&self) -> u32 {
        self.nlog.get()
    }

    pub fn logstart(&self) -> u32 {
        self.logstart.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_block() {
        let sb = Superblock::new(128, 62, 2);
        let mut data = BufData::zeroed();
        sb.write(&mut data);

        let out = Superblock::read(&data);
        assert_eq!(out.size(), 128);
        assert_eq!(out.nlog(), 62);
        assert_eq!(out.logstart(), 2);
    }

    #[test]
    #[should_panic(expected = "invalid file system")]
    fn bad_magic_panics() {
        let data = BufData::zeroed();
        let _ = Superblock::read(&data);
    }
}
