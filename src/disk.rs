//! Block devices.
//!
//! The buffer cache talks to the device through the [`Disk`] trait. Reads
//! and writes are synchronous: when `write` returns, the block is durable.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::bio::BufData;
use crate::lock::Spinlock;
use crate::param::BSIZE;

pub trait Disk: Send + Sync {
    /// Reads block `blockno` of device `dev` into `data`.
    fn read(&self, dev: u32, blockno: u32, data: &mut BufData);

    /// Writes `data` to block `blockno` of device `dev`, synchronously.
    fn write(&self, dev: u32, blockno: u32, data: &BufData);
}

/// An in-memory disk image.
pub struct MemDisk {
    blocks: Spinlock<Vec<BufData>>,
}

impl MemDisk {
    /// Returns a zeroed image of `size` blocks.
    pub fn new(size: u32) -> Self {
        Self {
            blocks: Spinlock::new("memdisk", vec![BufData::zeroed(); size as usize]),
        }
    }
}

impl Disk for MemDisk {
    fn read(&self, _dev: u32, blockno: u32, data: &mut BufData) {
        data.copy_from(&self.blocks.lock()[blockno as usize]);
    }

    fn write(&self, _dev: u32, blockno: u32, data: &BufData) {
        self.blocks.lock()[blockno as usize].copy_from(data);
    }
}

/// A disk backed by a host file of `size` blocks, durable across reopens.
pub struct FileDisk {
    file: Spinlock<File>,
}

impl FileDisk {
    /// Creates a zeroed image of `size` blocks at `path`.
    pub fn create(path: &Path, size: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64 * BSIZE as u64)?;
        Ok(Self {
            file: Spinlock::new("filedisk", file),
        })
    }

    /// Opens an existing image.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file: Spinlock::new("filedisk", file),
        })
    }
}

impl Disk for FileDisk {
    fn read(&self, _dev: u32, blockno: u32, data: &mut BufData) {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(blockno as u64 * BSIZE as u64))
            .expect("filedisk: seek");
        file.read_exact(&mut data[..]).expect("filedisk: read");
    }

    fn write(&self, _dev: u32, blockno: u32, data: &BufData) {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(blockno as u64 * BSIZE as u64))
            .expect("filedisk: seek");
        file.write_all(&data[..]).expect("filedisk: write");
        // Log appends are synchronous; make the write durable now.
        file.sync_data().expect("filedisk: sync");
    }
}
