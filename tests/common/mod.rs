#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use slotlog::param::{LOGCOPIES, LOGSIZE};
use slotlog::{BufData, Disk, MemDisk, Superblock};

pub const DEV: u32 = 1;
pub const FSSIZE: u32 = 128;
pub const LOGSTART: u32 = 2;
pub const NLOG: u32 = (LOGCOPIES * (LOGSIZE + 1)) as u32;
pub const SLOTSIZE: u32 = NLOG / LOGCOPIES as u32;
pub const DATASTART: u32 = LOGSTART + NLOG;

/// Writes a fresh superblock straight onto the device.
pub fn mkfs<D: Disk>(disk: &D, size: u32) -> Superblock {
    let sb = Superblock::new(size, NLOG, LOGSTART);
    let mut data = BufData::zeroed();
    sb.write(&mut data);
    disk.write(DEV, 1, &data);
    sb
}

pub fn read_raw<D: Disk>(disk: &D, blockno: u32) -> BufData {
    let mut data = BufData::zeroed();
    disk.read(DEV, blockno, &mut data);
    data
}

/// The `n` field of a log header image.
pub fn header_n(data: &BufData) -> u32 {
    u32::from_le_bytes(data[..4].try_into().unwrap())
}

/// The block-number list of a log header image.
pub fn header_blocks(data: &BufData) -> Vec<u32> {
    (0..header_n(data) as usize)
        .map(|i| u32::from_le_bytes(data[4 + 4 * i..8 + 4 * i].try_into().unwrap()))
        .collect()
}

/// The sequence number of a log header image.
pub fn header_seq(data: &BufData) -> u64 {
    let off = 4 + 4 * LOGSIZE;
    u64::from_le_bytes(data[off..off + 8].try_into().unwrap())
}

/// A disk that records every write in order, so a test can replay the first
/// `k` of them onto a fresh image: "the machine crashed at write k".
pub struct RecordingDisk {
    size: u32,
    inner: MemDisk,
    writes: Mutex<Vec<(u32, BufData)>>,
}

impl RecordingDisk {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            inner: MemDisk::new(size),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn writes(&self) -> Vec<(u32, BufData)> {
        self.writes.lock().unwrap().clone()
    }

    /// The image as it would look had the machine crashed after the first
    /// `k` writes. Assumes the image started zeroed.
    pub fn replay(&self, k: usize) -> MemDisk {
        let disk = MemDisk::new(self.size);
        for (blockno, data) in self.writes.lock().unwrap().iter().take(k) {
            disk.write(DEV, *blockno, data);
        }
        disk
    }

    /// Copies another image into this disk without recording the copies.
    pub fn preload_from<D: Disk>(&self, src: &D) {
        for blockno in 0..self.size {
            let mut data = BufData::zeroed();
            src.read(DEV, blockno, &mut data);
            self.inner.write(DEV, blockno, &data);
        }
    }

    /// Writes to `blockno` so far.
    pub fn writes_to(&self, blockno: u32) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(b, _)| *b == blockno)
            .count()
    }
}

impl Disk for RecordingDisk {
    fn read(&self, dev: u32, blockno: u32, data: &mut BufData) {
        self.inner.read(dev, blockno, data);
    }

    fn write(&self, dev: u32, blockno: u32, data: &BufData) {
        self.writes.lock().unwrap().push((blockno, data.clone()));
        self.inner.write(dev, blockno, data);
    }
}

/// Copies the first `size` blocks of `src` into a fresh in-memory image.
pub fn clone_mem<D: Disk>(src: &D, size: u32) -> MemDisk {
    let disk = MemDisk::new(size);
    for blockno in 0..size {
        let mut data = BufData::zeroed();
        src.read(DEV, blockno, &mut data);
        disk.write(DEV, blockno, &data);
    }
    disk
}

/// A disk whose writes take a while, to widen race windows in concurrency
/// tests.
pub struct SlowDisk {
    inner: MemDisk,
    delay: Duration,
}

impl SlowDisk {
    pub fn new(size: u32, delay: Duration) -> Self {
        Self {
            inner: MemDisk::new(size),
            delay,
        }
    }
}

impl Disk for SlowDisk {
    fn read(&self, dev: u32, blockno: u32, data: &mut BufData) {
        self.inner.read(dev, blockno, data);
    }

    fn write(&self, dev: u32, blockno: u32, data: &BufData) {
        std::thread::sleep(self.delay);
        self.inner.write(dev, blockno, data);
    }
}
