//! Buffer cache.
//!
//! The buffer cache holds cached copies of disk block contents. Caching disk
//! blocks in memory reduces the number of disk reads and also provides a
//! synchronization point for disk blocks used by multiple tasks.
//!
//! Interface:
//! * To get a buffer for a particular disk block, call `Bcache::read`.
//! * After changing buffer data, call `Buf::write` to write it to disk.
//! * Dropping a `Buf` releases it; `Buf::unlock` instead keeps the block
//!   pinned in the cache while giving up the lock.
//! * Only one task at a time can use a buffer, so do not keep them longer
//!   than necessary.

use core::mem::{self, ManuallyDrop};
use core::ops::{Deref, DerefMut};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::disk::Disk;
use crate::lock::{Sleeplock, Spinlock};
use crate::param::{BSIZE, NBUF};

/// One block's worth of bytes, aligned so on-disk structs can overlay it.
#[derive(Clone)]
#[repr(C, align(8))]
pub struct BufData {
    inner: [u8; BSIZE],
}

impl BufData {
    pub const fn zeroed() -> Self {
        Self { inner: [0; BSIZE] }
    }

    pub fn copy_from(&mut self, other: &BufData) {
        self.inner.copy_from_slice(&other.inner);
    }
}

impl Deref for BufData {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for BufData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

struct BufInner {
    /// Has data been read from disk?
    valid: bool,
    data: BufData,
}

/// A cached block. Identity is fixed for the life of the entry; the cache
/// replaces whole entries instead of renaming them.
struct BufEntry {
    dev: u32,
    blockno: u32,
    disk: Arc<dyn Disk>,
    inner: Sleeplock<BufInner>,
}

/// Buffer cache over a block device.
pub struct Bcache {
    disk: Arc<dyn Disk>,

    /// Cached entries, least recently used first.
    entries: Spinlock<VecDeque<Arc<BufEntry>>>,
}

impl Bcache {
    pub fn new(disk: Arc<dyn Disk>) -> Self {
        Self {
            disk,
            entries: Spinlock::new("bcache", VecDeque::new()),
        }
    }

    /// Looks through the cache for block `blockno` on device `dev`,
    /// allocating an entry if it is not cached. Returns an unlocked entry.
    fn get(&self, dev: u32, blockno: u32) -> Arc<BufEntry> {
        let mut entries = self.entries.lock();

        // Is the block already cached?
        if let Some(pos) = entries
            .iter()
            .position(|e| e.dev == dev && e.blockno == blockno)
        {
            let entry = Arc::clone(&entries[pos]);
            // Move to the most recently used position.
            let _ = entries.remove(pos);
            entries.push_back(Arc::clone(&entry));
            return entry;
        }

        // Not cached; recycle the least recently used unreferenced entry.
        if entries.len() >= NBUF {
            let victim = entries
                .iter()
                .position(|e| Arc::strong_count(e) == 1)
                .expect("bget: no buffers");
            let _ = entries.remove(victim);
        }

        let entry = Arc::new(BufEntry {
            dev,
            blockno,
            disk: Arc::clone(&self.disk),
            inner: Sleeplock::new(
                "buffer",
                BufInner {
                    valid: false,
                    data: BufData::zeroed(),
                },
            ),
        });
        entries.push_back(Arc::clone(&entry));
        entry
    }

    /// Returns a locked buf with the contents of the indicated block.
    pub fn read(&self, dev: u32, blockno: u32) -> Buf {
        let mut buf = Buf::acquire(self.get(dev, blockno));
        if !buf.inner().valid {
            self.disk.read(dev, blockno, &mut buf.inner_mut().data);
            buf.inner_mut().valid = true;
        }
        buf
    }
}

/// A locked buffer: exclusive access to one cached block's bytes.
pub struct Buf {
    /// Invariant: the entry's sleep-lock is held by this handle.
    entry: ManuallyDrop<Arc<BufEntry>>,
}

impl Buf {
    fn acquire(entry: Arc<BufEntry>) -> Self {
        // Hold the raw sleep-lock for the lifetime of this handle; released
        // in `drop` or `unlock`.
        mem::forget(entry.inner.lock());
        Self {
            entry: ManuallyDrop::new(entry),
        }
    }

    fn inner(&self) -> &BufInner {
        // SAFETY: this handle holds the entry's sleep-lock.
        unsafe { &*self.entry.inner.get_mut_raw() }
    }

    fn inner_mut(&mut self) -> &mut BufInner {
        // SAFETY: this handle holds the entry's sleep-lock, and `&mut self`
        // is exclusive.
        unsafe { &mut *self.entry.inner.get_mut_raw() }
    }

    pub fn dev(&self) -> u32 {
        self.entry.dev
    }

    pub fn blockno(&self) -> u32 {
        self.entry.blockno
    }

    /// Writes the buffer's contents through to disk.
    pub fn write(&mut self) {
        let entry = &**self.entry;
        entry.disk.write(entry.dev, entry.blockno, &self.inner().data);
    }

    /// Releases the lock but keeps the block pinned: the cache will not
    /// recycle the entry while the returned handle is alive.
    pub fn unlock(mut self) -> BufUnlocked {
        // SAFETY: `self` is forgotten below, so its drop handler never runs
        // and `entry` is not touched again through it.
        let entry = unsafe { ManuallyDrop::take(&mut self.entry) };
        // SAFETY: the lock was acquired in `acquire` and its guard forgotten.
        unsafe { entry.inner.unlock() };
        mem::forget(self);
        BufUnlocked { entry }
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        // SAFETY: the lock was acquired in `acquire` and its guard forgotten.
        unsafe { self.entry.inner.unlock() };
        // SAFETY: `entry` is not used after this point.
        unsafe { ManuallyDrop::drop(&mut self.entry) };
    }
}

impl Deref for Buf {
    type Target = BufData;

    fn deref(&self) -> &Self::Target {
        &self.inner().data
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner_mut().data
    }
}

/// An unlocked buffer handle that keeps its block pinned in the cache.
/// The journal holds one of these for every block of an open transaction,
/// from `log_write` until install.
pub struct BufUnlocked {
    entry: Arc<BufEntry>,
}

impl BufUnlocked {
    pub fn blockno(&self) -> u32 {
        self.entry.blockno
    }

    /// Locks the buffer again.
    pub fn lock(self) -> Buf {
        Buf::acquire(self.entry)
    }
}
