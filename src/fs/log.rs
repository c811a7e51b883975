//! Journaling that allows concurrent FS system calls.
//!
//! A log transaction contains the updates of multiple FS system calls.
//! Transactions gather in one of `LOGCOPIES` parallel slots; a slot commits
//! only when none of its calls is still active, so there is never any
//! reasoning required about whether a commit might write an uncommitted
//! system call's updates to disk. While one slot commits and installs, the
//! other slots keep accepting new calls.
//!
//! A system call should bracket itself with `begin_op()` / `Tx::end()`.
//! Usually `begin_op()` just joins the active slot and returns. But if every
//! slot is committing, or the active slot is close to running out of space,
//! it moves on or sleeps until an outstanding commit finishes.
//!
//! Each slot seals with a sequence number, and slots install strictly in
//! sequence order: a committer whose slot sealed later waits for every
//! earlier slot to finish installing. Recovery replays committed slots in
//! the same order.
//!
//! The log is a physical re-do log containing disk blocks. The on-disk
//! format of one slot:
//!   header block, containing block #s for block A, B, C, ...
//!   block A
//!   block B
//!   block C
//!   ...
//! Log appends are synchronous.

use core::mem;
use std::sync::Arc;

use array_macro::array;
use arrayvec::ArrayVec;
use itertools::izip;
use log::info;
use static_assertions::const_assert;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::Superblock;
use crate::bio::{Bcache, Buf, BufUnlocked};
use crate::lock::{Sleepablelock, Spinlock};
use crate::param::{BSIZE, LOGCOPIES, LOGSIZE, MAXOPBLOCKS};

/// Contents of the header block of one log slot.
///
/// `n == 0` means the slot holds no committed transaction. All integers are
/// little-endian on disk.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes)]
struct LogHeader {
    n: U32<LittleEndian>,
    block: [U32<LittleEndian>; LOGSIZE],
    /// Sequence number stamped when the slot sealed; recovery installs
    /// committed slots in ascending order of this field.
    seq: U64<LittleEndian>,
}

const_assert!(mem::size_of::<LogHeader>() < BSIZE);
const_assert!(LOGSIZE >= MAXOPBLOCKS);

/// One log slot: a fixed region of the on-disk log plus the in-memory
/// transaction currently gathering into it.
struct LogSlot {
    /// Disk block number of this slot's header block.
    start: u32,

    /// Blocks reserved for this slot, header included.
    size: u32,

    state: Spinlock<SlotState>,
}

struct SlotState {
    /// How many FS sys calls are executing in this slot?
    outstanding: u32,

    /// In commit(), please wait.
    committing: bool,

    /// Sequence number taken when the slot sealed.
    seq: u64,

    /// Pinned buffers of the open transaction. Doubles as the in-memory
    /// header: the block-number list is read off the buffers.
    bufs: ArrayVec<BufUnlocked, LOGSIZE>,
}

/// Pool-wide admission and ordering state.
struct Pool {
    /// Index of the slot currently accepting new transactions.
    active: usize,

    /// Number of slots sealed and not yet installed.
    copies_committed: usize,

    /// Next sequence number to hand out.
    seq: u64,
}

/// The multi-slot journal. One instance per device, constructed at boot;
/// construction runs recovery before any transaction can start.
pub struct Journal {
    dev: u32,
    bcache: Arc<Bcache>,
    slots: [LogSlot; LOGCOPIES],

    /// Pool lock. Its wait channel backs both admission backpressure and
    /// install ordering; wakeups are broadcast and everyone re-checks.
    pool: Sleepablelock<Pool>,
}

/// An admitted transaction, tied to the slot that admitted it. Every block
/// write between `begin_op` and `end` goes through [`Tx::write`].
///
/// A transaction must be finished with [`Tx::end`]; dropping it is a bug in
/// the caller and panics.
pub struct Tx<'s> {
    journal: &'s Journal,
    slot: usize,

    /// Distinct blocks this call has logged so far; bounded by `MAXOPBLOCKS`.
    nwritten: usize,
}

impl Journal {
    /// Initializes the journal over the log region described by `sb` and
    /// recovers any committed transactions. Called once at boot, before the
    /// first `begin_op`.
    pub fn new(dev: u32, sb: &Superblock, bcache: Arc<Bcache>) -> Self {
        assert_eq!(
            sb.nlog() % LOGCOPIES as u32,
            0,
            "initlog: log not divisible into slots"
        );
        let size = sb.nlog() / LOGCOPIES as u32;
        assert!(size as usize > LOGSIZE, "initlog: slots too small");

        let journal = Self {
            dev,
            bcache,
            slots: array![i => LogSlot {
                start: sb.logstart() + i as u32 * size,
                size,
                state: Spinlock::new("log", SlotState {
                    outstanding: 0,
                    committing: false,
                    seq: 0,
                    bufs: ArrayVec::new(),
                }),
            }; LOGCOPIES],
            pool: Sleepablelock::new("logs", Pool {
                active: 0,
                copies_committed: 0,
                seq: 0,
            }),
        };
        journal.recover_from_log();
        journal
    }

    /// Called at the start of each FS system call. Blocks until the call is
    /// admitted into a slot with enough space that it can never overflow the
    /// slot's header, then returns the transaction handle.
    pub fn begin_op(&self) -> Tx<'_> {
        let mut pool = self.pool.lock();
        loop {
            if pool.copies_committed == LOGCOPIES {
                // Every slot is sealed; wait for an install to finish.
                pool.sleep();
                continue;
            }

            // Scan for a slot that can take this call, starting at the
            // active one.
            let mut admitted = None;
            for _ in 0..LOGCOPIES {
                let slot = &self.slots[pool.active];
                let mut state = slot.state.lock();
                if !state.committing
                    && state.bufs.len() + (state.outstanding as usize + 1) * MAXOPBLOCKS
                        <= LOGSIZE
                {
                    state.outstanding += 1;
                    admitted = Some(pool.active);
                    break;
                }
                // This slot is sealed, or this op might exhaust its space;
                // move on to the next one.
                drop(state);
                pool.active = (pool.active + 1) % LOGCOPIES;
            }

            match admitted {
                Some(slot) => {
                    return Tx {
                        journal: self,
                        slot,
                        nwritten: 0,
                    }
                }
                // Every slot is committing or too full for another full-size
                // call. Any end_op frees space or seals a slot, and wakes us.
                None => pool.sleep(),
            }
        }
    }

    /// Records that the caller modified `buf` as part of the transaction in
    /// `slot`, pinning it in the cache until install. Returns the updated
    /// distinct-block count.
    fn log_write(&self, slot: usize, nwritten: usize, buf: Buf) -> usize {
        let slot = &self.slots[slot];
        let mut state = slot.state.lock();

        assert!(
            state.bufs.len() < LOGSIZE && (state.bufs.len() as u32) < slot.size - 1,
            "too big a transaction"
        );
        assert!(state.outstanding >= 1, "log_write outside of trans");

        if state.bufs.iter().all(|b| b.blockno() != buf.blockno()) {
            // Add new block to log.
            state.bufs.push(buf.unlock());
            nwritten + 1
        } else {
            // Log absorption: the block is already in this slot's
            // transaction, so dropping `buf` just releases its lock.
            nwritten
        }
    }

    /// Called at the end of each FS system call. The call that brings its
    /// slot's outstanding count to zero seals the slot and drives it through
    /// commit and install, in sequence order across slots.
    fn end_op(&self, slot_idx: usize) {
        let slot = &self.slots[slot_idx];

        let seq;
        {
            let mut pool = self.pool.lock();
            let mut state = slot.state.lock();
            assert!(!state.committing, "log.committing");
            state.outstanding -= 1;

            if state.outstanding > 0 {
                // Decrementing outstanding has decreased the amount of
                // reserved slot space; admission waiters must re-check.
                pool.wakeup();
                return;
            }

            // Seal. Since outstanding is 0, no ongoing call is inside this
            // slot, and `committing` keeps new admissions out once the locks
            // drop.
            state.committing = true;
            seq = pool.seq;
            state.seq = seq;
            pool.seq += 1;
            pool.copies_committed += 1;
        }

        // First be sure this is the right slot to commit next: its sequence
        // number must be the lowest among the still-committing slots.
        {
            let mut pool = self.pool.lock();
            while seq + pool.copies_committed as u64 != pool.seq {
                pool.sleep();
            }
        }

        // Call commit w/o holding locks, since not allowed to sleep with
        // locks.
        self.commit(slot);

        let mut pool = self.pool.lock();
        let mut state = slot.state.lock();
        state.committing = false;
        pool.copies_committed -= 1;
        // Both admission waiters and later committers can make progress now.
        pool.wakeup();
    }

    /// Commits the sealed transaction in `slot` and installs it to its home
    /// locations. Runs without holding any lock.
    fn commit(&self, slot: &LogSlot) {
        let (bufs, seq) = {
            let mut state = slot.state.lock();
            (mem::take(&mut state.bufs), state.seq)
        };
        if bufs.is_empty() {
            return;
        }

        // Write modified blocks from cache to the slot's log region.
        self.write_log(slot, &bufs);

        // Write header to disk -- the real commit.
        self.write_head(slot, &bufs, seq);

        // Now install writes to home locations.
        self.install_trans(slot, bufs);

        // Erase the transaction from the log.
        self.write_head(slot, &[], seq);
    }

    /// Copies modified blocks from cache to the slot's log region.
    fn write_log(&self, slot: &LogSlot, bufs: &[BufUnlocked]) {
        for (tail, from) in bufs.iter().enumerate() {
            // Log block.
            let mut to = self.bcache.read(self.dev, slot.start + tail as u32 + 1);

            // Cache block. Pinned since log_write, so this hits the cache
            // and carries the caller's modifications.
            let from = self.bcache.read(self.dev, from.blockno());

            to.copy_from(&from);

            // Write the log.
            to.write();
        }
    }

    /// Writes the slot's header block. With a non-empty block list this is
    /// the true point at which the transaction commits; with an empty one it
    /// erases the slot.
    fn write_head(&self, slot: &LogSlot, bufs: &[BufUnlocked], seq: u64) {
        let mut buf = self.bcache.read(self.dev, slot.start);

        let mut header = LogHeader::new_zeroed();
        header.n = U32::new(bufs.len() as u32);
        header.seq = U64::new(seq);
        for (db, b) in izip!(&mut header.block, bufs) {
            *db = U32::new(b.blockno());
        }

        header
            .write_to_prefix(&mut buf[..])
            .expect("log header larger than a block");
        buf.write();
    }

    /// Copies committed blocks from the log to their home locations,
    /// unpinning each destination as it lands.
    fn install_trans(&self, slot: &LogSlot, bufs: ArrayVec<BufUnlocked, LOGSIZE>) {
        for (tail, dbuf) in bufs.into_iter().enumerate() {
            // Read log block.
            let lbuf = self.bcache.read(self.dev, slot.start + tail as u32 + 1);

            // Read dst.
            let mut dbuf = dbuf.lock();

            // Copy block to dst.
            dbuf.copy_from(&lbuf);

            // Write dst to disk.
            dbuf.write();

            // Dropping `dbuf` releases the pin taken in log_write.
        }
    }

    /// Replays whatever the log committed before a crash. Slots whose header
    /// has `n == 0` hold nothing; the rest install in ascending sequence
    /// order, each header cleared once its blocks are home.
    fn recover_from_log(&self) {
        let mut committed = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let buf = self.bcache.read(self.dev, slot.start);
            let header =
                LogHeader::read_from_prefix(&buf[..]).expect("log header larger than a block");
            drop(buf);

            let n = header.n.get() as usize;
            assert!(
                n <= LOGSIZE && n < slot.size as usize,
                "recovery: corrupt log header"
            );
            if n > 0 {
                committed.push((i, header));
            }
        }

        committed.sort_by_key(|(_, header)| header.seq.get());
        assert!(
            committed
                .windows(2)
                .all(|w| w[0].1.seq.get() != w[1].1.seq.get()),
            "recovery: duplicate sequence number"
        );

        let count = committed.len();
        let mut next_seq = 0;
        for (i, header) in committed {
            let slot = &self.slots[i];
            info!(
                "journal: installing slot {} (seq {}, {} blocks)",
                i,
                header.seq.get(),
                header.n.get()
            );

            for tail in 0..header.n.get() as usize {
                // Read log block.
                let lbuf = self.bcache.read(self.dev, slot.start + tail as u32 + 1);

                // Read dst.
                let mut dbuf = self.bcache.read(self.dev, header.block[tail].get());

                dbuf.copy_from(&lbuf);
                dbuf.write();
            }

            // Clear the slot.
            self.write_head(slot, &[], header.seq.get());
            next_seq = header.seq.get() + 1;
        }

        if count > 0 {
            info!("journal: recovered {} transactions", count);
        }
        self.pool.lock().seq = next_seq;
    }
}

impl Tx<'_> {
    /// Caller has modified `buf`'s data and is done with the buffer.
    /// Records the block number and keeps the block pinned in the cache;
    /// commit (or recovery) will do the disk write.
    ///
    /// `Tx::write` replaces `Buf::write`; a typical use is:
    ///   let mut buf = bcache.read(...);
    ///   // modify buf[..]
    ///   tx.write(buf);
    pub fn write(&mut self, buf: Buf) {
        self.nwritten = self.journal.log_write(self.slot, self.nwritten, buf);
        assert!(self.nwritten <= MAXOPBLOCKS, "too many blocks in one FS op");
    }

    /// Ends the transaction. Commits and installs the slot if this was its
    /// last outstanding call.
    pub fn end(self) {
        let journal = self.journal;
        let slot = self.slot;
        mem::forget(self);
        journal.end_op(slot);
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        panic!("transaction dropped without end()");
    }
}
