//! Core of a teaching kernel's file system: a multi-slot crash-consistent
//! journal, the buffer cache it writes through, and blocking byte pipes,
//! built over cooperative spinlock + wait-channel concurrency.
//!
//! File system calls bracket their block writes in a transaction:
//!
//! ```
//! use std::sync::Arc;
//! use slotlog::{Bcache, Journal, MemDisk, Superblock};
//!
//! let disk = Arc::new(MemDisk::new(128));
//! let bcache = Arc::new(Bcache::new(disk));
//!
//! // mkfs: the super block lives in block 1.
//! let sb = Superblock::new(128, 62, 2);
//! let mut buf = bcache.read(1, 1);
//! sb.write(&mut buf);
//! buf.write();
//! drop(buf);
//!
//! // Boot: construct the journal (this runs recovery), then run a call.
//! let journal = Journal::new(1, &sb, Arc::clone(&bcache));
//! let mut tx = journal.begin_op();
//! let mut buf = bcache.read(1, 100);
//! buf[0] = 42;
//! tx.write(buf);
//! tx.end();
//!
//! assert_eq!(bcache.read(1, 100)[0], 42);
//! ```

#![deny(elided_lifetimes_in_paths)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bio;
pub mod disk;
pub mod fs;
pub mod lock;
pub mod param;
pub mod pipe;
pub mod proc;

pub use bio::{Bcache, Buf, BufData, BufUnlocked};
pub use disk::{Disk, FileDisk, MemDisk};
pub use fs::{Journal, Superblock, Tx};
pub use pipe::{Pipe, PipeError, PipeReader, PipeWriter};
pub use proc::Task;
