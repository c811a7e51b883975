//! File system core: the superblock describing the disk layout and the
//! multi-slot journal that makes block updates crash-consistent.

mod log;
mod superblock;

pub use log::{Journal, Tx};
pub use superblock::Superblock;
