/// Device number of file system root disk.
pub const ROOTDEV: u32 = 1;

/// Block size.
pub const BSIZE: usize = 1024;

/// Max # of blocks any FS op writes.
pub const MAXOPBLOCKS: usize = 10;

/// Max data blocks in one transaction header.
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// Number of log slots gathering transactions in parallel.
pub const LOGCOPIES: usize = 2;

/// Size of disk block cache.
///
/// Every slot may keep a full transaction pinned while ordinary reads still
/// find a free buffer.
pub const NBUF: usize = (LOGCOPIES + 1) * LOGSIZE;

/// Pipe buffer capacity in bytes.
pub const PIPESIZE: usize = 512;
