//! Bounded, blocking byte pipes.
//!
//! A pipe is a fixed-size ring of bytes between a reader and a writer.
//! Writers sleep while the ring is full, readers while it is empty; each
//! side wakes the other through its own wait channel. Copies move whole
//! contiguous spans, so a call crosses the ring boundary in at most two
//! copies.

use std::sync::Arc;

use thiserror::Error;

use crate::lock::Spinlock;
use crate::param::PIPESIZE;
use crate::proc::{Task, WaitChannel};

/// Errors surfaced by pipe reads and writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipeError {
    /// The read end is closed; nothing can observe further writes.
    #[error("read end of pipe is closed")]
    ReadClosed,

    /// The calling task was asked to terminate.
    #[error("task killed")]
    Killed,
}

struct PipeInner {
    data: [u8; PIPESIZE],

    /// Number of bytes read.
    nread: u32,

    /// Number of bytes written.
    nwrite: u32,

    /// Read end is still open.
    readopen: bool,

    /// Write end is still open.
    writeopen: bool,
}

pub struct Pipe {
    inner: Spinlock<PipeInner>,

    /// WaitChannel for saying there are unread bytes in data.
    read_waitchannel: WaitChannel,

    /// WaitChannel for saying there is room to write in data.
    write_waitchannel: WaitChannel,
}

impl Pipe {
    /// Creates a pipe and returns its two endpoint handles.
    pub fn alloc() -> (PipeReader, PipeWriter) {
        let pipe = Arc::new(Pipe {
            inner: Spinlock::new(
                "pipe",
                PipeInner {
                    data: [0; PIPESIZE],
                    nread: 0,
                    nwrite: 0,
                    readopen: true,
                    writeopen: true,
                },
            ),
            read_waitchannel: WaitChannel::new(),
            write_waitchannel: WaitChannel::new(),
        });
        (
            PipeReader {
                pipe: Arc::clone(&pipe),
            },
            PipeWriter { pipe },
        )
    }

    fn write(&self, src: &[u8], task: &Task) -> Result<usize, PipeError> {
        let mut inner = self.inner.lock();
        let mut i = 0;
        while i < src.len() {
            if !inner.readopen {
                return Err(PipeError::ReadClosed);
            }
            if task.killed() {
                return Err(PipeError::Killed);
            }
            if inner.nwrite == inner.nread.wrapping_add(PIPESIZE as u32) {
                // Ring is full; drain it before sleeping.
                self.read_waitchannel.wakeup();
                self.write_waitchannel.sleep(&mut inner);
            } else {
                // Copy one contiguous span: bounded by the bytes left to
                // write, the free space, and the distance to the ring's end.
                let occupied = inner.nwrite.wrapping_sub(inner.nread) as usize;
                let off = inner.nwrite as usize % PIPESIZE;
                let delta = (src.len() - i)
                    .min(PIPESIZE - occupied)
                    .min(PIPESIZE - off);

                inner.data[off..off + delta].copy_from_slice(&src[i..i + delta]);
                inner.nwrite = inner.nwrite.wrapping_add(delta as u32);
                i += delta;
            }
        }
        self.read_waitchannel.wakeup();
        Ok(i)
    }

    fn read(&self, dst: &mut [u8], task: &Task) -> Result<usize, PipeError> {
        let mut inner = self.inner.lock();
        while inner.nread == inner.nwrite && inner.writeopen {
            if task.killed() {
                return Err(PipeError::Killed);
            }
            self.read_waitchannel.sleep(&mut inner);
        }

        let mut i = 0;
        while i < dst.len() {
            if inner.nread == inner.nwrite {
                break;
            }
            // Copy one contiguous span, as in write.
            let available = inner.nwrite.wrapping_sub(inner.nread) as usize;
            let off = inner.nread as usize % PIPESIZE;
            let delta = available.min(dst.len() - i).min(PIPESIZE - off);

            dst[i..i + delta].copy_from_slice(&inner.data[off..off + delta]);
            inner.nread = inner.nread.wrapping_add(delta as u32);
            i += delta;
        }
        self.write_waitchannel.wakeup();
        Ok(i)
    }

    fn close(&self, writable: bool) {
        let mut inner = self.inner.lock();
        if writable {
            inner.writeopen = false;
            self.read_waitchannel.wakeup();
        } else {
            inner.readopen = false;
            self.write_waitchannel.wakeup();
        }
    }
}

/// The reading end of a pipe. Dropping it closes the read side; the pipe's
/// storage is freed when the second endpoint goes away.
pub struct PipeReader {
    pipe: Arc<Pipe>,
}

impl PipeReader {
    /// Reads up to `dst.len()` bytes, sleeping while the pipe is empty and
    /// the writer is still open. Returns `Ok(0)` once the writer has closed
    /// and every pending byte has been drained.
    pub fn read(&self, dst: &mut [u8], task: &Task) -> Result<usize, PipeError> {
        self.pipe.read(dst, task)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.pipe.close(false);
    }
}

/// The writing end of a pipe.
pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

impl PipeWriter {
    /// Writes all of `src`, sleeping as the pipe fills. Fails without
    /// reporting a byte count if the reader closes or the task is killed,
    /// even when part of `src` was already transferred.
    pub fn write(&self, src: &[u8], task: &Task) -> Result<usize, PipeError> {
        self.pipe.write(src, task)
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.pipe.close(true);
    }
}
