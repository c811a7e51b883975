//! Cooperative task context: wait channels and the kill flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

use crate::lock::{Spinlock, Waitable};

/// A rendezvous point for sleep/wakeup.
///
/// Wakeups are broadcast: every sleeper is resumed, and a sleeper may also
/// resume spuriously. Sleepers must re-check their condition in a loop.
pub struct WaitChannel {
    /// Threads currently sleeping on this channel.
    waiters: Spinlock<Vec<Thread>>,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self {
            waiters: Spinlock::new("waitchannel", Vec::new()),
        }
    }

    /// Atomically releases the guard's lock and sleeps on this channel.
    /// Holds the lock again when it returns.
    pub fn sleep<W: Waitable>(&self, guard: &mut W) {
        // Register before releasing the guard's lock. A waker changes the
        // awaited condition under that lock, so it cannot run `wakeup` (and
        // drain the list) between the caller's condition check and this push.
        self.waiters.lock().push(thread::current());

        // SAFETY: reacquired below before the guard is used again.
        unsafe { guard.raw_release() };
        thread::park();
        // SAFETY: paired with the release above.
        unsafe { guard.raw_acquire() };
    }

    /// Wakes up all threads sleeping on this channel.
    pub fn wakeup(&self) {
        let mut waiters = self.waiters.lock();
        for waiter in waiters.drain(..) {
            waiter.unpark();
        }
    }
}

impl Default for WaitChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task state visible to blocking kernel calls: the kill flag.
///
/// Pipe reads and writes poll the flag at every iteration of their wait
/// loops and fail once it is set.
pub struct Task {
    killed: AtomicBool,

    /// The thread running this task, once bound. `kill` unparks it so a
    /// sleeping task re-checks its wait condition and observes the flag,
    /// the way a kernel's kill wakes the victim process.
    thread: Spinlock<Option<Thread>>,
}

impl Task {
    pub const fn new() -> Self {
        Self {
            killed: AtomicBool::new(false),
            thread: Spinlock::new("task", None),
        }
    }

    /// Binds the calling thread as the one executing this task.
    pub fn bind(&self) {
        *self.thread.lock() = Some(thread::current());
    }

    /// Asks the task to terminate; blocking pipe calls return `Killed`.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
        if let Some(thread) = self.thread.lock().as_ref() {
            thread.unpark();
        }
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}
