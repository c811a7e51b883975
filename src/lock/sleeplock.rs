//! Sleeping locks
use core::cell::UnsafeCell;
use std::thread::{self, ThreadId};

use super::{Guard, Lock, RawLock, Sleepablelock};

/// Long-term locks that sleep instead of busy wait, for data held across
/// blocking operations such as disk I/O.
pub struct RawSleeplock {
    /// Thread holding the lock. `None` means unlocked.
    locked: Sleepablelock<Option<ThreadId>>,

    /// Name of lock for debugging.
    name: &'static str,
}

/// Locks that sleep instead of busy wait.
pub type Sleeplock<T> = Lock<RawSleeplock, T>;
/// Guards of `Sleeplock<T>`.
pub type SleeplockGuard<'s, T> = Guard<'s, RawSleeplock, T>;

impl RawSleeplock {
    const fn new(name: &'static str) -> Self {
        Self {
            locked: Sleepablelock::new("sleep lock", None),
            name,
        }
    }
}

impl RawLock for RawSleeplock {
    fn acquire(&self) {
        let mut guard = self.locked.lock();
        while guard.is_some() {
            guard.sleep();
        }
        *guard = Some(thread::current().id());
    }

    fn release(&self) {
        let mut guard = self.locked.lock();
        *guard = None;
        guard.wakeup();
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Sleeplock<T> {
    /// Returns a new `Sleeplock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSleeplock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}
