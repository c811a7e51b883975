//! Spin locks
use core::cell::UnsafeCell;
use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::{Guard, Lock, RawLock};

/// Mutual exclusion lock that busy waits (spin).
pub struct RawSpinlock {
    /// Name of lock.
    name: &'static str,

    /// Whether the lock is held.
    locked: AtomicBool,
}

/// Locks that busy wait (spin).
pub type Spinlock<T> = Lock<RawSpinlock, T>;
/// Guards of `Spinlock<T>`.
pub type SpinlockGuard<'s, T> = Guard<'s, RawSpinlock, T>;

impl RawSpinlock {
    /// Mutual exclusion spin locks.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
        }
    }
}

impl RawLock for RawSpinlock {
    /// Acquires the lock.
    /// Loops (spins) until the lock is acquired.
    ///
    /// To ensure that all stores done in one critical section are visible in
    /// the next critical section's loads, the exchange uses `Acquire`
    /// ordering, paired with the `Release` store in `RawSpinlock::release()`.
    fn acquire(&self) {
        let mut spins = 0u32;
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
            spins = spins.wrapping_add(1);
            // The holder may have been descheduled; give up the time slice
            // instead of burning it.
            if spins % 64 == 0 {
                thread::yield_now();
            }
        }
    }

    /// Releases the lock.
    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Spinlock<T> {
    /// Returns a new `Spinlock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSpinlock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}
