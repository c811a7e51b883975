//! Sleepable locks
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use super::{RawLock, RawSpinlock, Waitable};
use crate::proc::WaitChannel;

/// A spinlock paired with a wait channel for conditions on its data.
pub struct Sleepablelock<T> {
    lock: RawSpinlock,
    /// WaitChannel for conditions on the protected data.
    waitchannel: WaitChannel,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Sleepablelock<T> {}

pub struct SleepablelockGuard<'s, T> {
    lock: &'s Sleepablelock<T>,
    _marker: PhantomData<*const ()>,
}

// Do not implement Send; a guard must be dropped by the thread that acquired it.
unsafe impl<'s, T: Sync> Sync for SleepablelockGuard<'s, T> {}

impl<T> Sleepablelock<T> {
    /// Returns a new `Sleepablelock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSpinlock::new(name),
            waitchannel: WaitChannel::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SleepablelockGuard<'_, T> {
        self.lock.acquire();

        SleepablelockGuard {
            lock: self,
            _marker: PhantomData,
        }
    }
}

impl<T> SleepablelockGuard<'_, T> {
    /// Atomically releases the lock and sleeps on the lock's wait channel.
    /// Holds the lock again when it returns; the caller must re-check its
    /// condition in a loop.
    pub fn sleep(&mut self) {
        let lock = self.lock;
        lock.waitchannel.sleep(self);
    }

    /// Wakes up all threads sleeping on the lock's wait channel.
    pub fn wakeup(&self) {
        self.lock.waitchannel.wakeup();
    }
}

impl<T> Waitable for SleepablelockGuard<'_, T> {
    unsafe fn raw_release(&mut self) {
        self.lock.lock.release();
    }

    unsafe fn raw_acquire(&mut self) {
        self.lock.lock.acquire();
    }
}

impl<T> Drop for SleepablelockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.lock.release();
    }
}

impl<T> Deref for SleepablelockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the lock is held while the guard is alive.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepablelockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the lock is held and `&mut self` is exclusive.
        unsafe { &mut *self.lock.data.get() }
    }
}
