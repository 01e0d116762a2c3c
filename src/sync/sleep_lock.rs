//! Sleeping Lock
//!
//! Mutual exclusion for long critical sections (filesystem calls, console
//! blocks). Contenders block instead of spinning, which matters on a single
//! core: a spinning thread would starve the preempted holder forever.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use super::Semaphore;
use crate::cpu::Cpu;

/// A lock whose waiters sleep.
pub struct SleepLock<T: ?Sized> {
    sema: Semaphore,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by the binary semaphore; the guard
// is the only path to the value.
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// Create an unlocked lock.
    pub const fn new(value: T) -> Self {
        Self {
            sema: Semaphore::new(1),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// Acquire the lock, sleeping while another thread holds it.
    ///
    /// Must not be called from interrupt context.
    pub fn lock<'a>(&'a self, cpu: &'a dyn Cpu) -> SleepLockGuard<'a, T> {
        self.sema.down(cpu);
        SleepLockGuard { lock: self, cpu }
    }
}

/// Holds a [`SleepLock`] until dropped.
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    cpu: &'a dyn Cpu,
}

impl<T: ?Sized> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while the semaphore is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` makes the borrow unique.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.sema.up(self.cpu);
    }
}
