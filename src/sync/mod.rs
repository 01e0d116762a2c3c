//! Kernel Synchronization
//!
//! Blocking primitives for thread context:
//! - `Semaphore`: counting, FIFO wakeup, `up` is interrupt-safe
//! - `SleepLock<T>`: mutual exclusion whose contenders sleep
//!
//! Short critical sections that an interrupt handler may also enter use a
//! `spin::Mutex` inside [`crate::cpu::InterruptGuard`] instead.

mod semaphore;
mod sleep_lock;

pub use semaphore::Semaphore;
pub use sleep_lock::{SleepLock, SleepLockGuard};
