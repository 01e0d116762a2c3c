//! CPU and Thread Collaborator
//!
//! The scheduler and interrupt controller live below this crate. This module
//! defines the narrow interface the boundary layer consumes from them.
//!
//! # Execution Model
//! - Single core, interrupt driven
//! - A thread only leaves the CPU by blocking or by being preempted
//! - Interrupt handlers run to completion and never block

use core::fmt;

/// Identifier of a kernel thread, assigned by the scheduler.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Interrupt state saved by [`Cpu::disable_interrupts`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntrLevel {
    /// Interrupts were enabled.
    On,
    /// Interrupts were already disabled.
    Off,
}

/// Scheduler and interrupt-controller operations.
///
/// # Wakeup Contract
/// `unblock` on a thread that has not blocked yet must not be lost: its next
/// `block_current` returns immediately. Blocking primitives in this crate
/// register the current thread as a waiter, leave their critical section and
/// only then block, so this is what closes the window between the two.
///
/// `unblock` and the interrupt methods must be callable from interrupt context.
pub trait Cpu: Send + Sync {
    /// Thread running the caller.
    fn current_thread(&self) -> ThreadId;

    /// Suspend the current thread until another context unblocks it.
    fn block_current(&self);

    /// Make a blocked (or about-to-block) thread runnable again.
    fn unblock(&self, thread: ThreadId);

    /// Disable interrupts on this core, returning the previous level.
    fn disable_interrupts(&self) -> IntrLevel;

    /// Restore an interrupt level returned by `disable_interrupts`.
    fn restore_interrupts(&self, level: IntrLevel);
}

/// RAII interrupt-disabled critical section.
///
/// On a single core this is what makes a short mutation atomic with respect
/// to the timer interrupt.
pub struct InterruptGuard<'a> {
    cpu: &'a dyn Cpu,
    saved: IntrLevel,
}

impl<'a> InterruptGuard<'a> {
    /// Disable interrupts until the guard is dropped.
    pub fn new(cpu: &'a dyn Cpu) -> Self {
        let saved = cpu.disable_interrupts();
        Self { cpu, saved }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.cpu.restore_interrupts(self.saved);
    }
}

/// Run `f` with interrupts disabled.
#[inline]
pub fn without_interrupts<R>(cpu: &dyn Cpu, f: impl FnOnce() -> R) -> R {
    let _guard = InterruptGuard::new(cpu);
    f()
}
