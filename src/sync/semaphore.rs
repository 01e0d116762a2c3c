//! Counting Semaphore
//!
//! Blocking primitive for thread context. Waiters are suspended through the
//! [`Cpu`] collaborator and are never polled.
//!
//! # Design
//! - The counter and waiter list sit behind a `spin::Mutex`
//! - The mutex is only taken with interrupts disabled, so the holder can
//!   never be preempted by a handler that wants the same lock
//! - `up` is safe from interrupt context; `down` is not

use alloc::collections::VecDeque;
use spin::Mutex;

use crate::cpu::{Cpu, InterruptGuard, ThreadId};

struct State {
    value: usize,
    waiters: VecDeque<ThreadId>,
}

/// A counting semaphore with FIFO wakeup order.
pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    /// Create a semaphore with an initial count.
    pub const fn new(value: usize) -> Self {
        Self {
            state: Mutex::new(State {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Wait for the count to become positive, then decrement it.
    pub fn down(&self, cpu: &dyn Cpu) {
        let me = cpu.current_thread();
        loop {
            {
                let _irq = InterruptGuard::new(cpu);
                let mut state = self.state.lock();
                if state.value > 0 {
                    state.value -= 1;
                    // After a spurious wakeup we may still be queued; a later
                    // `up` must not spend its wakeup on us.
                    state.waiters.retain(|waiter| *waiter != me);
                    return;
                }
                // A spurious wakeup leaves us queued already.
                if !state.waiters.contains(&me) {
                    state.waiters.push_back(me);
                }
            }
            cpu.block_current();
        }
    }

    /// Increment the count and wake the longest waiter, if any.
    pub fn up(&self, cpu: &dyn Cpu) {
        let woken = {
            let _irq = InterruptGuard::new(cpu);
            let mut state = self.state.lock();
            state.value += 1;
            state.waiters.pop_front()
        };
        if let Some(thread) = woken {
            cpu.unblock(thread);
        }
    }

    /// Current count.
    pub fn value(&self) -> usize {
        self.state.lock().value
    }
}
