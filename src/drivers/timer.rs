//! Timer and Sleep Queue
//!
//! The periodic timer interrupt advances the tick counter and wakes threads
//! whose timed sleep has expired.
//!
//! # Sleep Queue
//! - Ordered by `(wake_tick, sequence)`: earliest first, ties in arrival
//!   order
//! - Mutated only inside an interrupt-disabled section, never under a lock
//!   that can block, because the wake path runs in interrupt context
//! - Sleepers are suspended through the scheduler and never poll

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicI64, Ordering};

use spin::Mutex;

use crate::cpu::{without_interrupts, Cpu, ThreadId};

/// Number of timer interrupts per second.
pub const TIMER_FREQ: i64 = 100;

/// Absolute time in timer ticks since boot.
pub type Tick = i64;

struct SleepList {
    nodes: BTreeMap<(Tick, u64), ThreadId>,
    next_seq: u64,
}

/// Threads blocked until a given tick.
pub struct SleepQueue {
    list: Mutex<SleepList>,
}

impl SleepQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            list: Mutex::new(SleepList {
                nodes: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Enqueue `thread` to be woken at `wake_tick`.
    ///
    /// The caller is responsible for blocking `thread` afterwards.
    pub fn insert(&self, cpu: &dyn Cpu, thread: ThreadId, wake_tick: Tick) {
        without_interrupts(cpu, || {
            let mut list = self.list.lock();
            let seq = list.next_seq;
            list.next_seq += 1;
            list.nodes.insert((wake_tick, seq), thread);
        });
        log::trace!("timer: {} sleeps until tick {}", thread, wake_tick);
    }

    /// Block the current thread until `wake_tick` has been serviced.
    pub fn sleep_until(&self, cpu: &dyn Cpu, wake_tick: Tick) {
        let me = cpu.current_thread();
        self.insert(cpu, me, wake_tick);
        // The wake path dequeues before it unblocks; a return from
        // `block_current` with our node still queued is spurious.
        while self.contains(cpu, me) {
            cpu.block_current();
        }
    }

    /// Wake every thread whose wake tick is at or before `now`, in order.
    ///
    /// Interrupt context: takes no blocking lock and never blocks.
    pub fn wake_due(&self, cpu: &dyn Cpu, now: Tick) -> usize {
        let mut woken = 0;
        loop {
            let next = without_interrupts(cpu, || {
                let mut list = self.list.lock();
                let due = matches!(list.nodes.first_key_value(), Some((&(tick, _), _)) if tick <= now);
                if due {
                    list.nodes.pop_first().map(|(_, thread)| thread)
                } else {
                    None
                }
            });
            match next {
                Some(thread) => {
                    cpu.unblock(thread);
                    woken += 1;
                }
                None => return woken,
            }
        }
    }

    /// Drop any node belonging to `thread`, e.g. when it is destroyed.
    pub fn cancel(&self, cpu: &dyn Cpu, thread: ThreadId) -> bool {
        without_interrupts(cpu, || {
            let mut list = self.list.lock();
            let before = list.nodes.len();
            list.nodes.retain(|_, sleeper| *sleeper != thread);
            list.nodes.len() != before
        })
    }

    /// Whether `thread` is still waiting.
    pub fn contains(&self, cpu: &dyn Cpu, thread: ThreadId) -> bool {
        without_interrupts(cpu, || {
            self.list.lock().nodes.values().any(|sleeper| *sleeper == thread)
        })
    }

    /// Number of sleeping threads.
    pub fn len(&self, cpu: &dyn Cpu) -> usize {
        without_interrupts(cpu, || self.list.lock().nodes.len())
    }

    /// Earliest pending wake tick.
    pub fn next_wake(&self, cpu: &dyn Cpu) -> Option<Tick> {
        without_interrupts(cpu, || {
            self.list.lock().nodes.keys().next().map(|&(tick, _)| tick)
        })
    }
}

impl Default for SleepQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// System tick counter plus the sleep queue it services.
pub struct Timer {
    ticks: AtomicI64,
    sleepers: SleepQueue,
}

impl Timer {
    /// Create a timer at tick zero.
    pub const fn new() -> Self {
        Self {
            ticks: AtomicI64::new(0),
            sleepers: SleepQueue::new(),
        }
    }

    /// Ticks since boot.
    pub fn ticks(&self) -> Tick {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Ticks elapsed since `then`.
    pub fn elapsed(&self, then: Tick) -> Tick {
        self.ticks() - then
    }

    /// The sleep queue this timer services.
    pub fn sleepers(&self) -> &SleepQueue {
        &self.sleepers
    }

    /// Sleep for approximately `ticks` timer ticks.
    pub fn sleep(&self, cpu: &dyn Cpu, ticks: Tick) {
        if ticks <= 0 {
            return;
        }
        let wake = self.ticks().saturating_add(ticks);
        self.sleepers.sleep_until(cpu, wake);
    }

    /// Sleep for approximately `ms` milliseconds.
    pub fn msleep(&self, cpu: &dyn Cpu, ms: i64) {
        self.real_time_sleep(cpu, ms, 1_000);
    }

    /// Sleep for approximately `us` microseconds.
    pub fn usleep(&self, cpu: &dyn Cpu, us: i64) {
        self.real_time_sleep(cpu, us, 1_000_000);
    }

    /// Sleep for approximately `ns` nanoseconds.
    pub fn nsleep(&self, cpu: &dyn Cpu, ns: i64) {
        self.real_time_sleep(cpu, ns, 1_000_000_000);
    }

    /// Sleep for `num / denom` seconds, rounded down to whole ticks.
    fn real_time_sleep(&self, cpu: &dyn Cpu, num: i64, denom: i64) {
        let ticks = num.saturating_mul(TIMER_FREQ) / denom;
        self.sleep(cpu, ticks);
    }

    /// Timer interrupt handler body.
    ///
    /// Returns the number of threads woken.
    pub fn interrupt(&self, cpu: &dyn Cpu) -> usize {
        let now = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        self.sleepers.wake_due(cpu, now)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
