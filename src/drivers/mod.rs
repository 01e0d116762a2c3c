//! Device-facing services
//!
//! - `console`: serialized console output, byte-wise console input
//! - `timer`: tick counter and the timed-sleep wait queue
//!
//! The device drivers themselves (UART, keyboard, PIT) are collaborators;
//! these modules only add the kernel-side guarantees on top.

pub mod console;
pub mod timer;

pub use console::{Console, ConsoleDevice};
pub use timer::{SleepQueue, Tick, Timer, TIMER_FREQ};
