//! Console
//!
//! Serializes user-visible console traffic on top of the console device
//! collaborator (serial port, VGA text buffer, keyboard).
//!
//! # Guarantees
//! - A block written through one `ConsoleGuard` appears contiguously, even
//!   if other threads are printing at the same time
//! - Input is read one byte at a time; each read may block for a keystroke

use alloc::boxed::Box;
use core::fmt::{self, Write};

use crate::cpu::Cpu;
use crate::sync::{SleepLock, SleepLockGuard};

/// Raw console device.
pub trait ConsoleDevice: Send + Sync {
    /// Emit bytes to the display.
    fn put_bytes(&self, bytes: &[u8]);

    /// Wait for and return the next input byte.
    fn get_byte(&self) -> u8;
}

/// Kernel console, shared by every process.
pub struct Console {
    device: Box<dyn ConsoleDevice>,
    output: SleepLock<()>,
}

impl Console {
    /// Wrap a console device.
    pub fn new(device: Box<dyn ConsoleDevice>) -> Self {
        Self {
            device,
            output: SleepLock::new(()),
        }
    }

    /// Take exclusive use of the output side.
    pub fn lock<'a>(&'a self, cpu: &'a dyn Cpu) -> ConsoleGuard<'a> {
        ConsoleGuard {
            device: &*self.device,
            _held: self.output.lock(cpu),
        }
    }

    /// Write `bytes` as one uninterrupted block.
    pub fn write_block(&self, cpu: &dyn Cpu, bytes: &[u8]) {
        self.lock(cpu).put_bytes(bytes);
    }

    /// Format and print as one uninterrupted block.
    pub fn print(&self, cpu: &dyn Cpu, args: fmt::Arguments<'_>) {
        let _ = self.lock(cpu).write_fmt(args);
    }

    /// Read one byte of input, blocking until a key arrives.
    pub fn read_byte(&self) -> u8 {
        self.device.get_byte()
    }
}

/// Exclusive access to console output.
pub struct ConsoleGuard<'a> {
    device: &'a dyn ConsoleDevice,
    _held: SleepLockGuard<'a, ()>,
}

impl ConsoleGuard<'_> {
    /// Emit raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.device.put_bytes(bytes);
    }
}

impl Write for ConsoleGuard<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_bytes(s.as_bytes());
        Ok(())
    }
}
