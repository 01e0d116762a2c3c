//! Kernel Context
//!
//! Bundles the collaborators the boundary layer calls into. One `Kernel` is
//! built at boot and shared by every process.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::cpu::Cpu;
use crate::drivers::{Console, ConsoleDevice, Timer};
use crate::fs::FileSystem;
use crate::process::Loader;
use crate::sync::{SleepLock, SleepLockGuard};

/// Collaborators supplied by the rest of the kernel.
pub struct Collaborators {
    /// Scheduler and interrupt control.
    pub cpu: Arc<dyn Cpu>,
    /// Console device.
    pub console: Box<dyn ConsoleDevice>,
    /// Filesystem.
    pub fs: Box<dyn FileSystem>,
    /// Program loader.
    pub loader: Box<dyn Loader>,
}

/// Shared kernel state behind the system call boundary.
pub struct Kernel {
    cpu: Arc<dyn Cpu>,
    console: Console,
    /// All filesystem access, file objects included, happens under this.
    fs: SleepLock<Box<dyn FileSystem>>,
    loader: Box<dyn Loader>,
    timer: Timer,
}

impl Kernel {
    /// Assemble the kernel context.
    pub fn new(parts: Collaborators) -> Self {
        Self {
            cpu: parts.cpu,
            console: Console::new(parts.console),
            fs: SleepLock::new(parts.fs),
            loader: parts.loader,
            timer: Timer::new(),
        }
    }

    /// Scheduler and interrupt control.
    pub fn cpu(&self) -> &dyn Cpu {
        &*self.cpu
    }

    /// Shared handle to the scheduler, for state that outlives a call.
    pub fn cpu_handle(&self) -> Arc<dyn Cpu> {
        self.cpu.clone()
    }

    /// The console.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// The system timer.
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// The program loader.
    pub fn loader(&self) -> &dyn Loader {
        &*self.loader
    }

    /// Take the global filesystem lock.
    pub fn filesystem(&self) -> SleepLockGuard<'_, Box<dyn FileSystem>> {
        self.fs.lock(&*self.cpu)
    }
}
