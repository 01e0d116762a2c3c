//! Trap Entry
//!
//! Kernel-side view of a trap from user mode and the entry points the
//! architecture glue calls.
//!
//! # System Call Convention
//! ```text
//!   esp + 12 │ arg 2    │
//!   esp +  8 │ arg 1    │
//!   esp +  4 │ arg 0    │
//!   esp      │ call no. │   one 32-bit word each
//! ```
//! The result goes to `eax`.
//!
//! # Security Considerations
//! - The stack pointer is user controlled, so the words above are user
//!   memory too: they are read only through the bounds-checked accessors
//!   below, which validate before copying
//! - A fault taken by user code terminates only the faulting process

use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::process::{ExitStatus, Process, EXIT_FAILURE};
use crate::syscall::validate::{self, Fault};

/// Size of one call-number or argument word.
pub const WORD_SIZE: usize = 4;

/// Trap frame saved on entry from user mode.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    /// User stack pointer at the moment of the trap.
    pub esp: usize,
    /// Return-value register.
    pub eax: u32,
    /// User instruction pointer.
    pub eip: usize,
}

impl TrapFrame {
    /// Frame for a trap taken with the user stack at `esp`.
    pub const fn new(esp: usize) -> Self {
        Self { esp, eax: 0, eip: 0 }
    }

    /// Read stack word `index`; word 0 is the call number.
    pub fn word(&self, space: &dyn AddressSpace, index: usize) -> Result<u32, Fault> {
        let offset = index.checked_mul(WORD_SIZE).ok_or(Fault::Overflow)?;
        let addr = self.esp.checked_add(offset).ok_or(Fault::Overflow)?;
        let words = validate::validate(space, addr, 1, WORD_SIZE)?;
        words.word(0).ok_or(Fault::Overflow)
    }

    /// The system call number.
    pub fn call_number(&self, space: &dyn AddressSpace) -> Result<u32, Fault> {
        self.word(space, 0)
    }

    /// The first `N` argument words, validated as one region.
    pub fn args<const N: usize>(&self, space: &dyn AddressSpace) -> Result<[u32; N], Fault> {
        let base = self.esp.checked_add(WORD_SIZE).ok_or(Fault::Overflow)?;
        let bytes = validate::validate(space, base, N, WORD_SIZE)?.to_vec();
        let mut args = [0u32; N];
        for (arg, raw) in args.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
            *arg = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        Ok(args)
    }

    /// Store the call's result.
    #[inline]
    pub fn set_return(&mut self, value: u32) {
        self.eax = value;
    }
}

/// What the architecture glue does after the kernel handled a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapExit {
    /// Return to user mode with the (possibly updated) frame.
    Resume,
    /// The process has terminated; switch away and never resume it.
    Exited(ExitStatus),
    /// Power the machine off.
    Halt,
}

/// A page fault or other exception taken by user code.
///
/// Faults that the paging collaborator could not resolve end up here; the
/// process is terminated with the failure status.
pub fn handle_user_fault(kernel: &Kernel, process: &mut Process, addr: VirtAddr) -> TrapExit {
    log::warn!(
        "process {} ({}): unhandled user fault at {}",
        process.pid(),
        process.name(),
        addr
    );
    TrapExit::Exited(process.terminate(kernel, EXIT_FAILURE))
}

/// Timer interrupt entry. Runs in interrupt context.
pub fn handle_timer_interrupt(kernel: &Kernel) -> usize {
    kernel.timer().interrupt(kernel.cpu())
}
