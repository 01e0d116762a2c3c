//! userprog - User/Kernel Trust Boundary
//!
//! The layer of a small single-core kernel that stands between user
//! programs and everything else: it decodes system calls, proves user
//! pointers safe before touching them, owns each process's open-file
//! handles, and carries exit statuses from children to their parents.
//!
//! # Security Features
//! - No user pointer is dereferenced before it is validated
//! - Typed handles: a raw handle word becomes an [`fd::Fd`] only after a
//!   range check
//! - A misbehaving process is terminated; the kernel never panics on its
//!   behalf
//!
//! # Architecture
//! - [`trap`]: trap frame view and the entry points for traps
//! - [`syscall`]: dispatch, handlers and user memory validation
//! - [`process`]: process lifecycle, exit statuses and waiting
//! - [`fd`]: per-process descriptor tables
//! - [`sync`], [`drivers`]: blocking locks, the console and the timer
//!
//! Scheduling, paging, the filesystem and program loading are supplied by
//! the rest of the kernel through the traits in [`cpu`], [`mm`], [`fs`] and
//! [`process::Loader`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod cpu;
pub mod drivers;
pub mod fd;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod sync;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testing;

pub use kernel::{Collaborators, Kernel};
pub use process::{Pid, Process};
pub use syscall::dispatch;
pub use trap::{TrapExit, TrapFrame};
