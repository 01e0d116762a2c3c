//! Descriptor Table
//!
//! Per-process mapping from small integer handles to open file objects.
//!
//! # Design
//! - Fixed-size array of slots addressed by `Fd` indices
//! - Slots 0 and 1 are the console; they are implicit and never stored
//! - Handles are handed out monotonically and never recycled, so a closed
//!   handle can never resolve to a file opened later

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::fs::File;

/// Number of handles a process can ever allocate, console included.
pub const MAX_FILES: usize = 128;

/// A handle index into a descriptor table.
///
/// Constructing one proves the raw value is inside the table's range.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Console input.
    pub const STDIN: Self = Self(0);

    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// First handle backed by a file object.
    pub const FIRST_FILE: Self = Self(2);

    /// Check a raw handle word from user space.
    ///
    /// Returns `None` for negative values and values at or beyond
    /// `MAX_FILES`.
    #[inline]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < MAX_FILES {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is one of the two console handles.
    #[inline]
    pub const fn is_console(self) -> bool {
        self.0 < Self::FIRST_FILE.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The handle names a console stream, not a file.
    Console,
    /// The handle was never allocated or is already closed.
    NotOpen,
    /// Every handle this process may allocate has been used.
    Exhausted,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "handle is a console stream"),
            Self::NotOpen => write!(f, "handle is not open"),
            Self::Exhausted => write!(f, "descriptor table exhausted"),
        }
    }
}

type Slot = Option<Box<dyn File>>;

/// Open files of one process.
///
/// Owned exclusively by its process and never shared across threads.
pub struct DescriptorTable {
    /// Array of file slots; the console slots stay empty.
    slots: [Slot; MAX_FILES],
    /// Next handle to hand out.
    next: usize,
    /// Number of occupied slots.
    open: usize,
}

impl DescriptorTable {
    /// Create a table with only the console handles.
    pub fn new() -> Self {
        const EMPTY: Slot = None;
        Self {
            slots: [EMPTY; MAX_FILES],
            next: Fd::FIRST_FILE.index(),
            open: 0,
        }
    }

    /// Install an open file under a fresh handle.
    ///
    /// On exhaustion the file is handed back so the caller can close it
    /// under the filesystem lock.
    pub fn allocate(&mut self, file: Box<dyn File>) -> Result<Fd, Box<dyn File>> {
        if self.next >= MAX_FILES {
            return Err(file);
        }
        let fd = Fd(self.next as u32);
        self.slots[fd.index()] = Some(file);
        self.next += 1;
        self.open += 1;
        log::trace!("fd: allocated {}", fd);
        Ok(fd)
    }

    /// Look up the file behind a handle.
    pub fn resolve(&mut self, fd: Fd) -> Result<&mut dyn File, FdError> {
        if fd.is_console() {
            return Err(FdError::Console);
        }
        match self.slots[fd.index()].as_deref_mut() {
            Some(file) => Ok(file),
            None => Err(FdError::NotOpen),
        }
    }

    /// Detach a handle, returning its file object for closing.
    ///
    /// The handle is retired: it stays unallocatable for the rest of the
    /// process's life.
    pub fn release(&mut self, fd: Fd) -> Result<Box<dyn File>, FdError> {
        if fd.is_console() {
            return Err(FdError::Console);
        }
        let file = self.slots[fd.index()].take().ok_or(FdError::NotOpen)?;
        self.open -= 1;
        log::trace!("fd: released {}", fd);
        Ok(file)
    }

    /// Detach every open file, for process teardown.
    pub fn release_all(&mut self) -> Vec<Box<dyn File>> {
        let files: Vec<_> = self.slots.iter_mut().filter_map(Option::take).collect();
        self.open = 0;
        files
    }

    /// Number of files currently open.
    pub fn open_count(&self) -> usize {
        self.open
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("open", &self.open)
            .field("next", &self.next)
            .finish()
    }
}
