//! User Pointer Validation
//!
//! Every pointer or buffer a system call receives is checked here before
//! the kernel touches a single byte of it.
//!
//! # Security Principles
//! - Validate ALL user ranges before use, with no trusted call numbers
//! - A range is valid only if every byte lies below `PHYS_BASE` and sits on
//!   a present, user-accessible page (writable, if the kernel writes it)
//! - Partial mappings are caught: every page the range touches is checked,
//!   not just its first and last byte
//! - Data is copied between kernel and user memory only through the
//!   validated types below
//!
//! # Cost
//! Buffers up to `BYTEWISE_LIMIT` bytes are checked byte by byte; larger
//! ones page by page, which bounds validation to one lookup per page.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::mm::address::{PAGE_SIZE, PHYS_BASE};
use crate::mm::{AddressSpace, PageFlags, VirtAddr};

/// Longest string (terminator excluded) copied in from user space.
pub const MAX_STR_LEN: usize = PAGE_SIZE;

/// Buffers up to this many bytes are checked one byte at a time.
pub const BYTEWISE_LIMIT: usize = 16;

/// A user range that must never be dereferenced.
///
/// Every fault is fatal to the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Null pointer.
    NullPointer,
    /// `ptr + len` or `count * size` overflowed.
    Overflow,
    /// Part of the range lies in kernel space.
    KernelAddress(VirtAddr),
    /// Part of the range is not mapped for user access.
    Unmapped(VirtAddr),
    /// The kernel must write the range, but this page is read-only.
    ReadOnly(VirtAddr),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullPointer => write!(f, "null pointer"),
            Self::Overflow => write!(f, "address range overflows"),
            Self::KernelAddress(addr) => write!(f, "kernel address {}", addr),
            Self::Unmapped(addr) => write!(f, "unmapped address {}", addr),
            Self::ReadOnly(addr) => write!(f, "read-only address {}", addr),
        }
    }
}

/// Failure to copy a NUL-terminated string in from user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrError {
    /// The string's memory is invalid.
    Fault(Fault),
    /// No terminator within `MAX_STR_LEN` bytes.
    TooLong,
    /// The bytes are not UTF-8.
    InvalidUtf8,
}

impl From<Fault> for StrError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl fmt::Display for StrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault(fault) => write!(f, "{}", fault),
            Self::TooLong => write!(f, "string exceeds {} bytes", MAX_STR_LEN),
            Self::InvalidUtf8 => write!(f, "string is not UTF-8"),
        }
    }
}

/// How the kernel is going to access a user range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Kernel reads user memory.
    Read,
    /// Kernel writes user memory.
    Write,
}

/// Check the page containing a single user byte.
fn check_byte(space: &dyn AddressSpace, addr: VirtAddr, access: Access) -> Result<(), Fault> {
    if addr.is_kernel() {
        return Err(Fault::KernelAddress(addr));
    }
    let mapping = space.translate(addr).ok_or(Fault::Unmapped(addr))?;
    if !mapping.flags.contains(PageFlags::PRESENT | PageFlags::USER) {
        return Err(Fault::Unmapped(addr));
    }
    if access == Access::Write && !mapping.flags.contains(PageFlags::WRITABLE) {
        return Err(Fault::ReadOnly(addr));
    }
    Ok(())
}

/// Check every byte of `[ptr, ptr + len)`.
fn check_range(
    space: &dyn AddressSpace,
    ptr: usize,
    len: usize,
    access: Access,
) -> Result<(), Fault> {
    if len == 0 {
        return Ok(());
    }
    if ptr == 0 {
        return Err(Fault::NullPointer);
    }
    let end = ptr.checked_add(len).ok_or(Fault::Overflow)?;
    if end > PHYS_BASE {
        return Err(Fault::KernelAddress(VirtAddr::new(ptr.max(PHYS_BASE))));
    }

    if len <= BYTEWISE_LIMIT {
        for addr in ptr..end {
            check_byte(space, VirtAddr::new(addr), access)?;
        }
        return Ok(());
    }

    // One lookup per page the range touches, starting with the first byte.
    let mut addr = VirtAddr::new(ptr);
    loop {
        check_byte(space, addr, access)?;
        let next = addr.align_down().as_usize() + PAGE_SIZE;
        if next >= end {
            return Ok(());
        }
        addr = VirtAddr::new(next);
    }
}

/// Validate `count` elements of `size` bytes at `ptr` for reading.
pub fn validate(
    space: &dyn AddressSpace,
    ptr: usize,
    count: usize,
    size: usize,
) -> Result<UserBuffer<'_>, Fault> {
    let len = count.checked_mul(size).ok_or(Fault::Overflow)?;
    validate_buffer(space, ptr, len)
}

/// Validate a byte buffer the kernel will read.
pub fn validate_buffer(
    space: &dyn AddressSpace,
    ptr: usize,
    len: usize,
) -> Result<UserBuffer<'_>, Fault> {
    check_range(space, ptr, len, Access::Read)?;
    Ok(UserBuffer {
        space,
        addr: VirtAddr::new(ptr),
        len,
    })
}

/// Validate a byte buffer the kernel will write.
pub fn validate_buffer_mut(
    space: &dyn AddressSpace,
    ptr: usize,
    len: usize,
) -> Result<UserBufferMut<'_>, Fault> {
    check_range(space, ptr, len, Access::Write)?;
    Ok(UserBufferMut {
        space,
        addr: VirtAddr::new(ptr),
        len,
    })
}

/// Copy a NUL-terminated string in from user space.
///
/// Each page is validated before any byte of it is read, and reading stops
/// at the terminator, so bytes past it are never touched.
pub fn copy_in_str(space: &dyn AddressSpace, ptr: usize) -> Result<String, StrError> {
    if ptr == 0 {
        return Err(Fault::NullPointer.into());
    }

    let mut bytes = Vec::new();
    let mut addr = VirtAddr::new(ptr);
    loop {
        check_byte(space, addr, Access::Read)?;

        // PHYS_BASE is page aligned, so the page ends at or below it.
        let page_end = addr.align_down().as_usize() + PAGE_SIZE;
        let take = (page_end - addr.as_usize()).min(MAX_STR_LEN + 1 - bytes.len());
        let start = bytes.len();
        bytes.resize(start + take, 0);
        // SAFETY: `[addr, addr + take)` stays inside the page `check_byte`
        // just accepted.
        unsafe { space.copy_from_user(addr, &mut bytes[start..]) };

        if let Some(nul) = bytes[start..].iter().position(|&b| b == 0) {
            bytes.truncate(start + nul);
            break;
        }
        if bytes.len() > MAX_STR_LEN {
            return Err(StrError::TooLong);
        }
        addr = VirtAddr::new(page_end);
    }

    String::from_utf8(bytes).map_err(|_| StrError::InvalidUtf8)
}

/// A validated user-space buffer the kernel may read.
///
/// # Safety
/// This struct is only constructed after validation passes.
pub struct UserBuffer<'a> {
    space: &'a dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
}

impl UserBuffer<'_> {
    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy bytes starting at `offset` into `dst`.
    ///
    /// Copies at most up to the end of the buffer; returns the count copied.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len.saturating_sub(offset));
        if n == 0 {
            return 0;
        }
        // SAFETY: `[addr + offset, addr + offset + n)` is a subrange of the
        // validated buffer; `offset < len` here, so the add cannot overflow.
        unsafe {
            self.space
                .copy_from_user(VirtAddr::new(self.addr.as_usize() + offset), &mut dst[..n]);
        }
        n
    }

    /// Copy the whole buffer into kernel memory.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = alloc::vec![0u8; self.len];
        self.read_at(0, &mut bytes);
        bytes
    }

    /// Read the `index`th little-endian 32-bit word.
    pub fn word(&self, index: usize) -> Option<u32> {
        let mut raw = [0u8; 4];
        let offset = index.checked_mul(4)?;
        (self.read_at(offset, &mut raw) == 4).then(|| u32::from_le_bytes(raw))
    }
}

impl fmt::Debug for UserBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserBuffer({}, {} bytes)", self.addr, self.len)
    }
}

/// A validated user-space buffer the kernel may write.
pub struct UserBufferMut<'a> {
    space: &'a dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
}

impl UserBufferMut<'_> {
    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the buffer starting at `offset`.
    ///
    /// Copies at most up to the end of the buffer; returns the count copied.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> usize {
        let n = src.len().min(self.len.saturating_sub(offset));
        if n == 0 {
            return 0;
        }
        // SAFETY: subrange of a buffer validated as writable.
        unsafe {
            self.space
                .copy_to_user(VirtAddr::new(self.addr.as_usize() + offset), &src[..n]);
        }
        n
    }
}

impl fmt::Debug for UserBufferMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserBufferMut({}, {} bytes)", self.addr, self.len)
    }
}
