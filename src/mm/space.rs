//! Process Address Space Interface
//!
//! The page-table implementation is owned by the paging collaborator. The
//! boundary layer needs exactly two things from it: a mapping lookup for
//! validation, and a raw copy primitive for ranges that already passed it.
//!
//! # Security Properties
//! - The copy primitives are `unsafe`: calling them on an unvalidated range
//!   is the one way this crate could touch memory it must not
//! - Only `syscall::validate` calls them, through validated buffer types

use bitflags::bitflags;

use super::address::{PhysAddr, VirtAddr};

bitflags! {
    /// Permission bits of a present page mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// Mapping is present.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;

        /// Ordinary user data page.
        const USER_DATA = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits();
        /// Read-only user page (code, rodata).
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
    }
}

/// Result of a successful translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Physical address backing the translated byte.
    pub phys: PhysAddr,
    /// Permissions of the containing page.
    pub flags: PageFlags,
}

/// One process's virtual address space, as exposed by the paging layer.
pub trait AddressSpace: Send {
    /// Look up the mapping for a single virtual address.
    ///
    /// Returns `None` when the containing page is not mapped.
    fn translate(&self, addr: VirtAddr) -> Option<Mapping>;

    /// Copy `dst.len()` bytes starting at `src` into kernel memory.
    ///
    /// # Safety
    /// Every byte of `[src, src + dst.len())` must have been accepted by the
    /// address validator since the last change to this address space.
    unsafe fn copy_from_user(&self, src: VirtAddr, dst: &mut [u8]);

    /// Copy `src` into user memory starting at `dst`.
    ///
    /// # Safety
    /// Every byte of `[dst, dst + src.len())` must have been accepted by the
    /// address validator as writable since the last change to this space.
    unsafe fn copy_to_user(&self, dst: VirtAddr, src: &[u8]);
}
