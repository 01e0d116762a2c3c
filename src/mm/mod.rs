//! Memory management interface
//!
//! Provides:
//! - Address types and the user/kernel split
//! - The per-process address-space seam consumed from the paging layer
//!
//! Page tables themselves, frame allocation and fault handling are owned by
//! the paging collaborator.

pub mod address;
pub mod space;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE, PHYS_BASE};
pub use space::{AddressSpace, Mapping, PageFlags};
