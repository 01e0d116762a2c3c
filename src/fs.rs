//! Filesystem Collaborator Interface
//!
//! The on-disk layout lives below this crate. File objects are owned by the
//! filesystem; a process only holds them through its descriptor table.
//!
//! Dropping a `Box<dyn File>` closes the file. Callers drop file objects
//! while holding the kernel's filesystem lock, like every other filesystem
//! access.

use alloc::boxed::Box;

/// An open file.
pub trait File: Send {
    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes read; the position advances by that much.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes written; files do not grow past their
    /// created size.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// File length in bytes.
    fn len(&self) -> usize;

    /// Move the position to `pos`. Positions past the end are allowed.
    fn seek(&mut self, pos: usize);

    /// Current position.
    fn tell(&self) -> usize;
}

/// The filesystem namespace.
pub trait FileSystem: Send {
    /// Create a file of `size` bytes. Fails if the name exists.
    fn create(&mut self, name: &str, size: usize) -> bool;

    /// Open an existing file.
    fn open(&mut self, name: &str) -> Option<Box<dyn File>>;

    /// Remove a name. Files already open stay readable until closed.
    fn remove(&mut self, name: &str) -> bool;
}
