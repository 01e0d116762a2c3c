//! Per-Process File Descriptors
//!
//! # Design
//! - Each process owns one `DescriptorTable`
//! - Handles are small integers; 0 and 1 are the console and never stored
//! - A handle is valid only inside the process that allocated it
//!
//! # Security Properties
//! - Raw handle words are range-checked into `Fd` before any slot access
//! - Closed handles are retired, never silently rebound

pub mod table;

pub use table::{DescriptorTable, Fd, FdError, MAX_FILES};
