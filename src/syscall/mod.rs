//! System Call Interface
//!
//! Entry point for every request a user program makes of the kernel.
//!
//! # Security Model
//! - Whitelist approach: only the calls in [`Syscall`] exist
//! - Every pointer and handle is validated before use
//! - Invalid memory or handles terminate the caller; nothing panics
//!
//! # Syscalls
//! | no. | call                    | returns                 |
//! |-----|-------------------------|-------------------------|
//! | 0   | halt()                  | never                   |
//! | 1   | exit(status)            | never                   |
//! | 2   | exec(cmdline)           | pid, or -1              |
//! | 3   | wait(pid)               | child status, or -1     |
//! | 4   | create(name, size)      | 1 / 0                   |
//! | 5   | remove(name)            | 1 / 0                   |
//! | 6   | open(name)              | handle, or -1           |
//! | 7   | filesize(fd)            | length, or -1           |
//! | 8   | read(fd, buf, len)      | bytes read, or -1       |
//! | 9   | write(fd, buf, len)     | bytes written, or -1    |
//! | 10  | seek(fd, pos)           | 0, or -1                |
//! | 11  | tell(fd)                | position, or -1         |
//! | 12  | close(fd)               | 0, or -1                |

mod handler;
pub mod validate;

pub use handler::{dispatch, numbers, Syscall, SyscallError, FAILURE};
pub use validate::{UserBuffer, UserBufferMut};
