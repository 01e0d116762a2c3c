//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - The call number and argument words are read through validated
//!   accessors, never by raw offset arithmetic
//! - Every pointer argument is validated before its handler runs
//! - Unknown call numbers, bad pointers and out-of-range handles terminate
//!   the caller; every other failure is returned as a sentinel

use alloc::vec;
use core::fmt;

use super::validate::{self, Fault, StrError};
use crate::fd::{Fd, FdError};
use crate::kernel::Kernel;
use crate::mm::PAGE_SIZE;
use crate::process::{link, ExitStatus, Pid, Process, WaitError, EXIT_FAILURE};
use crate::trap::{TrapExit, TrapFrame};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
}

/// Return value of a failed call that yields a handle, pid, count or status.
pub const FAILURE: u32 = -1i32 as u32;

/// Every system call this kernel implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Halt,
    Exit,
    Exec,
    Wait,
    Create,
    Remove,
    Open,
    Filesize,
    Read,
    Write,
    Seek,
    Tell,
    Close,
}

impl TryFrom<u32> for Syscall {
    type Error = SyscallError;

    fn try_from(number: u32) -> Result<Self, Self::Error> {
        use numbers::*;
        Ok(match number {
            SYS_HALT => Self::Halt,
            SYS_EXIT => Self::Exit,
            SYS_EXEC => Self::Exec,
            SYS_WAIT => Self::Wait,
            SYS_CREATE => Self::Create,
            SYS_REMOVE => Self::Remove,
            SYS_OPEN => Self::Open,
            SYS_FILESIZE => Self::Filesize,
            SYS_READ => Self::Read,
            SYS_WRITE => Self::Write,
            SYS_SEEK => Self::Seek,
            SYS_TELL => Self::Tell,
            SYS_CLOSE => Self::Close,
            _ => return Err(SyscallError::UnknownCall(number)),
        })
    }
}

impl Syscall {
    /// Value reported to user space when the call fails locally.
    pub const fn failure_value(self) -> u32 {
        match self {
            // Boolean results: false.
            Self::Create | Self::Remove => 0,
            _ => FAILURE,
        }
    }
}

/// System call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Invalid system call number
    UnknownCall(u32),
    /// Bad address (invalid pointer)
    Fault(Fault),
    /// Handle value outside the representable range
    BadHandle(u32),
    /// Handle is closed, never opened, or a console stream
    NotOpen(Fd),
    /// Console handle used for the wrong direction
    WrongDirection(Fd),
    /// Descriptor table has no handles left
    TooManyFiles,
    /// No file by that name
    NoSuchFile,
    /// Name string is unusable
    BadName(StrError),
    /// The loader could not start the program
    ExecFailed,
    /// The pid is not a waitable child
    NotChild(Pid),
    /// The file transferred nothing
    NoTransfer,
}

impl SyscallError {
    /// Whether the caller is terminated rather than handed a sentinel.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownCall(_) | Self::Fault(_) | Self::BadHandle(_)
        )
    }
}

impl From<Fault> for SyscallError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl From<StrError> for SyscallError {
    fn from(err: StrError) -> Self {
        match err {
            StrError::Fault(fault) => Self::Fault(fault),
            other => Self::BadName(other),
        }
    }
}

impl From<WaitError> for SyscallError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::NotChild(pid) => Self::NotChild(pid),
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCall(n) => write!(f, "unknown system call {}", n),
            Self::Fault(fault) => write!(f, "bad user memory: {}", fault),
            Self::BadHandle(raw) => write!(f, "handle {} out of range", *raw as i32),
            Self::NotOpen(fd) => write!(f, "handle {} is not open", fd),
            Self::WrongDirection(fd) => write!(f, "handle {} used in the wrong direction", fd),
            Self::TooManyFiles => write!(f, "too many open files"),
            Self::NoSuchFile => write!(f, "no such file"),
            Self::BadName(err) => write!(f, "bad name: {}", err),
            Self::ExecFailed => write!(f, "program failed to load"),
            Self::NotChild(pid) => write!(f, "pid {} is not a waitable child", pid),
            Self::NoTransfer => write!(f, "no bytes transferred"),
        }
    }
}

/// How a handler finished.
enum Completion {
    Return(u32),
    Exit(ExitStatus),
    Halt,
}

type SyscallResult = Result<u32, SyscallError>;

/// Handle a system call trap.
///
/// Reads the call from `frame`, runs it on behalf of `process`, and either
/// stores the result in `frame.eax` or terminates `process`.
pub fn dispatch(kernel: &Kernel, process: &mut Process, frame: &mut TrapFrame) -> TrapExit {
    let call = match frame
        .call_number(process.space())
        .map_err(SyscallError::from)
        .and_then(Syscall::try_from)
    {
        Ok(call) => call,
        Err(err) => return kill(kernel, process, None, err),
    };

    log::debug!("[SYSCALL] pid {}: {:?}", process.pid(), call);

    match invoke(kernel, process, frame, call) {
        Ok(Completion::Return(value)) => {
            frame.set_return(value);
            TrapExit::Resume
        }
        Ok(Completion::Exit(status)) => TrapExit::Exited(process.terminate(kernel, status)),
        Ok(Completion::Halt) => {
            log::info!("[SYSCALL] halt requested by pid {}", process.pid());
            TrapExit::Halt
        }
        Err(err) if err.is_fatal() => kill(kernel, process, Some(call), err),
        Err(err) => {
            log::debug!("[SYSCALL] pid {}: {:?} failed: {}", process.pid(), call, err);
            frame.set_return(call.failure_value());
            TrapExit::Resume
        }
    }
}

fn kill(
    kernel: &Kernel,
    process: &mut Process,
    call: Option<Syscall>,
    err: SyscallError,
) -> TrapExit {
    log::warn!(
        "[SYSCALL] pid {} ({}): {:?}: {}, terminating",
        process.pid(),
        process.name(),
        call,
        err
    );
    TrapExit::Exited(process.terminate(kernel, EXIT_FAILURE))
}

fn invoke(
    kernel: &Kernel,
    process: &mut Process,
    frame: &TrapFrame,
    call: Syscall,
) -> Result<Completion, SyscallError> {
    let space = process.space();
    let value = match call {
        Syscall::Halt => return Ok(Completion::Halt),
        Syscall::Exit => {
            let [status] = frame.args::<1>(space)?;
            return Ok(Completion::Exit(status as ExitStatus));
        }
        Syscall::Exec => {
            let [cmdline] = frame.args::<1>(space)?;
            sys_exec(kernel, process, cmdline)?
        }
        Syscall::Wait => {
            let [pid] = frame.args::<1>(space)?;
            sys_wait(kernel, process, pid)?
        }
        Syscall::Create => {
            let [name, size] = frame.args::<2>(space)?;
            sys_create(kernel, process, name, size)?
        }
        Syscall::Remove => {
            let [name] = frame.args::<1>(space)?;
            sys_remove(kernel, process, name)?
        }
        Syscall::Open => {
            let [name] = frame.args::<1>(space)?;
            sys_open(kernel, process, name)?
        }
        Syscall::Filesize => {
            let [fd] = frame.args::<1>(space)?;
            sys_filesize(kernel, process, fd)?
        }
        Syscall::Read => {
            let [fd, buf, len] = frame.args::<3>(space)?;
            sys_read(kernel, process, fd, buf, len)?
        }
        Syscall::Write => {
            let [fd, buf, len] = frame.args::<3>(space)?;
            sys_write(kernel, process, fd, buf, len)?
        }
        Syscall::Seek => {
            let [fd, pos] = frame.args::<2>(space)?;
            sys_seek(kernel, process, fd, pos)?
        }
        Syscall::Tell => {
            let [fd] = frame.args::<1>(space)?;
            sys_tell(kernel, process, fd)?
        }
        Syscall::Close => {
            let [fd] = frame.args::<1>(space)?;
            sys_close(kernel, process, fd)?
        }
    };
    Ok(Completion::Return(value))
}

/// Range-check a raw handle word.
fn handle(raw: u32) -> Result<Fd, SyscallError> {
    Fd::new(raw as i32).ok_or(SyscallError::BadHandle(raw))
}

fn from_fd_error(fd: Fd, err: FdError) -> SyscallError {
    match err {
        FdError::Console | FdError::NotOpen => SyscallError::NotOpen(fd),
        FdError::Exhausted => SyscallError::TooManyFiles,
    }
}

/// Spawn a child running `cmdline`.
fn sys_exec(kernel: &Kernel, process: &mut Process, cmdline: u32) -> SyscallResult {
    let cmdline = validate::copy_in_str(process.space(), cmdline as usize)?;
    let (notifier, record) = link(kernel.cpu_handle());
    let pid = kernel
        .loader()
        .spawn(&cmdline, notifier)
        .ok_or(SyscallError::ExecFailed)?;
    process.adopt(pid, record);
    Ok(pid.0 as u32)
}

/// Wait for a child and collect its status.
fn sys_wait(kernel: &Kernel, process: &mut Process, pid: u32) -> SyscallResult {
    let status = process.wait(Pid(pid as i32), kernel)?;
    Ok(status as u32)
}

/// Create a file of `size` bytes.
fn sys_create(kernel: &Kernel, process: &mut Process, name: u32, size: u32) -> SyscallResult {
    let name = validate::copy_in_str(process.space(), name as usize)?;
    let created = kernel.filesystem().create(&name, size as usize);
    Ok(created as u32)
}

/// Remove a file name.
fn sys_remove(kernel: &Kernel, process: &mut Process, name: u32) -> SyscallResult {
    let name = validate::copy_in_str(process.space(), name as usize)?;
    let removed = kernel.filesystem().remove(&name);
    Ok(removed as u32)
}

/// Open a file and return a fresh handle.
fn sys_open(kernel: &Kernel, process: &mut Process, name: u32) -> SyscallResult {
    let name = validate::copy_in_str(process.space(), name as usize)?;
    let mut fs = kernel.filesystem();
    let file = fs.open(&name).ok_or(SyscallError::NoSuchFile)?;
    let (_, files) = process.split_mut();
    match files.allocate(file) {
        Ok(fd) => Ok(fd.index() as u32),
        Err(file) => {
            drop(file);
            Err(SyscallError::TooManyFiles)
        }
    }
}

/// Length of an open file.
fn sys_filesize(kernel: &Kernel, process: &mut Process, fd: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let _fs = kernel.filesystem();
    let (_, files) = process.split_mut();
    let file = files.resolve(fd).map_err(|e| from_fd_error(fd, e))?;
    Ok(file.len() as u32)
}

/// Read up to `len` bytes into `buf`.
///
/// Handle 0 reads the keyboard one byte at a time.
fn sys_read(kernel: &Kernel, process: &mut Process, fd: u32, buf: u32, len: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let len = len as usize;
    if len == 0 {
        return Ok(0);
    }
    let (space, files) = process.split_mut();
    let buffer = validate::validate_buffer_mut(space, buf as usize, len)?;

    if fd == Fd::STDOUT {
        return Err(SyscallError::WrongDirection(fd));
    }
    if fd == Fd::STDIN {
        for offset in 0..len {
            let byte = kernel.console().read_byte();
            buffer.write_at(offset, &[byte]);
        }
        return Ok(len as u32);
    }

    let _fs = kernel.filesystem();
    let file = files.resolve(fd).map_err(|e| from_fd_error(fd, e))?;
    let mut chunk = vec![0u8; len.min(PAGE_SIZE)];
    let mut done = 0;
    while done < len {
        let want = (len - done).min(chunk.len());
        let got = file.read(&mut chunk[..want]);
        buffer.write_at(done, &chunk[..got]);
        done += got;
        if got < want {
            break;
        }
    }
    if done == 0 {
        return Err(SyscallError::NoTransfer);
    }
    Ok(done as u32)
}

/// Write `len` bytes from `buf`.
///
/// Handle 1 writes the console as a single block.
fn sys_write(kernel: &Kernel, process: &mut Process, fd: u32, buf: u32, len: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let len = len as usize;
    if len == 0 {
        return Ok(0);
    }
    let (space, files) = process.split_mut();
    let buffer = validate::validate_buffer(space, buf as usize, len)?;

    if fd == Fd::STDIN {
        return Err(SyscallError::WrongDirection(fd));
    }
    if fd == Fd::STDOUT {
        let bytes = buffer.to_vec();
        kernel.console().write_block(kernel.cpu(), &bytes);
        return Ok(len as u32);
    }

    let _fs = kernel.filesystem();
    let file = files.resolve(fd).map_err(|e| from_fd_error(fd, e))?;
    let mut chunk = vec![0u8; len.min(PAGE_SIZE)];
    let mut done = 0;
    while done < len {
        let want = buffer.read_at(done, &mut chunk);
        let put = file.write(&chunk[..want]);
        done += put;
        if put < want {
            break;
        }
    }
    if done == 0 {
        return Err(SyscallError::NoTransfer);
    }
    Ok(done as u32)
}

/// Move a file's position.
fn sys_seek(kernel: &Kernel, process: &mut Process, fd: u32, pos: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let _fs = kernel.filesystem();
    let (_, files) = process.split_mut();
    let file = files.resolve(fd).map_err(|e| from_fd_error(fd, e))?;
    file.seek(pos as usize);
    Ok(0)
}

/// A file's current position.
fn sys_tell(kernel: &Kernel, process: &mut Process, fd: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let _fs = kernel.filesystem();
    let (_, files) = process.split_mut();
    let file = files.resolve(fd).map_err(|e| from_fd_error(fd, e))?;
    Ok(file.tell() as u32)
}

/// Close a handle.
fn sys_close(kernel: &Kernel, process: &mut Process, fd: u32) -> SyscallResult {
    let fd = handle(fd)?;
    let (_, files) = process.split_mut();
    let file = files.release(fd).map_err(|e| from_fd_error(fd, e))?;
    let _fs = kernel.filesystem();
    drop(file);
    Ok(0)
}
