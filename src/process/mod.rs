//! Process Records
//!
//! A `Process` is the boundary layer's view of one running program: its
//! address space, its descriptor table, and both ends of its exit/wait
//! coordination.
//!
//! # Lifecycle
//! - Built by the loader when a program is spawned
//! - `terminate` fixes the exit status exactly once, prints the exit line,
//!   closes every descriptor and wakes a waiting parent
//! - The record itself may be dropped any time after that

pub mod exit;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::fd::DescriptorTable;
use crate::kernel::Kernel;
use crate::mm::AddressSpace;

pub use exit::{link, Child, ExitNotifier, ExitRecord};

/// Exit status word reported to the parent.
pub type ExitStatus = i32;

/// Status of a process killed by the kernel.
pub const EXIT_FAILURE: ExitStatus = -1;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-management collaborator: program loading and thread creation.
pub trait Loader: Send + Sync {
    /// Load and start the program named by the first word of `cmdline`.
    ///
    /// The loader builds the child with [`Process::new`], handing it
    /// `notifier`, and returns only once the load has succeeded or failed.
    /// On failure the notifier is simply dropped.
    fn spawn(&self, cmdline: &str, notifier: ExitNotifier) -> Option<Pid>;
}

/// Error type for `Process::wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The pid is not a direct child, or it was already waited for.
    NotChild(Pid),
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotChild(pid) => write!(f, "pid {} is not a waitable child", pid),
        }
    }
}

/// One running program instance.
pub struct Process {
    pid: Pid,
    name: String,
    space: Box<dyn AddressSpace>,
    files: DescriptorTable,
    /// Children not yet waited for.
    children: Vec<Child>,
    /// Our end of the record shared with the parent.
    parent: Option<ExitNotifier>,
    exit_status: Option<ExitStatus>,
}

impl Process {
    /// Create the record for a freshly loaded program.
    ///
    /// The process name is the first word of `cmdline`.
    pub fn new(
        pid: Pid,
        cmdline: &str,
        space: Box<dyn AddressSpace>,
        parent: Option<ExitNotifier>,
    ) -> Self {
        let name = cmdline.split_whitespace().next().unwrap_or("").to_string();
        Self {
            pid,
            name,
            space,
            files: DescriptorTable::new(),
            children: Vec::new(),
            parent,
            exit_status: None,
        }
    }

    /// Process id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Program name used in the exit line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The address space user pointers are checked against.
    pub fn space(&self) -> &dyn AddressSpace {
        &*self.space
    }

    /// Descriptor table.
    pub fn files(&self) -> &DescriptorTable {
        &self.files
    }

    /// Address space and descriptor table, borrowed together.
    pub(crate) fn split_mut(&mut self) -> (&dyn AddressSpace, &mut DescriptorTable) {
        (&*self.space, &mut self.files)
    }

    /// Final status, once `terminate` has run.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Record a newly spawned child.
    pub(crate) fn adopt(&mut self, pid: Pid, record: Arc<ExitRecord>) {
        self.children.push(Child::new(pid, record));
    }

    /// Pids of children not yet waited for.
    pub fn children(&self) -> impl Iterator<Item = Pid> + '_ {
        self.children.iter().map(Child::pid)
    }

    /// Wait for a direct child to terminate and collect its status.
    ///
    /// Fails without blocking if `pid` is not a child of this process or
    /// was already waited for.
    pub fn wait(&mut self, pid: Pid, kernel: &Kernel) -> Result<ExitStatus, WaitError> {
        let index = self
            .children
            .iter()
            .position(|child| child.pid() == pid)
            .ok_or(WaitError::NotChild(pid))?;
        let child = self.children.swap_remove(index);
        log::debug!("process {}: waiting for {}", self.pid, pid);
        Ok(child.wait(kernel.cpu()))
    }

    /// Terminate this process with `status`.
    ///
    /// Only the first call has any effect; later calls return the status
    /// fixed by the first. Safe to reach from any termination path: the
    /// exit call, a validation failure, or a user fault.
    pub fn terminate(&mut self, kernel: &Kernel, status: ExitStatus) -> ExitStatus {
        if let Some(fixed) = self.exit_status {
            return fixed;
        }
        self.exit_status = Some(status);

        kernel
            .console()
            .print(kernel.cpu(), format_args!("{}: exit({})\n", self.name, status));

        let files = self.files.release_all();
        if !files.is_empty() {
            let _fs = kernel.filesystem();
            log::trace!("process {}: closing {} files", self.pid, files.len());
            drop(files);
        }

        // Orphan whatever we never waited for.
        let running = self.children.iter().filter(|child| !child.has_exited()).count();
        if running > 0 {
            log::trace!("process {}: orphaning {} running children", self.pid, running);
        }
        self.children.clear();

        if let Some(parent) = self.parent.take() {
            parent.notify(status);
        }
        log::debug!("process {} ({}) exited: {}", self.pid, self.name, status);
        status
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("files", &self.files)
            .field("children", &self.children.len())
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Rig;

    #[test]
    fn test_name_is_first_word() {
        let rig = Rig::new();
        let (process, _) = rig.process(Pid(1), "  child arg1 arg2");
        assert_eq!(process.name(), "child");
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let rig = Rig::new();
        let (mut process, _) = rig.process(Pid(1), "prog");
        assert_eq!(process.terminate(&rig.kernel, 3), 3);
        assert_eq!(process.terminate(&rig.kernel, EXIT_FAILURE), 3);
        assert_eq!(rig.console.output(), "prog: exit(3)\n");
    }

    #[test]
    fn test_terminate_closes_every_file() {
        let rig = Rig::new();
        let (mut process, _) = rig.process(Pid(1), "prog");
        for name in ["a", "b", "c"] {
            assert!(rig.fs.add(name, b"data"));
            let file = rig.fs.open_file(name).unwrap();
            process.files.allocate(file).ok().unwrap();
        }
        assert_eq!(rig.fs.open_count(), 3);

        process.terminate(&rig.kernel, 0);
        assert_eq!(rig.fs.open_count(), 0);
        assert_eq!(process.files().open_count(), 0);
    }

    #[test]
    fn test_wait_on_stranger_fails() {
        let rig = Rig::new();
        let (mut process, _) = rig.process(Pid(1), "prog");
        assert_eq!(
            process.wait(Pid(99), &rig.kernel),
            Err(WaitError::NotChild(Pid(99)))
        );
    }

    #[test]
    fn test_wait_collects_once() {
        let rig = Rig::new();
        let (mut parent, _) = rig.process(Pid(1), "parent");
        let (notifier, record) = link(rig.kernel.cpu_handle());
        parent.adopt(Pid(2), record);

        let (mut child, _) = rig.process_with_parent(Pid(2), "child", notifier);
        child.terminate(&rig.kernel, 7);

        assert_eq!(parent.wait(Pid(2), &rig.kernel), Ok(7));
        assert_eq!(
            parent.wait(Pid(2), &rig.kernel),
            Err(WaitError::NotChild(Pid(2)))
        );
    }

    #[test]
    fn test_orphan_terminates_cleanly() {
        let rig = Rig::new();
        let (mut parent, _) = rig.process(Pid(1), "parent");
        let (notifier, record) = link(rig.kernel.cpu_handle());
        let weak = Arc::downgrade(&record);
        parent.adopt(Pid(2), record);
        let (mut child, _) = rig.process_with_parent(Pid(2), "child", notifier);

        parent.terminate(&rig.kernel, 0);
        assert!(weak.upgrade().is_some());
        child.terminate(&rig.kernel, 5);
        assert!(weak.upgrade().is_none());
        assert_eq!(rig.console.output(), "parent: exit(0)\nchild: exit(5)\n");
    }

    #[test]
    fn test_child_dropped_without_exit_reports_failure() {
        let rig = Rig::new();
        let (mut parent, _) = rig.process(Pid(1), "parent");
        let (notifier, record) = link(rig.kernel.cpu_handle());
        parent.adopt(Pid(2), record);

        let (child, _) = rig.process_with_parent(Pid(2), "child", notifier);
        drop(child);

        assert_eq!(parent.wait(Pid(2), &rig.kernel), Ok(EXIT_FAILURE));
        assert_eq!(rig.console.output(), "");
    }
}
