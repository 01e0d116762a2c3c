//! Exit/Wait Coordination
//!
//! One `ExitRecord` per parent/child pair carries the child's exit status to
//! at most one `wait` in the parent.
//!
//! # Ownership
//! ```text
//!   parent                         child
//!   ┌──────────┐   Arc<ExitRecord>   ┌──────────────┐
//!   │ Child    │────────┐   ┌────────│ ExitNotifier │
//!   └──────────┘        ▼   ▼        └──────────────┘
//!                   ┌───────────┐
//!                   │ status    │ set once
//!                   │ exited    │ semaphore, upped once
//!                   └───────────┘
//! ```
//! - The child consumes its `ExitNotifier` when it terminates, so status is
//!   delivered at most once by construction
//! - The parent consumes its `Child` when it waits, so a second wait finds
//!   nothing
//! - The record is freed when the last side lets go, whichever that is

use alloc::sync::Arc;
use core::fmt;

use spin::Once;

use super::{ExitStatus, Pid, EXIT_FAILURE};
use crate::cpu::Cpu;
use crate::sync::Semaphore;

/// State shared by one parent and one child.
pub struct ExitRecord {
    status: Once<ExitStatus>,
    exited: Semaphore,
}

impl ExitRecord {
    fn new() -> Self {
        Self {
            status: Once::new(),
            exited: Semaphore::new(0),
        }
    }

    /// Exit status, if the child has terminated.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status.get().copied()
    }

    /// Fix the status and wake the parent. Only the first call counts.
    fn publish(&self, status: ExitStatus, cpu: &dyn Cpu) {
        let mut first = false;
        self.status.call_once(|| {
            first = true;
            status
        });
        if first {
            self.exited.up(cpu);
        }
    }
}

impl fmt::Debug for ExitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitRecord")
            .field("status", &self.status())
            .finish()
    }
}

/// Create the two ends of a fresh coordination record.
///
/// `cpu` is kept by the child end so that it can still wake the parent if
/// it is dropped without ever being notified.
pub fn link(cpu: Arc<dyn Cpu>) -> (ExitNotifier, Arc<ExitRecord>) {
    let record = Arc::new(ExitRecord::new());
    (
        ExitNotifier {
            record: record.clone(),
            cpu,
        },
        record,
    )
}

/// Child-side end of a coordination record.
///
/// Dropping it unnotified reports `EXIT_FAILURE`, so a parent never waits
/// on a child that can no longer exit.
pub struct ExitNotifier {
    record: Arc<ExitRecord>,
    cpu: Arc<dyn Cpu>,
}

impl ExitNotifier {
    /// Publish the final status and wake a waiting parent.
    ///
    /// Consumes the notifier, which drops the child's share of the record.
    pub fn notify(self, status: ExitStatus) {
        self.record.publish(status, &*self.cpu);
    }
}

impl Drop for ExitNotifier {
    fn drop(&mut self) {
        self.record.publish(EXIT_FAILURE, &*self.cpu);
    }
}

impl fmt::Debug for ExitNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExitNotifier").field(&*self.record).finish()
    }
}

/// Parent-side end of a coordination record.
#[derive(Debug)]
pub struct Child {
    pid: Pid,
    record: Arc<ExitRecord>,
}

impl Child {
    pub(crate) fn new(pid: Pid, record: Arc<ExitRecord>) -> Self {
        Self { pid, record }
    }

    /// Process id of the child.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Whether the child has already terminated.
    pub fn has_exited(&self) -> bool {
        self.record.status.is_completed()
    }

    /// Block until the child terminates and return its status.
    ///
    /// Returns immediately if the child already exited.
    pub fn wait(self, cpu: &dyn Cpu) -> ExitStatus {
        self.record.exited.down(cpu);
        self.record.status().unwrap_or(EXIT_FAILURE)
    }
}
