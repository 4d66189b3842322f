//! Process management interface
//!
//! Collaborators the lifecycle core consumes but does not implement.

use crate::core::types::Pid;

/// Trait for scheduler
///
/// The lifecycle core only tells the scheduler which processes became
/// runnable, blocked or gone; run-queue policy and context switching stay
/// on the scheduler side. Implementations do their own locking and must
/// not call back into the process manager.
pub trait Scheduler: Send + Sync {
    /// Adds a newly created (or re-readied) process to the run queue
    fn enqueue(&self, pid: Pid);

    /// Takes a process off the run queue because it blocked
    fn block(&self, pid: Pid);

    /// Makes a blocked process runnable again
    fn wake(&self, pid: Pid);

    /// Forgets a process that has exited
    fn remove(&self, pid: Pid);
}

/// Trait for an open file object shared between descriptors
///
/// Descriptors hold these behind `Arc`; the strong count is the file's
/// reference count.
pub trait OpenFile: Send + Sync {
    /// Returns the path or name the file was opened with
    fn name(&self) -> &str;

    /// Called every time a descriptor referring to this file is closed
    fn on_descriptor_close(&self) {}
}
