//! System call traits
//!
//! This module provides common traits for system calls.

use nos_api::{Pid, SyscallArgs, SyscallResult};
use nos_process::ProcessManager;

/// Who is calling and which process core serves the call
#[derive(Clone, Copy)]
pub struct SyscallContext<'a> {
    pub manager: &'a ProcessManager,
    pub caller: Pid,
}

impl<'a> SyscallContext<'a> {
    pub fn new(manager: &'a ProcessManager, caller: Pid) -> Self {
        Self { manager, caller }
    }
}

/// System call handler trait
pub trait SyscallHandler: Send + Sync {
    /// Execute the system call
    fn execute(&self, ctx: &SyscallContext<'_>, args: &SyscallArgs) -> SyscallResult;

    /// Get the system call name
    fn name(&self) -> &str;

    /// Get the system call ID
    fn id(&self) -> u32;
}
