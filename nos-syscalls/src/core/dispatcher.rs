//! System call dispatcher
//!
//! This module provides the core system call dispatch mechanism.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use hashbrown::HashMap;
use nos_api::error::kernel_error;
use nos_api::{KernelError, Pid, Result, SyscallArgs, SyscallResult};
use nos_process::ProcessManager;
use spin::Mutex;

use super::traits::{SyscallContext, SyscallHandler};
use crate::types::syscall_name;

/// System call dispatcher
pub struct SyscallDispatcher {
    /// Registered system call handlers
    handlers: HashMap<u32, Box<dyn SyscallHandler>>,
    /// System call statistics
    stats: Mutex<SyscallStats>,
}

impl SyscallDispatcher {
    /// Create a new system call dispatcher
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            stats: Mutex::new(SyscallStats::default()),
        }
    }

    /// Register a system call handler. A number can only be claimed once.
    pub fn register_handler(&mut self, id: u32, handler: Box<dyn SyscallHandler>) -> Result<()> {
        if self.handlers.contains_key(&id) {
            return Err(kernel_error(KernelError::Busy));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Get a system call handler
    pub fn get_handler(&self, id: u32) -> Option<&dyn SyscallHandler> {
        self.handlers.get(&id).map(|handler| handler.as_ref())
    }

    /// Dispatch system call `id` issued by `caller`.
    ///
    /// Unknown numbers are `ENOSYS`.
    pub fn dispatch(&self, manager: &ProcessManager, caller: Pid, id: u32, args: &SyscallArgs) -> SyscallResult {
        let result = match self.handlers.get(&id) {
            Some(handler) => handler.execute(&SyscallContext::new(manager, caller), args),
            None => {
                sys_warn!("syscall: {} issued unknown syscall {}", caller, id);
                SyscallResult::Error(KernelError::NotImplemented)
            }
        };
        sys_trace!("syscall: {} {}({:#x}) = {:?}", caller, syscall_name(id), args.arg0, result);

        let mut stats = self.stats.lock();
        stats.total_calls += 1;
        *stats.calls_by_type.entry(id).or_insert(0) += 1;
        match result {
            SyscallResult::Error(_) => stats.error_count += 1,
            SyscallResult::Restart => stats.restart_count += 1,
            SyscallResult::Success(_) => {}
        }
        result
    }

    /// Get system call statistics
    pub fn get_stats(&self) -> SyscallStats {
        self.stats.lock().clone()
    }
}

impl Default for SyscallDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// System call statistics
#[derive(Debug, Clone, Default)]
pub struct SyscallStats {
    /// Total number of system calls
    pub total_calls: u64,
    /// Number of calls by type
    pub calls_by_type: BTreeMap<u32, u64>,
    /// Number of errors
    pub error_count: u64,
    /// Number of calls that blocked and must be re-issued
    pub restart_count: u64,
}

/// Creates a dispatcher with every process system call registered
pub fn init_dispatcher() -> Result<SyscallDispatcher> {
    let mut dispatcher = SyscallDispatcher::new();
    crate::process::register_handlers(&mut dispatcher)?;
    Ok(dispatcher)
}
