//! Write-fault handling for user processes
//!
//! The VM layer reports a write fault with the faulting pid and address.
//! Resolution runs under the address-space and frame locks only; the table
//! lock is taken afterwards, and only if the process must be killed.

use nos_api::process::signal::{SIGKILL, SIGSEGV};
use nos_api::{KernelError, Pid, Result, Signal};
use nos_memory_management::{handle_cow_fault, CowResolution};

use crate::manager::ProcessManager;

/// What happened to the faulting process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The write can be retried
    Resolved(CowResolution),
    /// The process was terminated by this signal
    Terminated(Signal),
}

impl ProcessManager {
    /// Handles a write fault by `pid` at `va`.
    ///
    /// Out of memory while copying kills the process with SIGKILL; a write
    /// to an unmapped or read-only page kills it with SIGSEGV.
    pub fn handle_page_fault(&self, pid: Pid, va: usize) -> Result<FaultOutcome> {
        let space = self.address_space(pid)?;
        let result = handle_cow_fault(&mut space.lock(), &self.frames, va);
        drop(space);

        match result {
            Ok(resolution) => {
                if resolution.copied() {
                    self.stats.cow_copied(1);
                }
                Ok(FaultOutcome::Resolved(resolution))
            }
            Err(err) => {
                let signal = if err.kind() == KernelError::OutOfMemory { SIGKILL } else { SIGSEGV };
                log::error!("process: {} fault at {:#x}: {}; terminating with signal {}", pid, va, err, signal);
                self.terminate(pid, signal)?;
                Ok(FaultOutcome::Terminated(signal))
            }
        }
    }
}
