//! Waiting for children
//!
//! A wait either reaps a matching zombie, reports that none is ready
//! (`WNOHANG`), or blocks the caller. A blocked caller is woken by the exit
//! path and re-issues the call, which then re-evaluates from scratch.

use nos_api::error::no_child;
use nos_api::process::{WaitOptions, WaitOutcome, WaitTarget};
use nos_api::{Pid, ProcessState, Result};

use crate::manager::ProcessManager;

/// Parameters of one wait call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitContext {
    pub target: WaitTarget,
    pub options: WaitOptions,
    /// False when `WNOHANG` was given
    pub blocking: bool,
    /// Encoded status of the reaped child
    pub status: Option<i32>,
}

impl WaitContext {
    /// Decodes raw `waitpid` arguments. Process-group targets and unknown
    /// option bits are `EINVAL`.
    pub fn new(pid: i32, options: u32) -> Result<Self> {
        let target = WaitTarget::from_raw(pid)?;
        let options = WaitOptions::from_raw(options)?;
        Ok(Self {
            target,
            options,
            blocking: !options.contains(WaitOptions::WNOHANG),
            status: None,
        })
    }
}

impl ProcessManager {
    /// `wait(&status)`: any child, blocking.
    pub fn wait(&self, caller: Pid) -> Result<WaitOutcome> {
        self.waitpid(caller, -1, 0)
    }

    /// `waitpid(pid, &status, options)`.
    pub fn waitpid(&self, caller: Pid, pid: i32, options: u32) -> Result<WaitOutcome> {
        self.stats.wait_attempt();
        let result = WaitContext::new(pid, options).and_then(|mut ctx| self.wait_locked(caller, &mut ctx));
        match &result {
            Ok(WaitOutcome::Reaped { pid: child, status }) => {
                self.stats.wait_result(true);
                log::info!("process: {} reaped {} (status {:#x})", caller, child, status);
            }
            Ok(_) => {}
            Err(err) => {
                self.stats.wait_result(false);
                log::debug!("process: wait by {} failed: {}", caller, err);
            }
        }
        result
    }

    fn wait_locked(&self, caller: Pid, ctx: &mut WaitContext) -> Result<WaitOutcome> {
        let mut table = self.table.lock();
        let index = table.live_index(caller)?;
        let target = ctx.target;

        let zombie = table
            .zombies_of(index)
            .into_iter()
            .find(|&z| table.at(z).is_some_and(|proc| target.matches(proc.pid)));
        if let Some(zombie) = zombie {
            let handle = table.handle_at(zombie);
            table.unlink_zombie(index, zombie)?;
            let child = table.remove(handle)?;
            let status = child.exit_status.map_or(0, |s| s.encode());
            ctx.status = Some(status);
            self.stats.zombie_reaped();
            return Ok(WaitOutcome::Reaped { pid: child.pid, status });
        }

        let has_match = table
            .children_of(index)
            .into_iter()
            .any(|c| table.at(c).is_some_and(|proc| target.matches(proc.pid)));
        if !has_match {
            return Err(no_child());
        }
        if !ctx.blocking {
            return Ok(WaitOutcome::NotReady);
        }

        if let Some(proc) = table.at_mut(index) {
            proc.state = ProcessState::Blocked;
            proc.waiting_for = Some(target);
        }
        self.scheduler.block(caller);
        log::trace!("process: {} blocked waiting for {:?}", caller, target);
        Ok(WaitOutcome::Blocked)
    }
}
