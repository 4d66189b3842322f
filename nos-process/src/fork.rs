//! Process creation
//!
//! Fork runs entirely under the table lock and validates before it
//! mutates: the child is inserted and linked only after the address space
//! duplication (the only step that can run out of memory) has succeeded.
//! A failed fork leaves the table, the parent and every frame reference
//! count as they were.

extern crate alloc;

use alloc::sync::Arc;

use nos_api::error::{invalid_state, no_process, try_again};
use nos_api::{Pid, Result};
use spin::Mutex;

use crate::manager::ProcessManager;
use crate::pcb::Proc;

/// Outcome of one fork
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkContext {
    pub parent_pid: Pid,
    pub child_pid: Pid,
    /// Memory is shared copy-on-write rather than copied
    pub cow: bool,
    /// Pages referenced by both address spaces
    pub shared_pages: usize,
    /// Writable pages among them, now marked COW
    pub cow_pages: usize,
    /// Pages physically copied during the fork
    pub copied_pages: usize,
}

impl ProcessManager {
    /// Duplicates `caller`. The parent's saved return value becomes the
    /// child's pid and the child's becomes 0.
    pub fn fork(&self, caller: Pid) -> Result<ForkContext> {
        self.stats.fork_attempt();
        let result = self.fork_locked(caller);
        match &result {
            Ok(ctx) => {
                self.stats.fork_result(true, ctx.cow_pages);
                log::info!(
                    "process: {} forked {} ({} pages shared, {} cow)",
                    ctx.parent_pid,
                    ctx.child_pid,
                    ctx.shared_pages,
                    ctx.cow_pages
                );
            }
            Err(err) => {
                self.stats.fork_result(false, 0);
                log::warn!("process: fork of {} failed: {}", caller, err);
            }
        }
        result
    }

    fn fork_locked(&self, caller: Pid) -> Result<ForkContext> {
        let mut table = self.table.lock();
        let parent_index = table.live_index(caller)?;
        if !table.has_free_slot() {
            return Err(try_again("process table full"));
        }
        let child_pid = table.peek_pid()?;

        let parent = table.at(parent_index).ok_or_else(|| no_process(caller))?;
        let parent_space = parent.space.clone().ok_or_else(|| no_process(caller))?;

        let (child_space, share) = parent_space.lock().fork_cow(&self.frames)?;
        let child_space = Arc::new(Mutex::new(child_space));

        let mut child = Proc::new(child_pid, parent.name.clone(), child_space.clone(), parent.fds.duplicate());
        child.cmdline = parent.cmdline.clone();
        child.priority = parent.priority;
        child.entry_point = parent.entry_point;
        child.signals = parent.signals.fork_copy();
        child.context = parent.context;
        child.context.set_return_value(0);

        let handle = match table.insert(child) {
            Ok(handle) => handle,
            Err(err) => {
                child_space.lock().teardown(&self.frames);
                return Err(err);
            }
        };
        if let Err(err) = table.link_child(parent_index, handle.index()) {
            if let Err(remove_err) = table.remove(handle) {
                log::warn!("process: could not unwind child {} of {}: {}", child_pid, caller, remove_err);
            }
            child_space.lock().teardown(&self.frames);
            return Err(err);
        }

        table
            .at_mut(parent_index)
            .ok_or_else(|| invalid_state("parent vanished during fork"))?
            .context
            .set_return_value(child_pid as i64);
        self.scheduler.enqueue(child_pid);

        Ok(ForkContext {
            parent_pid: caller,
            child_pid,
            cow: true,
            shared_pages: share.total(),
            cow_pages: share.cow_pages,
            copied_pages: 0,
        })
    }
}
