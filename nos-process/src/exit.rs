//! Process termination
//!
//! Every process leaves through [`ProcessManager::exit`] or
//! [`ProcessManager::terminate`]. Under the table lock the exit path
//! hands live children and unreaped zombies to the adopter, moves the PCB
//! onto its parent's zombie list, releases descriptors, detaches the
//! address space and wakes the parent if it is waiting for it.
//! The slot itself is freed only when the parent reaps it.

use nos_api::error::{invalid_argument, invalid_state, permission_denied};
use nos_api::process::signal::NSIG;
use nos_api::process::ExitStatus;
use nos_api::{Pid, ProcessState, Result, Signal};

use crate::config::ReparentPolicy;
use crate::manager::ProcessManager;
use crate::pcb::SlotIndex;
use crate::table::ProcTable;

impl ProcessManager {
    /// Normal exit with `code` (only the low 8 bits are kept).
    pub fn exit(&self, pid: Pid, code: i32) -> Result<()> {
        self.do_exit(pid, ExitStatus::Exited((code & 0xff) as u8))
    }

    /// Fatal termination by `signal`.
    pub fn terminate(&self, pid: Pid, signal: Signal) -> Result<()> {
        if signal == 0 || signal as usize >= NSIG {
            return Err(invalid_argument("signal number out of range"));
        }
        self.do_exit(pid, ExitStatus::Signaled(signal))?;
        self.stats.fatal_termination();
        Ok(())
    }

    fn do_exit(&self, pid: Pid, status: ExitStatus) -> Result<()> {
        let (space, orphans) = {
            let mut table = self.table.lock();
            let index = table.live_index(pid)?;
            if Some(index) == table.root_index() {
                return Err(permission_denied("root process cannot exit"));
            }
            let parent = table
                .at(index)
                .and_then(|proc| proc.parent)
                .ok_or_else(|| invalid_state("live process without parent"))?;
            let adopter = match self.config.reparent {
                ReparentPolicy::NearestAncestor => parent,
                ReparentPolicy::Init => table
                    .root_index()
                    .ok_or_else(|| invalid_state("no root process"))?,
            };

            // Relink first: every index below comes from the tree itself, so
            // these only fail on a corrupt table, and then the PCB is untouched.
            let orphans = self.reparent_children(&mut table, index, adopter)?;
            table.unlink_child(parent, index)?;
            table.link_zombie(parent, index)?;

            let proc = table
                .at_mut(index)
                .ok_or_else(|| invalid_state("exiting slot is empty"))?;
            let space = proc.space.take();
            let closed = proc.fds.close_all();
            proc.exit_status = Some(status);
            proc.state = ProcessState::Zombie;
            proc.waiting_for = None;
            log::debug!("process: {} closed {} descriptors on exit", pid, closed);

            self.stats.zombie_created();
            self.wake_waiter(&mut table, parent, pid);
            self.scheduler.remove(pid);
            (space, orphans)
        };

        let released = space.map_or(0, |space| space.lock().teardown(&self.frames));
        log::info!(
            "process: {} exited with status {:#x} ({} pages released, {} orphans)",
            pid,
            status.encode(),
            released,
            orphans
        );
        Ok(())
    }

    /// Moves every live child and every unreaped zombie of `from` to `to`.
    /// Returns the number of live children adopted.
    fn reparent_children(&self, table: &mut ProcTable, from: SlotIndex, to: SlotIndex) -> Result<usize> {
        let children = table.children_of(from);
        for &child in &children {
            table.unlink_child(from, child)?;
            table.link_child(to, child)?;
        }
        for zombie in table.zombies_of(from) {
            table.unlink_zombie(from, zombie)?;
            table.link_zombie(to, zombie)?;
            if let Some(zpid) = table.at(zombie).map(|proc| proc.pid) {
                self.wake_waiter(table, to, zpid);
            }
        }
        if !children.is_empty() {
            self.stats.orphans_adopted(children.len());
            log::debug!("process: {} orphans adopted", children.len());
        }
        Ok(children.len())
    }

    /// Wakes `parent` if it is blocked in a wait that `child` satisfies.
    pub(crate) fn wake_waiter(&self, table: &mut ProcTable, parent: SlotIndex, child: Pid) {
        let Some(proc) = table.at_mut(parent) else {
            return;
        };
        let waiting_for_child = proc.waiting_for.is_some_and(|target| target.matches(child));
        if proc.state == ProcessState::Blocked && waiting_for_child {
            proc.state = ProcessState::Ready;
            proc.waiting_for = None;
            self.scheduler.wake(proc.pid);
            log::trace!("process: woke {} for child {}", proc.pid, child);
        }
    }
}
