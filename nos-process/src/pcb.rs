//! Process control block

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;

use nos_api::process::{ExitStatus, WaitTarget};
use nos_api::{Pid, ProcessState};
use nos_memory_management::{AddressSpace, MemoryRegions};
use spin::Mutex;

use crate::context::CpuContext;
use crate::fd::FdTable;
use crate::signal::SignalState;

/// Shared handle to a process address space
pub type SpaceRef = Arc<Mutex<AddressSpace>>;

/// Index of a slot in the process table
pub(crate) type SlotIndex = usize;

/// Process Control Block
///
/// Owned by the process table. Tree links are slot indices, valid only
/// while the table lock is held.
#[derive(Debug)]
pub struct Proc {
    pub pid: Pid,
    /// Parent pid (0 for the root)
    pub ppid: Pid,
    pub name: String,
    pub cmdline: String,
    pub state: ProcessState,
    pub priority: u8,
    /// Accumulated CPU time in ticks
    pub cpu_time: u64,
    /// Address space; `None` once released by exit
    pub space: Option<SpaceRef>,
    /// Entry point of the current image
    pub entry_point: usize,
    pub context: CpuContext,
    pub fds: FdTable,
    pub signals: SignalState,
    /// Set when the process becomes a zombie
    pub exit_status: Option<ExitStatus>,
    /// Target of the wait this process is blocked in
    pub waiting_for: Option<WaitTarget>,

    pub(crate) parent: Option<SlotIndex>,
    pub(crate) first_child: Option<SlotIndex>,
    pub(crate) first_zombie: Option<SlotIndex>,
    /// Next entry in whichever parent list (live or zombie) holds this PCB
    pub(crate) next_sibling: Option<SlotIndex>,
}

impl Proc {
    /// A READY process with no links
    pub fn new(pid: Pid, name: String, space: SpaceRef, fds: FdTable) -> Self {
        Self {
            pid,
            ppid: 0,
            cmdline: name.clone(),
            name,
            state: ProcessState::Ready,
            priority: crate::config::DEFAULT_PRIORITY,
            cpu_time: 0,
            space: Some(space),
            entry_point: 0,
            context: CpuContext::new(),
            fds,
            signals: SignalState::new(),
            exit_status: None,
            waiting_for: None,
            parent: None,
            first_child: None,
            first_zombie: None,
            next_sibling: None,
        }
    }

    /// True for READY, RUNNING and BLOCKED
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Region bounds of the current image
    pub fn regions(&self) -> MemoryRegions {
        self.space
            .as_ref()
            .map(|space| space.lock().regions().clone())
            .unwrap_or_default()
    }
}

/// Read-only snapshot of a process for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub cmdline: String,
    pub state: ProcessState,
    pub priority: u8,
    pub cpu_time: u64,
    pub entry_point: usize,
    /// Encoded wait status, present once the process is a zombie
    pub exit_status: Option<i32>,
    pub open_fds: usize,
    pub regions: MemoryRegions,
}

impl ProcessInfo {
    pub(crate) fn from_proc(proc: &Proc) -> Self {
        Self {
            pid: proc.pid,
            ppid: proc.ppid,
            name: proc.name.clone(),
            cmdline: proc.cmdline.clone(),
            state: proc.state,
            priority: proc.priority,
            cpu_time: proc.cpu_time,
            entry_point: proc.entry_point,
            exit_status: proc.exit_status.map(ExitStatus::encode),
            open_fds: proc.fds.open_count(),
            regions: proc.regions(),
        }
    }
}

/// Truncates `s` to fewer than `limit` bytes on a char boundary.
pub(crate) fn bounded(s: &str, limit: usize) -> String {
    let max = limit.saturating_sub(1);
    if s.len() <= max {
        return String::from(s);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&s[..end])
}
