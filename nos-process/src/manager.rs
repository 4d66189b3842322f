//! Core Process Management
//!
//! [`ProcessManager`] owns the process table behind a single lock together
//! with the collaborators the lifecycle needs: the frame pool, an image
//! loader and a scheduler. Lifecycle operations live in their own modules
//! (`fork`, `exec`, `exit`, `wait`, `fault`); this module holds
//! construction, bootstrap, introspection and per-process accessors.
//!
//! Lock order: table, then address space, then frame. Nothing takes the
//! table lock while holding an address-space lock.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use nos_api::error::{bad_address, invalid_argument, invalid_state, no_process, out_of_memory};
use nos_api::{Fd, OpenFile, Pid, ProcessState, Result, Scheduler, Signal};
use nos_memory_management::uaccess;
use nos_memory_management::{handle_cow_fault, page_round_down, page_round_up, AddressSpace, FrameTable, PteFlags, PAGE_SIZE, USER_HEAP_BASE};
use spin::Mutex;

use crate::config::ProcessConfig;
use crate::context::CpuContext;
use crate::fd::{FdFlags, FdTable};
use crate::loader::ImageLoader;
use crate::pcb::{bounded, Proc, ProcessInfo, SpaceRef};
use crate::signal::{SigAction, SignalState};
use crate::stats::{LifecycleSnapshot, LifecycleStats};
use crate::table::{ProcHandle, ProcTable};

/// The process lifecycle core
pub struct ProcessManager {
    pub(crate) table: Mutex<ProcTable>,
    pub(crate) frames: Arc<FrameTable>,
    pub(crate) loader: Arc<dyn ImageLoader>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) config: ProcessConfig,
    pub(crate) stats: LifecycleStats,
}

impl ProcessManager {
    /// Creates a manager with an empty process table.
    pub fn new(
        config: ProcessConfig,
        frames: Arc<FrameTable>,
        loader: Arc<dyn ImageLoader>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let table = ProcTable::new(config.max_processes, config.first_pid, config.max_pid);
        Ok(Self {
            table: Mutex::new(table),
            frames,
            loader,
            scheduler,
            config,
            stats: LifecycleStats::new(),
        })
    }

    /// Creates the root process: an empty address space, no descriptors,
    /// state READY. The root is never reaped and adopts orphans.
    pub fn bootstrap_root(&self, name: &str) -> Result<Pid> {
        let mut table = self.table.lock();
        let pid = table.peek_pid()?;
        let space = Arc::new(Mutex::new(AddressSpace::new(&self.frames)?));
        let proc = Proc::new(
            pid,
            bounded(name, self.config.max_name_len),
            space.clone(),
            FdTable::new(self.config.max_fds),
        );
        if let Err(err) = table.insert_root(proc) {
            space.lock().teardown(&self.frames);
            return Err(err);
        }
        self.scheduler.enqueue(pid);
        log::info!("process: root {} ({}) created", pid, name);
        Ok(pid)
    }

    /// Configuration in use
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Shared frame pool
    pub fn frames(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    /// Lifecycle counters
    pub fn stats(&self) -> LifecycleSnapshot {
        self.stats.snapshot()
    }

    /// Zeroes the lifecycle counters
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    fn with_proc<R>(&self, pid: Pid, f: impl FnOnce(&Proc) -> R) -> Result<R> {
        let table = self.table.lock();
        let handle = table.lookup(pid).ok_or_else(|| no_process(pid))?;
        table.get(handle).map(f).ok_or_else(|| no_process(pid))
    }

    fn with_live_proc_mut<R>(&self, pid: Pid, f: impl FnOnce(&mut Proc) -> Result<R>) -> Result<R> {
        let mut table = self.table.lock();
        let index = table.live_index(pid)?;
        let proc = table.at_mut(index).ok_or_else(|| no_process(pid))?;
        f(proc)
    }

    /// Pid of the root process
    pub fn root_pid(&self) -> Option<Pid> {
        self.table.lock().root_pid()
    }

    /// Generation-checked handle for `pid`
    pub fn handle(&self, pid: Pid) -> Option<ProcHandle> {
        self.table.lock().lookup(pid)
    }

    /// True if `handle` still names the process it was issued for
    pub fn is_current(&self, handle: ProcHandle) -> bool {
        self.table.lock().get(handle).is_some()
    }

    /// Snapshot of one process
    pub fn info(&self, pid: Pid) -> Result<ProcessInfo> {
        self.with_proc(pid, ProcessInfo::from_proc)
    }

    /// Lifecycle state of `pid`
    pub fn state(&self, pid: Pid) -> Result<ProcessState> {
        self.with_proc(pid, |proc| proc.state)
    }

    /// Saved CPU context of `pid`
    pub fn context(&self, pid: Pid) -> Result<CpuContext> {
        self.with_proc(pid, |proc| proc.context)
    }

    /// Live children of `pid`, most recently created first
    pub fn children(&self, pid: Pid) -> Result<Vec<Pid>> {
        let table = self.table.lock();
        let index = table.index_of(pid).ok_or_else(|| no_process(pid))?;
        Ok(table
            .children_of(index)
            .into_iter()
            .filter_map(|child| table.at(child).map(|proc| proc.pid))
            .collect())
    }

    /// Unreaped zombie children of `pid`, most recently exited first
    pub fn zombies(&self, pid: Pid) -> Result<Vec<Pid>> {
        let table = self.table.lock();
        let index = table.index_of(pid).ok_or_else(|| no_process(pid))?;
        Ok(table
            .zombies_of(index)
            .into_iter()
            .filter_map(|child| table.at(child).map(|proc| proc.pid))
            .collect())
    }

    /// Occupied table slots, zombies included
    pub fn process_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Every pid in the table
    pub fn pids(&self) -> Vec<Pid> {
        self.table.lock().iter().map(|proc| proc.pid).collect()
    }

    /// Checks the process tree invariants
    pub fn validate_tree(&self) -> Result<()> {
        self.table.lock().validate_tree()
    }

    /// `getpid` for `caller`
    pub fn getpid(&self, caller: Pid) -> Result<Pid> {
        self.with_proc(caller, |proc| proc.pid)
    }

    /// `getppid` for `caller`; 0 for the root
    pub fn getppid(&self, caller: Pid) -> Result<Pid> {
        self.with_proc(caller, |proc| proc.ppid)
    }

    // ========================================================================
    // Scheduler-driven state
    // ========================================================================

    /// READY -> RUNNING
    pub fn set_running(&self, pid: Pid) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| match proc.state {
            ProcessState::Ready | ProcessState::Running => {
                proc.state = ProcessState::Running;
                Ok(())
            }
            _ => Err(invalid_state("only a READY process can run")),
        })
    }

    /// RUNNING -> READY (preemption or yield)
    pub fn set_ready(&self, pid: Pid) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| match proc.state {
            ProcessState::Running | ProcessState::Ready => {
                proc.state = ProcessState::Ready;
                Ok(())
            }
            _ => Err(invalid_state("only a RUNNING process can be preempted")),
        })
    }

    /// Adds `ticks` to the CPU time of `pid`
    pub fn charge_cpu_time(&self, pid: Pid, ticks: u64) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| {
            proc.cpu_time = proc.cpu_time.saturating_add(ticks);
            Ok(())
        })
    }

    // ========================================================================
    // Descriptors and signals
    // ========================================================================

    /// Opens a descriptor for `file` in `pid`
    pub fn install_fd(&self, pid: Pid, file: Arc<dyn OpenFile>, flags: FdFlags) -> Result<Fd> {
        self.with_live_proc_mut(pid, |proc| proc.fds.install(file, flags))
    }

    /// Closes a descriptor of `pid`
    pub fn close_fd(&self, pid: Pid, fd: Fd) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| proc.fds.close(fd))
    }

    /// Changes the close-on-exec state of a descriptor
    pub fn set_fd_flags(&self, pid: Pid, fd: Fd, flags: FdFlags) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| proc.fds.set_flags(fd, flags))
    }

    /// Installs a signal disposition, returning the previous one
    pub fn set_signal_action(&self, pid: Pid, sig: Signal, action: SigAction) -> Result<SigAction> {
        self.with_live_proc_mut(pid, |proc| proc.signals.set_action(sig, action))
    }

    /// Marks a signal pending for `pid`
    pub fn raise_signal(&self, pid: Pid, sig: Signal) -> Result<()> {
        self.with_live_proc_mut(pid, |proc| proc.signals.raise(sig))
    }

    /// Replaces the blocked-signal mask
    pub fn set_signal_mask(&self, pid: Pid, mask: u32) -> Result<u32> {
        self.with_live_proc_mut(pid, |proc| Ok(proc.signals.set_mask(mask)))
    }

    /// Copy of the signal state of `pid`
    pub fn signal_state(&self, pid: Pid) -> Result<SignalState> {
        self.with_proc(pid, |proc| proc.signals.clone())
    }

    // ========================================================================
    // Memory
    // ========================================================================

    /// Address space of a live process. The table lock is released before
    /// the caller locks the space.
    pub fn address_space(&self, pid: Pid) -> Result<SpaceRef> {
        let table = self.table.lock();
        let index = table.live_index(pid)?;
        table
            .at(index)
            .and_then(|proc| proc.space.clone())
            .ok_or_else(|| no_process(pid))
    }

    /// Grows the heap by at least `increment` bytes (rounded to pages) and
    /// returns the previous break.
    pub fn extend_heap(&self, pid: Pid, increment: usize) -> Result<usize> {
        let space = self.address_space(pid)?;
        let mut space = space.lock();
        let mut regions = space.regions().clone();
        if regions.heap.is_empty() && regions.heap.start == 0 {
            regions.heap = USER_HEAP_BASE..USER_HEAP_BASE;
        }
        let old_break = regions.heap.end;
        if increment == 0 {
            return Ok(old_break);
        }
        let new_break = old_break
            .checked_add(page_round_up(increment))
            .filter(|&end| regions.stack.is_empty() || end <= regions.stack.start)
            .ok_or_else(out_of_memory)?;
        space.map_range(&self.frames, old_break, new_break - old_break, PteFlags::USER_DATA)?;
        regions.heap.end = new_break;
        space.set_regions(regions);
        log::debug!(
            "process {}: heap {:#x} -> {:#x} ({} pages)",
            pid,
            old_break,
            new_break,
            (new_break - old_break) / PAGE_SIZE
        );
        Ok(old_break)
    }

    /// Writes into the user memory of `pid`; COW pages are copied first.
    pub fn copy_to_user(&self, pid: Pid, va: usize, data: &[u8]) -> Result<()> {
        let space = self.address_space(pid)?;
        let copied = uaccess::copy_to_user(&mut space.lock(), &self.frames, va, data)?;
        self.stats.cow_copied(copied);
        Ok(())
    }

    /// Reads from the user memory of `pid`
    pub fn copy_from_user(&self, pid: Pid, va: usize, buf: &mut [u8]) -> Result<()> {
        let space = self.address_space(pid)?;
        let guard = space.lock();
        uaccess::copy_from_user(&guard, &self.frames, va, buf)
    }

    /// Reads a NUL-terminated user string of at most `cap` bytes
    pub fn read_user_cstr(&self, pid: Pid, va: usize, cap: usize) -> Result<String> {
        let space = self.address_space(pid)?;
        let bytes = uaccess::read_user_cstr(&space.lock(), &self.frames, va, cap)?;
        String::from_utf8(bytes).map_err(|_| invalid_argument("user string is not valid UTF-8"))
    }

    /// Reads a null-terminated user pointer array of at most `max` entries
    pub fn read_user_ptr_array(&self, pid: Pid, va: usize, max: usize) -> Result<Vec<usize>> {
        let space = self.address_space(pid)?;
        let guard = space.lock();
        uaccess::read_user_ptr_array(&guard, &self.frames, va, max)
    }

    /// Makes `[va, va + len)` privately writable in `pid` without changing
    /// its contents, so a later `copy_to_user` into it cannot fail.
    ///
    /// Fails with `EFAULT` if the range is not logically writable user
    /// memory and with `ENOMEM` if a shared COW page cannot be copied.
    pub fn prepare_user_write(&self, pid: Pid, va: usize, len: usize) -> Result<()> {
        let space = self.address_space(pid)?;
        let mut guard = space.lock();
        if va == 0 || !nos_memory_management::is_user_range(va, len) || !guard.check_range(va, len, true) {
            return Err(bad_address(va));
        }
        let end = va + len;
        let mut page = page_round_down(va);
        while page < end {
            if handle_cow_fault(&mut guard, &self.frames, page)?.copied() {
                self.stats.cow_copied(1);
            }
            page += PAGE_SIZE;
        }
        Ok(())
    }
}

impl core::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("table", &*self.table.lock())
            .field("frames", &self.frames)
            .field("config", &self.config)
            .finish()
    }
}
