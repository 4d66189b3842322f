//! Reference FIFO scheduler
//!
//! A ready queue and a blocked set behind one lock. It makes no scheduling
//! decisions beyond arrival order; the kernel's real scheduler plugs in
//! through the same [`Scheduler`] trait.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hashbrown::HashSet;
use nos_api::{Pid, Scheduler};
use spin::Mutex;

#[derive(Debug, Default)]
struct RunQueues {
    ready: VecDeque<Pid>,
    blocked: HashSet<Pid>,
}

/// First-in first-out run queue
#[derive(Debug, Default)]
pub struct FifoScheduler {
    queues: Mutex<RunQueues>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dequeues the next runnable pid
    pub fn pick_next(&self) -> Option<Pid> {
        self.queues.lock().ready.pop_front()
    }

    /// Snapshot of the ready queue, front first
    pub fn ready(&self) -> Vec<Pid> {
        self.queues.lock().ready.iter().copied().collect()
    }

    /// True if `pid` is parked as blocked
    pub fn is_blocked(&self, pid: Pid) -> bool {
        self.queues.lock().blocked.contains(&pid)
    }

    /// True if `pid` is queued as ready
    pub fn is_ready(&self, pid: Pid) -> bool {
        self.queues.lock().ready.contains(&pid)
    }
}

impl Scheduler for FifoScheduler {
    fn enqueue(&self, pid: Pid) {
        let mut q = self.queues.lock();
        q.blocked.remove(&pid);
        if !q.ready.contains(&pid) {
            q.ready.push_back(pid);
        }
    }

    fn block(&self, pid: Pid) {
        let mut q = self.queues.lock();
        q.ready.retain(|&p| p != pid);
        q.blocked.insert(pid);
    }

    fn wake(&self, pid: Pid) {
        let mut q = self.queues.lock();
        if q.blocked.remove(&pid) && !q.ready.contains(&pid) {
            q.ready.push_back(pid);
        }
    }

    fn remove(&self, pid: Pid) {
        let mut q = self.queues.lock();
        q.ready.retain(|&p| p != pid);
        q.blocked.remove(&pid);
    }
}
