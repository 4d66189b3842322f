//! Lifecycle statistics

use core::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters, updated lock-free
#[derive(Debug, Default)]
pub struct LifecycleStats {
    total_forks: AtomicU64,
    successful_forks: AtomicU64,
    failed_forks: AtomicU64,
    total_execs: AtomicU64,
    successful_execs: AtomicU64,
    failed_execs: AtomicU64,
    total_waits: AtomicU64,
    successful_waits: AtomicU64,
    failed_waits: AtomicU64,
    zombies_created: AtomicU64,
    zombies_reaped: AtomicU64,
    orphans_adopted: AtomicU64,
    cow_pages_shared: AtomicU64,
    cow_pages_copied: AtomicU64,
    fatal_terminations: AtomicU64,
}

/// Point-in-time copy of [`LifecycleStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub total_forks: u64,
    pub successful_forks: u64,
    pub failed_forks: u64,
    pub total_execs: u64,
    pub successful_execs: u64,
    pub failed_execs: u64,
    pub total_waits: u64,
    pub successful_waits: u64,
    pub failed_waits: u64,
    pub zombies_created: u64,
    pub zombies_reaped: u64,
    pub orphans_adopted: u64,
    pub cow_pages_shared: u64,
    pub cow_pages_copied: u64,
    pub fatal_terminations: u64,
}

#[inline]
fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl LifecycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fork_attempt(&self) {
        bump(&self.total_forks, 1);
    }

    pub(crate) fn fork_result(&self, ok: bool, shared_pages: usize) {
        if ok {
            bump(&self.successful_forks, 1);
            bump(&self.cow_pages_shared, shared_pages as u64);
        } else {
            bump(&self.failed_forks, 1);
        }
    }

    pub(crate) fn exec_attempt(&self) {
        bump(&self.total_execs, 1);
    }

    pub(crate) fn exec_result(&self, ok: bool) {
        bump(if ok { &self.successful_execs } else { &self.failed_execs }, 1);
    }

    pub(crate) fn wait_attempt(&self) {
        bump(&self.total_waits, 1);
    }

    pub(crate) fn wait_result(&self, ok: bool) {
        bump(if ok { &self.successful_waits } else { &self.failed_waits }, 1);
    }

    pub(crate) fn zombie_created(&self) {
        bump(&self.zombies_created, 1);
    }

    pub(crate) fn zombie_reaped(&self) {
        bump(&self.zombies_reaped, 1);
    }

    pub(crate) fn orphans_adopted(&self, n: usize) {
        bump(&self.orphans_adopted, n as u64);
    }

    pub(crate) fn cow_copied(&self, n: usize) {
        bump(&self.cow_pages_copied, n as u64);
    }

    pub(crate) fn fatal_termination(&self) {
        bump(&self.fatal_terminations, 1);
    }

    /// Reads every counter
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        LifecycleSnapshot {
            total_forks: get(&self.total_forks),
            successful_forks: get(&self.successful_forks),
            failed_forks: get(&self.failed_forks),
            total_execs: get(&self.total_execs),
            successful_execs: get(&self.successful_execs),
            failed_execs: get(&self.failed_execs),
            total_waits: get(&self.total_waits),
            successful_waits: get(&self.successful_waits),
            failed_waits: get(&self.failed_waits),
            zombies_created: get(&self.zombies_created),
            zombies_reaped: get(&self.zombies_reaped),
            orphans_adopted: get(&self.orphans_adopted),
            cow_pages_shared: get(&self.cow_pages_shared),
            cow_pages_copied: get(&self.cow_pages_copied),
            fatal_terminations: get(&self.fatal_terminations),
        }
    }

    /// Zeroes every counter
    pub fn reset(&self) {
        for counter in [
            &self.total_forks,
            &self.successful_forks,
            &self.failed_forks,
            &self.total_execs,
            &self.successful_execs,
            &self.failed_execs,
            &self.total_waits,
            &self.successful_waits,
            &self.failed_waits,
            &self.zombies_created,
            &self.zombies_reaped,
            &self.orphans_adopted,
            &self.cow_pages_shared,
            &self.cow_pages_copied,
            &self.fatal_terminations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let stats = LifecycleStats::new();
        stats.fork_attempt();
        stats.fork_result(true, 3);
        stats.fork_attempt();
        stats.fork_result(false, 0);
        let snap = stats.snapshot();
        assert_eq!(snap.total_forks, 2);
        assert_eq!(snap.successful_forks, 1);
        assert_eq!(snap.failed_forks, 1);
        assert_eq!(snap.cow_pages_shared, 3);

        stats.reset();
        assert_eq!(stats.snapshot(), LifecycleSnapshot::default());
    }
}
