//! Process subsystem configuration

use nos_api::error::invalid_argument;
use nos_api::{Pid, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of processes
pub const NPROC: usize = 64;

/// Maximum number of file descriptors per process
pub const NOFILE: usize = 16;

/// First pid handed out
pub const FIRST_PID: Pid = 1;

/// Pids are allocated below this bound and then wrap
pub const MAX_PID: Pid = 32768;

/// Exec path ceiling; a path this long or longer is rejected
pub const MAX_PATH: usize = 256;

/// Maximum length of a single argument string
pub const MAX_ARG_STRLEN: usize = 4096;

/// Maximum length of a single environment string
pub const MAX_ENV_STRLEN: usize = 4096;

/// Maximum total size of the argument strings (each counted with its NUL)
pub const MAX_ARGS_SIZE: usize = 64 * 1024;

/// Maximum total size of the environment strings
pub const MAX_ENV_SIZE: usize = 64 * 1024;

/// Process name buffer size (names keep one byte less)
pub const MAX_PROCESS_NAME: usize = 32;

/// Command line buffer size
pub const MAX_COMMAND_LINE: usize = 256;

/// Default scheduling priority
pub const DEFAULT_PRIORITY: u8 = 20;

/// Who adopts the live children of an exiting process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReparentPolicy {
    /// The exiting process's own parent (the nearest living ancestor)
    #[default]
    NearestAncestor,
    /// Always the root process
    Init,
}

/// Process subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// PCB table ceiling
    pub max_processes: usize,
    /// Descriptor table size per process
    pub max_fds: usize,
    /// Lowest pid allocated
    pub first_pid: Pid,
    /// Pid allocation wraps at this bound
    pub max_pid: Pid,
    /// Exec path ceiling
    pub max_path_len: usize,
    /// Per-argument ceiling
    pub max_arg_strlen: usize,
    /// Per-environment-string ceiling
    pub max_env_strlen: usize,
    /// Aggregate argument ceiling
    pub max_args_size: usize,
    /// Aggregate environment ceiling
    pub max_env_size: usize,
    /// Name buffer size
    pub max_name_len: usize,
    /// Command line buffer size
    pub max_cmdline_len: usize,
    /// Orphan adoption policy
    pub reparent: ReparentPolicy,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            max_processes: NPROC,
            max_fds: NOFILE,
            first_pid: FIRST_PID,
            max_pid: MAX_PID,
            max_path_len: MAX_PATH,
            max_arg_strlen: MAX_ARG_STRLEN,
            max_env_strlen: MAX_ENV_STRLEN,
            max_args_size: MAX_ARGS_SIZE,
            max_env_size: MAX_ENV_SIZE,
            max_name_len: MAX_PROCESS_NAME,
            max_cmdline_len: MAX_COMMAND_LINE,
            reparent: ReparentPolicy::NearestAncestor,
        }
    }
}

impl ProcessConfig {
    /// Sets the process ceiling
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    /// Sets the descriptor table size
    pub fn with_max_fds(mut self, max: usize) -> Self {
        self.max_fds = max;
        self
    }

    /// Sets the pid allocation window
    pub fn with_pid_range(mut self, first: Pid, max: Pid) -> Self {
        self.first_pid = first;
        self.max_pid = max;
        self
    }

    /// Sets the per-argument ceiling
    pub fn with_max_arg_strlen(mut self, max: usize) -> Self {
        self.max_arg_strlen = max;
        self
    }

    /// Sets the aggregate argument ceiling
    pub fn with_max_args_size(mut self, max: usize) -> Self {
        self.max_args_size = max;
        self
    }

    /// Sets the orphan adoption policy
    pub fn with_reparent(mut self, policy: ReparentPolicy) -> Self {
        self.reparent = policy;
        self
    }

    /// Rejects configurations the registry cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_processes == 0 {
            return Err(invalid_argument("max_processes must be non-zero"));
        }
        if self.first_pid == 0 || self.first_pid >= self.max_pid {
            return Err(invalid_argument("invalid pid range"));
        }
        if ((self.max_pid - self.first_pid) as usize) < self.max_processes {
            return Err(invalid_argument("pid range smaller than the process table"));
        }
        if self.max_name_len == 0 || self.max_cmdline_len == 0 || self.max_path_len == 0 {
            return Err(invalid_argument("string ceilings must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ProcessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_processes, 64);
        assert_eq!(config.reparent, ReparentPolicy::NearestAncestor);
    }

    #[test]
    fn test_pid_range_must_cover_table() {
        let config = ProcessConfig::default().with_max_processes(8).with_pid_range(100, 104);
        assert!(config.validate().is_err());
        assert!(ProcessConfig::default().with_pid_range(0, 10).validate().is_err());
    }
}
