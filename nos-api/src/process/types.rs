//! Process management types
//!
//! Wait status layout (bit-exact with the classic Unix encoding):
//! normal exit keeps the exit code in bits 8..15 with the low 7 bits clear,
//! a signal death keeps the signal number in the low 7 bits.

use bitflags::bitflags;

use crate::core::types::{Pid, Signal};
use crate::error::{invalid_argument, Result};

/// Signal numbers the lifecycle core refers to
pub mod signal {
    use crate::core::types::Signal;

    pub const SIGHUP: Signal = 1;
    pub const SIGINT: Signal = 2;
    pub const SIGQUIT: Signal = 3;
    pub const SIGILL: Signal = 4;
    pub const SIGABRT: Signal = 6;
    pub const SIGBUS: Signal = 7;
    pub const SIGFPE: Signal = 8;
    pub const SIGKILL: Signal = 9;
    pub const SIGUSR1: Signal = 10;
    pub const SIGSEGV: Signal = 11;
    pub const SIGUSR2: Signal = 12;
    pub const SIGPIPE: Signal = 13;
    pub const SIGALRM: Signal = 14;
    pub const SIGTERM: Signal = 15;
    pub const SIGCHLD: Signal = 17;
    pub const SIGCONT: Signal = 18;
    pub const SIGSTOP: Signal = 19;

    /// Number of signal dispositions tracked per process
    pub const NSIG: usize = 32;
}

bitflags! {
    /// Options accepted by `waitpid`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WaitOptions: u32 {
        /// Return immediately if no child has exited
        const WNOHANG = 0x1;
        /// Also report stopped children
        const WUNTRACED = 0x2;
        /// Also report continued children
        const WCONTINUED = 0x8;
    }
}

impl WaitOptions {
    /// Parses a raw options word, rejecting unknown bits.
    pub fn from_raw(raw: u32) -> Result<Self> {
        WaitOptions::from_bits(raw).ok_or_else(|| invalid_argument("unknown wait option bits"))
    }
}

/// Which children a wait call is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTarget {
    /// Any child (`pid == -1`)
    Any,
    /// One specific child
    Pid(Pid),
}

impl WaitTarget {
    /// Decodes the `pid` argument of `waitpid`.
    ///
    /// Process-group forms (`0` and `< -1`) are rejected.
    pub fn from_raw(pid: i32) -> Result<Self> {
        match pid {
            -1 => Ok(WaitTarget::Any),
            p if p > 0 => Ok(WaitTarget::Pid(p as Pid)),
            _ => Err(invalid_argument("process group wait is not supported")),
        }
    }

    /// Returns true if `pid` satisfies this target.
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Pid(target) => target == pid,
        }
    }
}

/// How a process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Normal exit with an exit code
    Exited(u8),
    /// Killed by a signal
    Signaled(Signal),
}

impl ExitStatus {
    /// Encodes the status word handed to the parent.
    pub const fn encode(self) -> i32 {
        match self {
            ExitStatus::Exited(code) => (code as i32) << 8,
            ExitStatus::Signaled(sig) => (sig & 0x7f) as i32,
        }
    }

    /// Decodes a status word produced by [`ExitStatus::encode`].
    pub const fn decode(status: i32) -> Self {
        if wifexited(status) {
            ExitStatus::Exited(wexitstatus(status) as u8)
        } else {
            ExitStatus::Signaled(wtermsig(status) as Signal)
        }
    }
}

/// `WIFEXITED`
pub const fn wifexited(status: i32) -> bool {
    (status & 0x7f) == 0
}

/// `WEXITSTATUS`
pub const fn wexitstatus(status: i32) -> i32 {
    (status & 0xff00) >> 8
}

/// `WIFSIGNALED`: low 7 bits hold a signal number (neither 0 nor the stop marker)
pub const fn wifsignaled(status: i32) -> bool {
    let low = status & 0x7f;
    low != 0 && low != 0x7f
}

/// `WTERMSIG`
pub const fn wtermsig(status: i32) -> i32 {
    status & 0x7f
}

/// `WIFSTOPPED`
pub const fn wifstopped(status: i32) -> bool {
    (status & 0xff) == 0x7f
}

/// `WSTOPSIG`
pub const fn wstopsig(status: i32) -> i32 {
    wexitstatus(status)
}

/// `WIFCONTINUED`
pub const fn wifcontinued(status: i32) -> bool {
    status == 0xffff
}

/// Result of a wait call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A zombie child was reaped
    Reaped {
        /// Pid of the reaped child
        pid: Pid,
        /// Encoded status word
        status: i32,
    },
    /// `WNOHANG` was given and no child has exited yet
    NotReady,
    /// The caller was blocked; the call must be restarted after wakeup
    Blocked,
}

impl WaitOutcome {
    /// Value returned to user space for the non-blocking outcomes.
    pub fn return_value(&self) -> Option<isize> {
        match self {
            WaitOutcome::Reaped { pid, .. } => Some(*pid as isize),
            WaitOutcome::NotReady => Some(0),
            WaitOutcome::Blocked => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_42() {
        let status = ExitStatus::Exited(42).encode();
        assert_eq!(status, 42 << 8);
        assert!(wifexited(status));
        assert_eq!(wexitstatus(status), 42);
        assert!(!wifsignaled(status));
    }

    #[test]
    fn test_sigkill_status() {
        let status = ExitStatus::Signaled(signal::SIGKILL).encode();
        assert!(wifsignaled(status));
        assert_eq!(wtermsig(status), 9);
        assert!(!wifexited(status));
        assert_eq!(ExitStatus::decode(status), ExitStatus::Signaled(9));
    }

    #[test]
    fn test_stopped_and_continued_markers() {
        let stopped = (signal::SIGSTOP as i32) << 8 | 0x7f;
        assert!(wifstopped(stopped));
        assert!(!wifsignaled(stopped));
        assert_eq!(wstopsig(stopped), 19);
        assert!(wifcontinued(0xffff));
        assert!(!wifcontinued(0));
    }

    #[test]
    fn test_wait_target_decoding() {
        assert_eq!(WaitTarget::from_raw(-1).unwrap(), WaitTarget::Any);
        assert_eq!(WaitTarget::from_raw(7).unwrap(), WaitTarget::Pid(7));
        assert!(WaitTarget::from_raw(0).is_err());
        assert!(WaitTarget::from_raw(-5).is_err());
        assert!(WaitTarget::Any.matches(3));
        assert!(!WaitTarget::Pid(4).matches(3));
    }

    #[test]
    fn test_wait_options_reject_unknown_bits() {
        assert_eq!(WaitOptions::from_raw(0x1).unwrap(), WaitOptions::WNOHANG);
        assert!(WaitOptions::from_raw(0x4).is_err());
    }
}
