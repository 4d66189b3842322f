//! System call types

use crate::core::types::KernelError;
use crate::error::Error;

/// System call number
pub type SyscallNumber = usize;

/// System call arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyscallArgs {
    /// First argument
    pub arg0: usize,
    /// Second argument
    pub arg1: usize,
    /// Third argument
    pub arg2: usize,
    /// Fourth argument
    pub arg3: usize,
    /// Fifth argument
    pub arg4: usize,
    /// Sixth argument
    pub arg5: usize,
}

impl SyscallArgs {
    /// Creates new system call arguments
    pub fn new(
        arg0: usize,
        arg1: usize,
        arg2: usize,
        arg3: usize,
        arg4: usize,
        arg5: usize,
    ) -> Self {
        Self {
            arg0,
            arg1,
            arg2,
            arg3,
            arg4,
            arg5,
        }
    }

    /// Creates empty system call arguments
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates system call arguments with one argument
    pub fn with1(arg0: usize) -> Self {
        Self::new(arg0, 0, 0, 0, 0, 0)
    }

    /// Creates system call arguments with two arguments
    pub fn with2(arg0: usize, arg1: usize) -> Self {
        Self::new(arg0, arg1, 0, 0, 0, 0)
    }

    /// Creates system call arguments with three arguments
    pub fn with3(arg0: usize, arg1: usize, arg2: usize) -> Self {
        Self::new(arg0, arg1, arg2, 0, 0, 0)
    }
}

/// System call result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    /// Success with return value
    Success(isize),
    /// Error with error code
    Error(KernelError),
    /// The caller blocked; re-issue the call once it is woken
    Restart,
}

impl SyscallResult {
    /// Returns true if result is success
    pub fn is_success(&self) -> bool {
        matches!(self, SyscallResult::Success(_))
    }

    /// Returns true if result is error
    pub fn is_error(&self) -> bool {
        matches!(self, SyscallResult::Error(_))
    }

    /// Returns error if failed
    pub fn error_value(&self) -> Option<KernelError> {
        match self {
            SyscallResult::Error(error) => Some(*error),
            _ => None,
        }
    }

    /// Converts to the raw register value (`-errno` on failure).
    ///
    /// `Restart` never reaches user space; it is reported as `-EINTR` if a
    /// caller insists on a raw value.
    pub fn to_isize(&self) -> isize {
        match self {
            SyscallResult::Success(value) => *value,
            SyscallResult::Error(err) => -(err.errno() as isize),
            SyscallResult::Restart => -(KernelError::Interrupted.errno() as isize),
        }
    }

    /// Converts a raw register value back into a result.
    pub fn from_isize(value: isize) -> Self {
        if value < 0 {
            SyscallResult::Error(KernelError::from_errno((-value) as i32))
        } else {
            SyscallResult::Success(value)
        }
    }
}

impl From<crate::error::Result<isize>> for SyscallResult {
    fn from(result: crate::error::Result<isize>) -> Self {
        match result {
            Ok(value) => SyscallResult::Success(value),
            Err(err) => SyscallResult::from(err),
        }
    }
}

impl From<Error> for SyscallResult {
    fn from(err: Error) -> Self {
        SyscallResult::Error(err.kind())
    }
}
