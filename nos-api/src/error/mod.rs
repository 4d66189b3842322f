//! Error handling module for NOS operating system

use core::fmt;
use alloc::string::{String, ToString};
use alloc::format;

use crate::core::types::KernelError;

/// Common error type used throughout NOS operating system
///
/// Every error carries a [`KernelError`] kind, which is what crosses the
/// system call boundary. The message is for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bare kernel error
    Kernel(KernelError),
    /// Kernel error with a message describing where it happened
    Context(KernelError, String),
}

impl Error {
    /// Returns the error kind.
    pub fn kind(&self) -> KernelError {
        match self {
            Error::Kernel(kind) => *kind,
            Error::Context(kind, _) => *kind,
        }
    }

    /// Returns the positive errno value for this error.
    pub fn errno(&self) -> i32 {
        self.kind().errno()
    }

    /// Returns the negative result code reported to user space.
    pub fn to_isize(&self) -> isize {
        -(self.errno() as isize)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Kernel(err) => write!(f, "Kernel error: {}", err),
            Error::Context(err, msg) => write!(f, "{}: {}", msg, err),
        }
    }
}

impl From<KernelError> for Error {
    fn from(err: KernelError) -> Self {
        Error::Kernel(err)
    }
}

impl PartialEq<KernelError> for Error {
    fn eq(&self, other: &KernelError) -> bool {
        self.kind() == *other
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Adds context to the error
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(Error::Kernel(kind)) => Err(Error::Context(kind, context.to_string())),
            Err(Error::Context(kind, msg)) => Err(Error::Context(kind, format!("{}: {}", context, msg))),
        }
    }
}

/// Creates a new kernel error
pub fn kernel_error(err: KernelError) -> Error {
    Error::Kernel(err)
}

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &str) -> Error {
    Error::Context(KernelError::InvalidArgument, msg.to_string())
}

/// Creates a new not found error
pub fn not_found(msg: &str) -> Error {
    Error::Context(KernelError::NotFound, msg.to_string())
}

/// Creates a new permission denied error
pub fn permission_denied(msg: &str) -> Error {
    Error::Context(KernelError::PermissionDenied, msg.to_string())
}

/// Creates a new out of memory error
pub fn out_of_memory() -> Error {
    Error::Kernel(KernelError::OutOfMemory)
}

/// Creates a new bad address error
pub fn bad_address(addr: usize) -> Error {
    Error::Context(KernelError::BadAddress, format!("bad user address {:#x}", addr))
}

/// Creates a new no such process error
pub fn no_process(pid: crate::core::types::Pid) -> Error {
    Error::Context(KernelError::NoProcess, format!("pid {}", pid))
}

/// Creates a new "no child processes" error
pub fn no_child() -> Error {
    Error::Kernel(KernelError::NoChild)
}

/// Creates a new "process table full" error
pub fn try_again(msg: &str) -> Error {
    Error::Context(KernelError::TryAgain, msg.to_string())
}

/// Creates a new "argument list too long" error
pub fn too_big(msg: &str) -> Error {
    Error::Context(KernelError::ArgumentListTooLong, msg.to_string())
}

/// Creates a new exec format error
pub fn exec_format(msg: &str) -> Error {
    Error::Context(KernelError::ExecFormat, msg.to_string())
}

/// Creates a new invalid state error
pub fn invalid_state(msg: &str) -> Error {
    Error::Context(KernelError::InvalidArgument, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let result: Result<()> = Err(no_child());
        let err = result.context("waitpid").unwrap_err();
        assert_eq!(err.kind(), KernelError::NoChild);
        assert_eq!(err.errno(), 10);
        assert_eq!(err.to_isize(), -10);
    }

    #[test]
    fn test_nested_context() {
        let result: Result<()> = Err(too_big("argv[3]"));
        let err = result.context("execve").unwrap_err();
        assert_eq!(err, KernelError::ArgumentListTooLong);
        assert_eq!(
            err,
            Error::Context(KernelError::ArgumentListTooLong, "execve: argv[3]".into())
        );
    }
}
