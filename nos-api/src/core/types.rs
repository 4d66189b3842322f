//! Core types used throughout NOS operating system

use core::fmt;

/// Process identifier type
pub type Pid = u32;

/// File descriptor type
pub type Fd = i32;

/// Signal number type
pub type Signal = u32;

/// Represents a kernel error code
///
/// Every variant corresponds to exactly one errno value returned (negated)
/// across the system call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelError {
    /// Operation not permitted
    PermissionDenied,
    /// No such file or directory
    NotFound,
    /// No such process
    NoProcess,
    /// Interrupted system call
    Interrupted,
    /// Argument list too long
    ArgumentListTooLong,
    /// Exec format error
    ExecFormat,
    /// No child processes
    NoChild,
    /// Resource temporarily unavailable (process table full)
    TryAgain,
    /// Not enough memory
    OutOfMemory,
    /// Bad address
    BadAddress,
    /// Resource busy
    Busy,
    /// Invalid argument
    InvalidArgument,
    /// Too many open files
    TooManyFiles,
    /// Invalid file descriptor
    BadFileDescriptor,
    /// File name too long
    NameTooLong,
    /// Function not implemented
    NotImplemented,
    /// Unknown error
    Unknown(i32),
}

impl KernelError {
    /// Returns the positive errno value for this error.
    pub const fn errno(self) -> i32 {
        match self {
            KernelError::PermissionDenied => errno::EPERM,
            KernelError::NotFound => errno::ENOENT,
            KernelError::NoProcess => errno::ESRCH,
            KernelError::Interrupted => errno::EINTR,
            KernelError::ArgumentListTooLong => errno::E2BIG,
            KernelError::ExecFormat => errno::ENOEXEC,
            KernelError::NoChild => errno::ECHILD,
            KernelError::TryAgain => errno::EAGAIN,
            KernelError::OutOfMemory => errno::ENOMEM,
            KernelError::BadAddress => errno::EFAULT,
            KernelError::Busy => errno::EBUSY,
            KernelError::InvalidArgument => errno::EINVAL,
            KernelError::TooManyFiles => errno::EMFILE,
            KernelError::BadFileDescriptor => errno::EBADF,
            KernelError::NameTooLong => errno::ENAMETOOLONG,
            KernelError::NotImplemented => errno::ENOSYS,
            KernelError::Unknown(code) => code,
        }
    }

    /// Maps a positive errno value back to a kernel error.
    pub const fn from_errno(code: i32) -> Self {
        match code {
            errno::EPERM => KernelError::PermissionDenied,
            errno::ENOENT => KernelError::NotFound,
            errno::ESRCH => KernelError::NoProcess,
            errno::EINTR => KernelError::Interrupted,
            errno::E2BIG => KernelError::ArgumentListTooLong,
            errno::ENOEXEC => KernelError::ExecFormat,
            errno::ECHILD => KernelError::NoChild,
            errno::EAGAIN => KernelError::TryAgain,
            errno::ENOMEM => KernelError::OutOfMemory,
            errno::EFAULT => KernelError::BadAddress,
            errno::EBUSY => KernelError::Busy,
            errno::EINVAL => KernelError::InvalidArgument,
            errno::EMFILE => KernelError::TooManyFiles,
            errno::EBADF => KernelError::BadFileDescriptor,
            errno::ENAMETOOLONG => KernelError::NameTooLong,
            errno::ENOSYS => KernelError::NotImplemented,
            other => KernelError::Unknown(other),
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::PermissionDenied => write!(f, "Operation not permitted"),
            KernelError::NotFound => write!(f, "No such file or directory"),
            KernelError::NoProcess => write!(f, "No such process"),
            KernelError::Interrupted => write!(f, "Interrupted system call"),
            KernelError::ArgumentListTooLong => write!(f, "Argument list too long"),
            KernelError::ExecFormat => write!(f, "Exec format error"),
            KernelError::NoChild => write!(f, "No child processes"),
            KernelError::TryAgain => write!(f, "Resource temporarily unavailable"),
            KernelError::OutOfMemory => write!(f, "Not enough memory"),
            KernelError::BadAddress => write!(f, "Bad address"),
            KernelError::Busy => write!(f, "Resource busy"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::TooManyFiles => write!(f, "Too many open files"),
            KernelError::BadFileDescriptor => write!(f, "Invalid file descriptor"),
            KernelError::NameTooLong => write!(f, "File name too long"),
            KernelError::NotImplemented => write!(f, "Function not implemented"),
            KernelError::Unknown(code) => write!(f, "Unknown error: {}", code),
        }
    }
}

/// Errno values used at the system call boundary
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const E2BIG: i32 = 7;
    pub const ENOEXEC: i32 = 8;
    pub const EBADF: i32 = 9;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const ENAMETOOLONG: i32 = 36;
    pub const ENOSYS: i32 = 38;
}

/// Represents a process state
///
/// `Terminated` marks a freed PCB slot; a process only gets there by being
/// reaped while `Zombie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Process is ready to run
    Ready,
    /// Process is running
    Running,
    /// Process is blocked
    Blocked,
    /// Process has exited and awaits reaping
    Zombie,
    /// Process slot has been reaped
    Terminated,
}

impl ProcessState {
    /// Returns true if the process has not exited yet.
    pub const fn is_alive(self) -> bool {
        matches!(self, ProcessState::Ready | ProcessState::Running | ProcessState::Blocked)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Blocked => "BLOCKED",
            ProcessState::Zombie => "ZOMBIE",
            ProcessState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
