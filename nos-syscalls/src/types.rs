//! System call type definitions
//!
//! This module contains system call numbers and type definitions.

/// System call numbers
pub const SYS_FORK: u32 = 2;
pub const SYS_EXECVE: u32 = 3;
pub const SYS_WAIT: u32 = 4;
pub const SYS_WAITPID: u32 = 5;
pub const SYS_GETPID: u32 = 39;
pub const SYS_EXIT: u32 = 60;
pub const SYS_GETPPID: u32 = 110;

/// Size of the status word written by wait/waitpid
pub const STATUS_SIZE: usize = size_of::<i32>();

/// Name of a system call number, for tracing
pub fn syscall_name(id: u32) -> &'static str {
    match id {
        SYS_FORK => "fork",
        SYS_EXECVE => "execve",
        SYS_WAIT => "wait",
        SYS_WAITPID => "waitpid",
        SYS_GETPID => "getpid",
        SYS_EXIT => "exit",
        SYS_GETPPID => "getppid",
        _ => "unknown",
    }
}
