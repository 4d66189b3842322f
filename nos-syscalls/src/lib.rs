//! NOS System Calls
//!
//! This crate provides the system call boundary of the process lifecycle
//! core: syscall numbers, a dispatcher keyed by number, and handlers that
//! decode raw register arguments against the caller's address space.
//!
//! # Architecture
//!
//! - **Core**: The dispatcher and the handler trait
//! - **Process**: fork, execve, wait, waitpid, exit, getpid and getppid
//!
//! # Usage
//!
//! ```rust,ignore
//! use nos_syscalls::{init_dispatcher, SYS_GETPID};
//! use nos_api::SyscallArgs;
//!
//! let dispatcher = init_dispatcher()?;
//! let result = dispatcher.dispatch(&manager, caller, SYS_GETPID, &SyscallArgs::empty());
//! let raw = result.to_isize();
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

#[macro_use]
pub mod logging;

// Core modules
pub mod core;
pub mod process;
pub mod types;

// Re-export commonly used items
pub use crate::core::{init_dispatcher, SyscallContext, SyscallDispatcher, SyscallHandler, SyscallStats};
pub use types::*;
