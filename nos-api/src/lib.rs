//! NOS API - Core interfaces and types for the NOS operating system
//!
//! This crate provides the types and collaborator interfaces shared by the
//! process lifecycle crates. It has no behaviour of its own.
//!
//! # Architecture
//!
//! - **Core**: Identifiers, the errno taxonomy and process states
//! - **Error**: The common `Error`/`Result` pair
//! - **Syscall**: Raw argument and result types for the syscall boundary
//! - **Process**: Wait-status encoding, wait options and the scheduler /
//!   open-file interfaces the core consumes
//!
//! # Usage
//!
//! ```rust
//! use nos_api::process::{ExitStatus, wexitstatus, wifexited};
//!
//! let status = ExitStatus::Exited(3).encode();
//! assert!(wifexited(status));
//! assert_eq!(wexitstatus(status), 3);
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod syscall;
pub mod process;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, ErrorContext, Result};
pub use crate::process::interface::{OpenFile, Scheduler};
pub use crate::syscall::types::{SyscallArgs, SyscallResult};
