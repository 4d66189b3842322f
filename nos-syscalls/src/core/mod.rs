//! Core system call functionality
//!
//! This module provides the core system call dispatch mechanism:
//! the dispatcher and the handler trait.

pub mod dispatcher;
pub mod traits;

// Re-export commonly used items
pub use dispatcher::{init_dispatcher, SyscallDispatcher, SyscallStats};
pub use traits::{SyscallContext, SyscallHandler};
