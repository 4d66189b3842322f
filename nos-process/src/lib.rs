//! NOS Process
//!
//! The process lifecycle core: a generation-checked process registry with
//! parent/child links, atomic copy-on-write fork, staged exec, exit with
//! zombie and orphan handling, and wait/waitpid.
//!
//! # Architecture
//!
//! - **Table**: slot arena, pid allocation and the process tree
//! - **Manager**: owns the table and the collaborators (frames, loader,
//!   scheduler); lifecycle operations are split across `fork`, `exec`,
//!   `exit`, `wait` and `fault`
//! - **Per-process state**: descriptors, signal dispositions and the saved
//!   user context
//!
//! # Usage
//!
//! ```rust
//! extern crate alloc;
//! use alloc::sync::Arc;
//! use nos_memory_management::FrameTable;
//! use nos_process::{FifoScheduler, FlatImageLoader, ProcessConfig, ProcessManager};
//!
//! let manager = ProcessManager::new(
//!     ProcessConfig::default().with_pid_range(100, 32768),
//!     Arc::new(FrameTable::new(64)),
//!     Arc::new(FlatImageLoader::new()),
//!     Arc::new(FifoScheduler::new()),
//! )
//! .unwrap();
//! let root = manager.bootstrap_root("init").unwrap();
//! let child = manager.fork(root).unwrap().child_pid;
//! assert_eq!(manager.getppid(child).unwrap(), root);
//! ```

#![no_std]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod config;
pub mod context;
pub mod fd;
pub mod signal;
pub mod pcb;
pub mod table;
pub mod loader;
pub mod sched;
pub mod stats;
pub mod manager;
pub mod fork;
pub mod exec;
pub mod exit;
pub mod wait;
pub mod fault;

pub use config::{ProcessConfig, ReparentPolicy};
pub use context::CpuContext;
pub use exec::{build_user_stack, ExecContext, ExecSnapshot, StackLayout};
pub use fault::FaultOutcome;
pub use fd::{FdFlags, FdTable, FileDescriptor};
pub use fork::ForkContext;
pub use loader::{FlatImage, FlatImageLoader, ImageLoader, LoadedImage};
pub use manager::ProcessManager;
pub use pcb::{ProcessInfo, SpaceRef};
pub use sched::FifoScheduler;
pub use signal::{SigAction, SignalState};
pub use stats::LifecycleSnapshot;
pub use table::{ProcHandle, ProcTable};
pub use wait::WaitContext;
