//! NOS Memory Management
//!
//! This crate provides the memory services the process lifecycle core
//! consumes: a physical frame pool with per-frame reference counts,
//! per-process address spaces, copy-on-write duplication and fault
//! resolution, and checked access to user memory.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

// Memory management modules
pub mod physical;
pub mod virtual_mem;
pub mod page_table;
pub mod layout;
pub mod vm;
pub mod cow;
pub mod uaccess;

// Re-export commonly used types and functions
pub use physical::{FrameStats, FrameTable, PhysAddr, PAGE_SIZE, PAGE_SHIFT, page_round_up, page_round_down, addr_to_pfn, pfn_to_addr};
pub use virtual_mem::is_user_range;
pub use page_table::{PageTable, PageTableEntry, PteFlags};
pub use layout::{MemoryRegions, USER_CODE_BASE, USER_HEAP_BASE, USER_STACK_SIZE, USER_STACK_TOP};
pub use vm::{Access, AddressSpace, CowShare};
pub use cow::{handle_cow_fault, CowResolution};
pub use uaccess::{copy_from_user, copy_to_user, read_user_cstr, read_user_ptr_array};
