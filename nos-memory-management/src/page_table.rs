//! Page table management module
//!
//! A page table maps virtual page numbers to frames. The hardware format is
//! left to the platform layer; only the bits the lifecycle core reads and
//! writes are modelled, including a software COW bit.

extern crate alloc;

use alloc::collections::BTreeMap;
use bitflags::bitflags;

use crate::physical::{PhysAddr, PAGE_SHIFT};

bitflags! {
    /// Page table entry flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PteFlags: u64 {
        /// Mapping is valid
        const PRESENT = 1 << 0;
        /// Writes are allowed
        const WRITABLE = 1 << 1;
        /// Accessible from user mode
        const USER = 1 << 2;
        /// Instruction fetch allowed
        const EXECUTABLE = 1 << 3;
        /// Shared copy-on-write; write access withheld until the fault is resolved
        const COW = 1 << 9;
    }
}

impl PteFlags {
    /// Flags for user code pages
    pub const USER_CODE: Self = Self::PRESENT.union(Self::USER).union(Self::EXECUTABLE);
    /// Flags for user data, heap and stack pages
    pub const USER_DATA: Self = Self::PRESENT.union(Self::USER).union(Self::WRITABLE);

    /// True if the page is private-writable or would be after COW resolution.
    pub const fn is_logically_writable(self) -> bool {
        self.contains(Self::WRITABLE) || self.contains(Self::COW)
    }
}

/// One page table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    /// Backing frame
    pub frame: PhysAddr,
    /// Permission and state bits
    pub flags: PteFlags,
}

impl PageTableEntry {
    /// Creates an entry
    pub const fn new(frame: PhysAddr, flags: PteFlags) -> Self {
        Self { frame, flags }
    }

    /// True if this entry is shared copy-on-write
    pub const fn is_cow(&self) -> bool {
        self.flags.contains(PteFlags::COW)
    }
}

/// Virtual page number to entry map
#[derive(Debug, Default, Clone)]
pub struct PageTable {
    entries: BTreeMap<usize, PageTableEntry>,
}

impl PageTable {
    /// Creates an empty page table
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Looks up the entry covering `va`
    pub fn lookup(&self, va: usize) -> Option<PageTableEntry> {
        self.entries.get(&(va >> PAGE_SHIFT)).copied()
    }

    /// Mutable entry covering `va`
    pub fn lookup_mut(&mut self, va: usize) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&(va >> PAGE_SHIFT))
    }

    /// Installs an entry, returning the one it replaced
    pub fn map(&mut self, va: usize, entry: PageTableEntry) -> Option<PageTableEntry> {
        self.entries.insert(va >> PAGE_SHIFT, entry)
    }

    /// Removes the entry covering `va`
    pub fn unmap(&mut self, va: usize) -> Option<PageTableEntry> {
        self.entries.remove(&(va >> PAGE_SHIFT))
    }

    /// Iterates `(page base address, entry)` in address order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PageTableEntry)> {
        self.entries.iter().map(|(vpn, pte)| (vpn << PAGE_SHIFT, pte))
    }

    /// Mutable iteration in address order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut PageTableEntry)> {
        self.entries.iter_mut().map(|(vpn, pte)| (vpn << PAGE_SHIFT, pte))
    }

    /// Removes every entry, yielding them
    pub fn drain(&mut self) -> impl Iterator<Item = PageTableEntry> {
        core::mem::take(&mut self.entries).into_values()
    }

    /// Number of mapped pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
