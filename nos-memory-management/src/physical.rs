//! Physical memory management module
//!
//! Physical memory is a fixed pool of page frames. Each frame carries a
//! reference count (number of page-table entries mapping it) and its own
//! lock, so copy-on-write resolution on one frame never contends with
//! lifecycle operations or with faults on other frames.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use nos_api::error::{invalid_argument, out_of_memory};
use spin::{Mutex, MutexGuard};
use nos_api::Result;
use static_assertions::const_assert_eq;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

const_assert_eq!(PAGE_SIZE, 1 << PAGE_SHIFT);

/// Physical address of the first managed frame
pub const FRAME_BASE: usize = 0x10_0000;

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Physical address to page number
#[inline]
pub const fn addr_to_pfn(addr: usize) -> usize {
    addr >> PAGE_SHIFT
}

/// Page number to physical address
#[inline]
pub const fn pfn_to_addr(pfn: usize) -> usize {
    pfn << PAGE_SHIFT
}

/// A physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
    /// Creates a new physical address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the physical address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current page.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number for this physical address.
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Checks if the physical address is page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

impl From<usize> for PhysAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<PhysAddr> for usize {
    fn from(addr: PhysAddr) -> Self {
        addr.0
    }
}

/// One physical page frame
#[derive(Debug)]
pub struct Frame {
    refcount: u32,
    data: Vec<u8>,
}

impl Frame {
    const fn unused() -> Self {
        Self {
            refcount: 0,
            data: Vec::new(),
        }
    }

    /// Number of mappings referring to this frame
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Frame contents (empty while the frame is free)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable frame contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Drops one reference; returns true when the frame became free.
    pub(crate) fn put(&mut self) -> bool {
        self.refcount = self.refcount.saturating_sub(1);
        if self.refcount == 0 {
            self.data = Vec::new();
            true
        } else {
            false
        }
    }
}

/// Frame allocation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames in the pool
    pub total: usize,
    /// Frames currently free
    pub free: usize,
    /// Successful allocations since creation
    pub allocations: u64,
    /// Allocations refused because the pool was empty
    pub failed_allocations: u64,
}

/// Pool of physical frames with per-frame reference counts
pub struct FrameTable {
    frames: Vec<Mutex<Frame>>,
    free: Mutex<Vec<usize>>,
    allocations: AtomicU64,
    failed_allocations: AtomicU64,
}

impl FrameTable {
    /// Creates a pool of `count` frames, all free.
    pub fn new(count: usize) -> Self {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            frames.push(Mutex::new(Frame::unused()));
        }
        // Lowest frame is handed out first.
        let free = (0..count).rev().collect();
        Self {
            frames,
            free: Mutex::new(free),
            allocations: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
        }
    }

    fn index_of(&self, addr: PhysAddr) -> Result<usize> {
        if !addr.is_page_aligned() || addr.0 < FRAME_BASE {
            return Err(invalid_argument("physical address outside frame pool"));
        }
        let index = addr_to_pfn(addr.0 - FRAME_BASE);
        if index >= self.frames.len() {
            return Err(invalid_argument("physical address outside frame pool"));
        }
        Ok(index)
    }

    fn addr_of(index: usize) -> PhysAddr {
        PhysAddr(FRAME_BASE + pfn_to_addr(index))
    }

    /// Allocates a zeroed frame with a reference count of one.
    pub fn alloc(&self) -> Result<PhysAddr> {
        let index = match self.free.lock().pop() {
            Some(index) => index,
            None => {
                self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                return Err(out_of_memory());
            }
        };
        let mut frame = self.frames[index].lock();
        frame.refcount = 1;
        frame.data = vec![0u8; PAGE_SIZE];
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(Self::addr_of(index))
    }

    /// Adds a reference to an allocated frame.
    pub fn share(&self, addr: PhysAddr) -> Result<u32> {
        let mut frame = self.lock(addr)?;
        if frame.refcount == 0 {
            return Err(invalid_argument("sharing a free frame"));
        }
        frame.refcount += 1;
        Ok(frame.refcount)
    }

    /// Drops a reference; returns true if the frame went back to the pool.
    pub fn release(&self, addr: PhysAddr) -> Result<bool> {
        let index = self.index_of(addr)?;
        let freed = {
            let mut frame = self.frames[index].lock();
            if frame.refcount == 0 {
                return Err(invalid_argument("releasing a free frame"));
            }
            frame.put()
        };
        if freed {
            self.free.lock().push(index);
        }
        Ok(freed)
    }

    /// Returns a frame to the pool after its last reference was dropped
    /// through [`Frame::put`] under the frame lock.
    pub(crate) fn recycle(&self, addr: PhysAddr) -> Result<()> {
        let index = self.index_of(addr)?;
        self.free.lock().push(index);
        Ok(())
    }

    /// Locks a frame. This is the per-page critical section for COW.
    pub fn lock(&self, addr: PhysAddr) -> Result<MutexGuard<'_, Frame>> {
        let index = self.index_of(addr)?;
        Ok(self.frames[index].lock())
    }

    /// Current reference count of a frame (0 if free).
    pub fn refcount(&self, addr: PhysAddr) -> Result<u32> {
        Ok(self.lock(addr)?.refcount)
    }

    /// Number of free frames
    pub fn free_frames(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of frames in the pool
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Allocation statistics snapshot
    pub fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.total_frames(),
            free: self.free_frames(),
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }
}

impl core::fmt::Debug for FrameTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameTable")
            .field("total", &self.total_frames())
            .field("free", &self.free_frames())
            .finish()
    }
}
