//! Per-process address spaces
//!
//! An `AddressSpace` owns a page table and the region bounds of one process.
//! Frames are shared between spaces by reference count; the space only
//! holds references, the [`FrameTable`] owns the memory.

use nos_api::error::{bad_address, invalid_argument};
use nos_api::Result;

use crate::cow;
use crate::layout::MemoryRegions;
use crate::page_table::{PageTable, PageTableEntry, PteFlags};
use crate::physical::{page_round_down, page_round_up, FrameTable, PhysAddr, PAGE_SIZE};

/// Who is accessing memory through [`AddressSpace::write_bytes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A user-mode store: the page must be (logically) writable
    User,
    /// The kernel populating an image: write permission is not checked
    Kernel,
}

/// Page accounting for one copy-on-write duplication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CowShare {
    /// Writable pages now shared copy-on-write
    pub cow_pages: usize,
    /// Read-only pages shared as-is
    pub readonly_pages: usize,
}

impl CowShare {
    /// Every page now referenced by both spaces
    pub fn total(&self) -> usize {
        self.cow_pages + self.readonly_pages
    }
}

/// A process address space
#[derive(Debug)]
pub struct AddressSpace {
    root: Option<PhysAddr>,
    table: PageTable,
    regions: MemoryRegions,
}

impl AddressSpace {
    /// Creates an empty space; its root page-table frame comes from `frames`.
    pub fn new(frames: &FrameTable) -> Result<Self> {
        let root = frames.alloc()?;
        Ok(Self {
            root: Some(root),
            table: PageTable::new(),
            regions: MemoryRegions::empty(),
        })
    }

    /// Root page-table frame, `None` once torn down
    pub fn root(&self) -> Option<PhysAddr> {
        self.root
    }

    /// True once [`AddressSpace::teardown`] has run
    pub fn is_torn_down(&self) -> bool {
        self.root.is_none()
    }

    /// Region bounds
    pub fn regions(&self) -> &MemoryRegions {
        &self.regions
    }

    /// Replaces the region bounds
    pub fn set_regions(&mut self, regions: MemoryRegions) {
        self.regions = regions;
    }

    /// Read access to the page table
    pub fn page_table(&self) -> &PageTable {
        &self.table
    }

    pub(crate) fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.table
    }

    /// Entry mapping `va`, if any
    pub fn translate(&self, va: usize) -> Option<PageTableEntry> {
        self.table.lookup(va)
    }

    /// Number of mapped user pages
    pub fn mapped_pages(&self) -> usize {
        self.table.len()
    }

    /// Maps a fresh zeroed frame at the page containing `va`.
    pub fn map_page(&mut self, frames: &FrameTable, va: usize, flags: PteFlags) -> Result<PhysAddr> {
        if self.is_torn_down() {
            return Err(invalid_argument("address space already torn down"));
        }
        let page = page_round_down(va);
        if self.table.lookup(page).is_some() {
            return Err(invalid_argument("page already mapped"));
        }
        let frame = frames.alloc()?;
        self.table.map(page, PageTableEntry::new(frame, flags | PteFlags::PRESENT));
        Ok(frame)
    }

    /// Maps every page overlapping `[start, start + len)`.
    ///
    /// All-or-nothing: on failure the pages mapped by this call are
    /// released again.
    pub fn map_range(&mut self, frames: &FrameTable, start: usize, len: usize, flags: PteFlags) -> Result<usize> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| invalid_argument("range overflows"))?;
        let first = page_round_down(start);
        let last = page_round_up(end);
        let mut mapped = 0;
        let mut page = first;
        while page < last {
            if let Err(err) = self.map_page(frames, page, flags) {
                let mut undo = first;
                for _ in 0..mapped {
                    self.unmap_page(frames, undo)?;
                    undo += PAGE_SIZE;
                }
                return Err(err);
            }
            mapped += 1;
            page += PAGE_SIZE;
        }
        Ok(mapped)
    }

    /// Drops the mapping for the page containing `va`.
    pub fn unmap_page(&mut self, frames: &FrameTable, va: usize) -> Result<()> {
        let pte = self.table.unmap(va).ok_or_else(|| bad_address(va))?;
        frames.release(pte.frame)?;
        Ok(())
    }

    /// Duplicates this space copy-on-write.
    ///
    /// Writable pages lose write access and gain the COW bit in both this
    /// space and the returned one; every shared frame's reference count is
    /// incremented. Nothing in `self` changes unless the duplication
    /// succeeds.
    pub fn fork_cow(&mut self, frames: &FrameTable) -> Result<(AddressSpace, CowShare)> {
        if self.is_torn_down() {
            return Err(invalid_argument("cannot fork a torn-down address space"));
        }
        let mut child = AddressSpace::new(frames)?;
        let mut share = CowShare::default();

        for (va, pte) in self.table.iter() {
            if let Err(err) = frames.share(pte.frame) {
                log::warn!("fork_cow: failed to share frame {:#x}: {}", pte.frame.0, err);
                child.teardown(frames);
                return Err(err);
            }
            let flags = if pte.flags.is_logically_writable() {
                share.cow_pages += 1;
                (pte.flags - PteFlags::WRITABLE) | PteFlags::COW
            } else {
                share.readonly_pages += 1;
                pte.flags
            };
            child.table.map(va, PageTableEntry::new(pte.frame, flags));
        }

        for (_, pte) in self.table.iter_mut() {
            if pte.flags.is_logically_writable() {
                pte.flags = (pte.flags - PteFlags::WRITABLE) | PteFlags::COW;
            }
        }
        child.regions = self.regions.clone();

        log::trace!(
            "fork_cow: {} cow pages, {} read-only pages shared",
            share.cow_pages,
            share.readonly_pages
        );
        Ok((child, share))
    }

    /// Releases every mapping and the root frame. Returns the number of
    /// user pages unmapped. Idempotent.
    pub fn teardown(&mut self, frames: &FrameTable) -> usize {
        let mut released = 0;
        for pte in self.table.drain() {
            if let Err(err) = frames.release(pte.frame) {
                log::warn!("teardown: frame {:#x}: {}", pte.frame.0, err);
            }
            released += 1;
        }
        if let Some(root) = self.root.take() {
            if let Err(err) = frames.release(root) {
                log::warn!("teardown: root frame {:#x}: {}", root.0, err);
            }
        }
        self.regions = MemoryRegions::empty();
        released
    }

    /// Copies bytes out of the space. Every touched page must be a present
    /// user page.
    pub fn read_bytes(&self, frames: &FrameTable, va: usize, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let addr = va.checked_add(done).ok_or_else(|| bad_address(va))?;
            let pte = self.user_pte(addr)?;
            let offset = addr & (PAGE_SIZE - 1);
            let chunk = (PAGE_SIZE - offset).min(buf.len() - done);
            let frame = frames.lock(pte.frame)?;
            buf[done..done + chunk].copy_from_slice(&frame.data()[offset..offset + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Copies bytes into the space, resolving COW pages first.
    ///
    /// Returns the number of pages that had to be copied.
    pub fn write_bytes(&mut self, frames: &FrameTable, va: usize, data: &[u8], access: Access) -> Result<usize> {
        let mut done = 0;
        let mut copied = 0;
        while done < data.len() {
            let addr = va.checked_add(done).ok_or_else(|| bad_address(va))?;
            let mut pte = self.user_pte(addr)?;
            if pte.is_cow() {
                if cow::handle_cow_fault(self, frames, addr)?.copied() {
                    copied += 1;
                }
                pte = self.user_pte(addr)?;
            } else if access == Access::User && !pte.flags.contains(PteFlags::WRITABLE) {
                return Err(bad_address(addr));
            }
            let offset = addr & (PAGE_SIZE - 1);
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);
            let mut frame = frames.lock(pte.frame)?;
            frame.data_mut()[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(copied)
    }

    /// True if every byte of `[va, va + len)` is mapped for user access
    /// (and writable, after COW resolution, when `write` is set).
    pub fn check_range(&self, va: usize, len: usize, write: bool) -> bool {
        if len == 0 {
            return true;
        }
        let end = match va.checked_add(len) {
            Some(end) => end,
            None => return false,
        };
        let mut page = page_round_down(va);
        while page < end {
            match self.user_pte(page) {
                Ok(pte) if !write || pte.flags.is_logically_writable() => {}
                _ => return false,
            }
            page += PAGE_SIZE;
        }
        true
    }

    fn user_pte(&self, va: usize) -> Result<PageTableEntry> {
        match self.table.lookup(va) {
            Some(pte) if pte.flags.contains(PteFlags::PRESENT | PteFlags::USER) => Ok(pte),
            _ => Err(bad_address(va)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::USER_HEAP_BASE;

    #[test]
    fn test_map_range_rolls_back_on_exhaustion() {
        // root + 2 pages fit, the third does not
        let frames = FrameTable::new(3);
        let mut space = AddressSpace::new(&frames).unwrap();
        let err = space
            .map_range(&frames, USER_HEAP_BASE, 3 * PAGE_SIZE, PteFlags::USER_DATA)
            .unwrap_err();
        assert_eq!(err.kind(), nos_api::KernelError::OutOfMemory);
        assert_eq!(space.mapped_pages(), 0);
        assert_eq!(frames.free_frames(), 2);
    }

    #[test]
    fn test_fork_cow_marks_both_sides() {
        let frames = FrameTable::new(8);
        let mut parent = AddressSpace::new(&frames).unwrap();
        let data = parent.map_page(&frames, USER_HEAP_BASE, PteFlags::USER_DATA).unwrap();
        parent
            .map_page(&frames, USER_HEAP_BASE + PAGE_SIZE, PteFlags::USER_CODE)
            .unwrap();

        let (child, share) = parent.fork_cow(&frames).unwrap();
        assert_eq!(share, CowShare { cow_pages: 1, readonly_pages: 1 });
        assert_eq!(frames.refcount(data).unwrap(), 2);
        for space in [&parent, &child] {
            let pte = space.translate(USER_HEAP_BASE).unwrap();
            assert!(pte.is_cow());
            assert!(!pte.flags.contains(PteFlags::WRITABLE));
            assert!(!space.translate(USER_HEAP_BASE + PAGE_SIZE).unwrap().is_cow());
        }
    }

    #[test]
    fn test_fork_cow_without_root_frame_changes_nothing() {
        let frames = FrameTable::new(2);
        let mut parent = AddressSpace::new(&frames).unwrap();
        parent.map_page(&frames, USER_HEAP_BASE, PteFlags::USER_DATA).unwrap();
        assert!(parent.fork_cow(&frames).is_err());
        let pte = parent.translate(USER_HEAP_BASE).unwrap();
        assert!(pte.flags.contains(PteFlags::WRITABLE));
        assert!(!pte.is_cow());
        assert_eq!(frames.refcount(pte.frame).unwrap(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let frames = FrameTable::new(4);
        let mut space = AddressSpace::new(&frames).unwrap();
        space.map_page(&frames, USER_HEAP_BASE, PteFlags::USER_DATA).unwrap();
        assert_eq!(space.teardown(&frames), 1);
        assert_eq!(space.teardown(&frames), 0);
        assert_eq!(frames.free_frames(), 4);
    }

    #[test]
    fn test_user_write_to_code_page_is_rejected() {
        let frames = FrameTable::new(4);
        let mut space = AddressSpace::new(&frames).unwrap();
        space.map_page(&frames, USER_HEAP_BASE, PteFlags::USER_CODE).unwrap();
        assert!(space.write_bytes(&frames, USER_HEAP_BASE, b"x", Access::User).is_err());
        assert!(space.write_bytes(&frames, USER_HEAP_BASE, b"x", Access::Kernel).is_ok());
    }

    #[test]
    fn test_read_write_cross_page_boundary() {
        let frames = FrameTable::new(4);
        let mut space = AddressSpace::new(&frames).unwrap();
        space
            .map_range(&frames, USER_HEAP_BASE, 2 * PAGE_SIZE, PteFlags::USER_DATA)
            .unwrap();
        let va = USER_HEAP_BASE + PAGE_SIZE - 2;
        space.write_bytes(&frames, va, b"abcd", Access::User).unwrap();
        let mut buf = [0u8; 4];
        space.read_bytes(&frames, va, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert!(space.check_range(va, 4, true));
        assert!(!space.check_range(va, PAGE_SIZE + 4, false));
    }
}
