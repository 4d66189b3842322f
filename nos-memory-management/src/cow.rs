//! Copy-on-write fault resolution
//!
//! The caller holds the faulting process's address-space lock. The frame
//! lock is the per-page critical section: two processes sharing a frame
//! serialize on it, so only one of them can observe a reference count above
//! one and copy. The other then sees itself as sole owner and keeps the
//! original frame.

use nos_api::error::bad_address;
use nos_api::Result;

use crate::page_table::PteFlags;
use crate::physical::{page_round_down, FrameTable, PhysAddr};
use crate::vm::AddressSpace;

/// How a write fault on a COW page was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CowResolution {
    /// Sole owner: the COW bit was cleared and write access granted
    Reused,
    /// Shared: the page was copied into a new private frame
    Copied {
        /// Frame previously mapped
        old: PhysAddr,
        /// Private frame now mapped
        new: PhysAddr,
    },
    /// The page was already writable when the fault was examined
    AlreadyResolved,
}

impl CowResolution {
    /// True if a physical copy was made
    pub fn copied(&self) -> bool {
        matches!(self, CowResolution::Copied { .. })
    }
}

/// Resolves a write fault at `va`.
///
/// Fails with `EFAULT` if the page is unmapped or not writable even
/// logically (a genuine protection violation), and with `ENOMEM` if a
/// private copy is needed but no frame is free. On failure the mapping is
/// left untouched.
pub fn handle_cow_fault(space: &mut AddressSpace, frames: &FrameTable, va: usize) -> Result<CowResolution> {
    let page = page_round_down(va);
    let pte = space
        .page_table_mut()
        .lookup_mut(page)
        .ok_or_else(|| bad_address(va))?;

    if !pte.flags.contains(PteFlags::PRESENT | PteFlags::USER) {
        return Err(bad_address(va));
    }
    if !pte.is_cow() {
        if pte.flags.contains(PteFlags::WRITABLE) {
            return Ok(CowResolution::AlreadyResolved);
        }
        return Err(bad_address(va));
    }

    let old = pte.frame;
    let mut frame = frames.lock(old)?;
    if frame.refcount() <= 1 {
        pte.flags = (pte.flags - PteFlags::COW) | PteFlags::WRITABLE;
        log::trace!("cow: reusing sole-owner frame {:#x} at {:#x}", old.0, page);
        return Ok(CowResolution::Reused);
    }

    let new = frames.alloc()?;
    frames.lock(new)?.data_mut().copy_from_slice(frame.data());
    // Count stays >= 1 here: another mapping still holds the frame.
    if frame.put() {
        drop(frame);
        frames.recycle(old)?;
    }
    pte.frame = new;
    pte.flags = (pte.flags - PteFlags::COW) | PteFlags::WRITABLE;
    log::trace!("cow: copied frame {:#x} -> {:#x} at {:#x}", old.0, new.0, page);
    Ok(CowResolution::Copied { old, new })
}
