//! User memory access helpers
//!
//! Every helper checks the range against the user half of the address
//! space and walks the page table; nothing dereferences a user pointer
//! directly. A null or unmapped pointer is `EFAULT`.

extern crate alloc;

use alloc::vec::Vec;

use nos_api::error::bad_address;
use nos_api::Result;

use crate::physical::{FrameTable, PAGE_SIZE};
use crate::virtual_mem::is_user_range;
use crate::vm::{Access, AddressSpace};

/// Size of a user pointer slot
pub const USER_PTR_SIZE: usize = core::mem::size_of::<u64>();

fn check_user(va: usize, len: usize) -> Result<()> {
    if va == 0 || !is_user_range(va, len.max(1)) {
        return Err(bad_address(va));
    }
    Ok(())
}

/// Copies `data` to user address `va`. Pages shared copy-on-write are
/// resolved first; returns the number of pages that were copied.
pub fn copy_to_user(space: &mut AddressSpace, frames: &FrameTable, va: usize, data: &[u8]) -> Result<usize> {
    check_user(va, data.len())?;
    space.write_bytes(frames, va, data, Access::User)
}

/// Copies `buf.len()` bytes from user address `va`.
pub fn copy_from_user(space: &AddressSpace, frames: &FrameTable, va: usize, buf: &mut [u8]) -> Result<()> {
    check_user(va, buf.len())?;
    space.read_bytes(frames, va, buf)
}

/// Reads a NUL-terminated string of at most `cap` bytes.
///
/// The terminator is not included. If no terminator appears within `cap`
/// bytes the first `cap` bytes are returned, so a caller that passes
/// `limit + 1` can tell an over-long string from one that fits.
pub fn read_user_cstr(space: &AddressSpace, frames: &FrameTable, va: usize, cap: usize) -> Result<Vec<u8>> {
    check_user(va, 1)?;
    let mut out = Vec::new();
    let mut addr = va;
    while out.len() < cap {
        let in_page = PAGE_SIZE - (addr & (PAGE_SIZE - 1));
        let want = in_page.min(cap - out.len());
        let mut chunk = [0u8; PAGE_SIZE];
        check_user(addr, want)?;
        space.read_bytes(frames, addr, &mut chunk[..want])?;
        if let Some(nul) = chunk[..want].iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..nul]);
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..want]);
        addr = addr.checked_add(want).ok_or_else(|| bad_address(va))?;
    }
    Ok(out)
}

/// Reads a null-terminated array of user pointers (argv/envp style).
///
/// At most `max` entries are read; a longer array yields `max + 1`
/// entries so the caller can reject it. A null `va` is an empty array.
pub fn read_user_ptr_array(space: &AddressSpace, frames: &FrameTable, va: usize, max: usize) -> Result<Vec<usize>> {
    let mut ptrs = Vec::new();
    if va == 0 {
        return Ok(ptrs);
    }
    let mut slot = va;
    while ptrs.len() <= max {
        let mut raw = [0u8; USER_PTR_SIZE];
        copy_from_user(space, frames, slot, &mut raw)?;
        let ptr = u64::from_le_bytes(raw) as usize;
        if ptr == 0 {
            break;
        }
        ptrs.push(ptr);
        slot = slot.checked_add(USER_PTR_SIZE).ok_or_else(|| bad_address(va))?;
    }
    Ok(ptrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::USER_HEAP_BASE;
    use crate::page_table::PteFlags;
    use nos_api::KernelError;

    fn space_with_heap(frames: &FrameTable, pages: usize) -> AddressSpace {
        let mut space = AddressSpace::new(frames).unwrap();
        space
            .map_range(frames, USER_HEAP_BASE, pages * PAGE_SIZE, PteFlags::USER_DATA)
            .unwrap();
        space
    }

    #[test]
    fn test_cstr_across_pages() {
        let frames = FrameTable::new(4);
        let mut space = space_with_heap(&frames, 2);
        let va = USER_HEAP_BASE + PAGE_SIZE - 3;
        copy_to_user(&mut space, &frames, va, b"hello\0").unwrap();
        assert_eq!(read_user_cstr(&space, &frames, va, 16).unwrap(), b"hello");
        assert_eq!(read_user_cstr(&space, &frames, va, 3).unwrap(), b"hel");
    }

    #[test]
    fn test_null_pointer_is_efault() {
        let frames = FrameTable::new(2);
        let space = space_with_heap(&frames, 1);
        let err = read_user_cstr(&space, &frames, 0, 8).unwrap_err();
        assert_eq!(err.kind(), KernelError::BadAddress);
        let mut buf = [0u8; 1];
        assert!(copy_from_user(&space, &frames, usize::MAX, &mut buf).is_err());
    }

    #[test]
    fn test_pointer_array() {
        let frames = FrameTable::new(2);
        let mut space = space_with_heap(&frames, 1);
        let mut raw = Vec::new();
        for p in [0x1111u64, 0x2222, 0] {
            raw.extend_from_slice(&p.to_le_bytes());
        }
        copy_to_user(&mut space, &frames, USER_HEAP_BASE, &raw).unwrap();
        let ptrs = read_user_ptr_array(&space, &frames, USER_HEAP_BASE, 8).unwrap();
        assert_eq!(ptrs, [0x1111, 0x2222]);
        assert_eq!(read_user_ptr_array(&space, &frames, USER_HEAP_BASE, 1).unwrap().len(), 2);
        assert!(read_user_ptr_array(&space, &frames, 0, 8).unwrap().is_empty());
    }
}
