//! User address space layout
//!
//! A freshly exec'd image is laid out as:
//!
//! ```text
//! USER_STACK_TOP   +-----------------+
//!                  |  stack (grows v) |  USER_STACK_SIZE
//!                  +-----------------+
//!                  |       ...       |
//! USER_HEAP_BASE   +-----------------+  heap grows ^
//!                  |      code       |
//! USER_CODE_BASE   +-----------------+
//! ```

use core::ops::Range;

use static_assertions::const_assert;

use crate::physical::PAGE_SIZE;

/// Lowest mappable user address (page 0 stays unmapped)
pub const USER_BASE: usize = PAGE_SIZE;
/// Start of the code region and default entry point
pub const USER_CODE_BASE: usize = 0x40_0000;
/// Start of the heap (end of the code region)
pub const USER_HEAP_BASE: usize = 0x60_0000;
/// Top of the user stack (exclusive)
pub const USER_STACK_TOP: usize = 0x7fff_ffff_f000;
/// Reserved stack size
pub const USER_STACK_SIZE: usize = 8 * 1024 * 1024;
/// First address past user space
pub const USER_MAX: usize = 0x8000_0000_0000;

const_assert!(USER_CODE_BASE % PAGE_SIZE == 0);
const_assert!(USER_HEAP_BASE % PAGE_SIZE == 0);
const_assert!(USER_STACK_TOP % PAGE_SIZE == 0);
const_assert!(USER_CODE_BASE < USER_HEAP_BASE);
const_assert!(USER_HEAP_BASE < USER_STACK_TOP - USER_STACK_SIZE);
const_assert!(USER_STACK_TOP <= USER_MAX);

/// Virtual region bounds recorded for a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegions {
    /// Code (text) region
    pub code: Range<usize>,
    /// Heap region; `end` is the current break
    pub heap: Range<usize>,
    /// Stack region; `end` is the stack top
    pub stack: Range<usize>,
}

impl MemoryRegions {
    /// Regions with nothing mapped
    pub const fn empty() -> Self {
        Self {
            code: 0..0,
            heap: 0..0,
            stack: 0..0,
        }
    }

    /// Standard layout for an image whose code ends at `code_end`.
    pub const fn standard(code_end: usize) -> Self {
        Self {
            code: USER_CODE_BASE..code_end,
            heap: USER_HEAP_BASE..USER_HEAP_BASE,
            stack: USER_STACK_TOP - USER_STACK_SIZE..USER_STACK_TOP,
        }
    }

    /// True if `addr` falls inside any recorded region.
    pub fn contains(&self, addr: usize) -> bool {
        self.code.contains(&addr) || self.heap.contains(&addr) || self.stack.contains(&addr)
    }

    /// Checks the regions are ordered and non-overlapping.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.code.start > self.code.end
            || self.heap.start > self.heap.end
            || self.stack.start > self.stack.end
        {
            return Err("inverted region");
        }
        if self.code.end > self.heap.start && !self.heap.is_empty() {
            return Err("code overlaps heap");
        }
        if self.heap.end > self.stack.start && !self.stack.is_empty() {
            return Err("heap overlaps stack");
        }
        Ok(())
    }
}

impl Default for MemoryRegions {
    fn default() -> Self {
        Self::empty()
    }
}
