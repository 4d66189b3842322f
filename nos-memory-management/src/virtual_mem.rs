//! Virtual memory management module

use crate::layout::{USER_BASE, USER_MAX};

/// Checks that `[addr, addr + len)` is a non-wrapping user range.
pub fn is_user_range(addr: usize, len: usize) -> bool {
    match addr.checked_add(len) {
        Some(end) => addr >= USER_BASE && end <= USER_MAX,
        None => false,
    }
}
