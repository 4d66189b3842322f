//! Executable image loading
//!
//! Exec hands a fresh, empty address space to an [`ImageLoader`], which maps
//! the program and reports where it starts. Binary formats live behind this
//! trait; [`FlatImageLoader`] serves raw code blobs registered by name.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use nos_api::error::{exec_format, not_found};
use nos_api::Result;
use nos_memory_management::{
    page_round_up, Access, AddressSpace, FrameTable, PteFlags, USER_CODE_BASE, USER_HEAP_BASE,
};
use spin::Mutex;

/// Where a loaded image starts and ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    /// Entry point
    pub entry: usize,
    /// First address past the code region (page aligned)
    pub code_end: usize,
}

/// Maps an executable into an address space
pub trait ImageLoader: Send + Sync {
    /// Loads `path` into `space`.
    ///
    /// Missing images are `ENOENT`, malformed or non-executable ones
    /// `ENOEXEC`, frame exhaustion `ENOMEM`. On failure the caller discards
    /// `space`, so partial mappings need no cleanup.
    fn load(&self, path: &str, space: &mut AddressSpace, frames: &FrameTable) -> Result<LoadedImage>;
}

/// Flat binary: raw code placed at the start of the code region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatImage {
    pub code: Vec<u8>,
    /// Entry point offset into `code`
    pub entry_offset: usize,
    pub executable: bool,
}

impl FlatImage {
    /// Executable image starting at offset 0
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            entry_offset: 0,
            executable: true,
        }
    }

    /// Sets the entry offset
    pub fn with_entry(mut self, offset: usize) -> Self {
        self.entry_offset = offset;
        self
    }

    /// Clears the executable bit
    pub fn not_executable(mut self) -> Self {
        self.executable = false;
        self
    }
}

/// Loader serving [`FlatImage`]s from an in-memory registry
#[derive(Debug, Default)]
pub struct FlatImageLoader {
    images: Mutex<HashMap<String, FlatImage>>,
}

impl FlatImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the image at `path`
    pub fn register(&self, path: &str, image: FlatImage) {
        self.images.lock().insert(String::from(path), image);
    }

    /// Removes the image at `path`
    pub fn unregister(&self, path: &str) -> Option<FlatImage> {
        self.images.lock().remove(path)
    }

    fn validate(image: &FlatImage) -> Result<()> {
        if !image.executable {
            return Err(exec_format("image is not executable"));
        }
        if image.code.is_empty() || image.entry_offset >= image.code.len() {
            return Err(exec_format("entry point outside image"));
        }
        if image.code.len() > USER_HEAP_BASE - USER_CODE_BASE {
            return Err(exec_format("image larger than the code region"));
        }
        Ok(())
    }
}

impl ImageLoader for FlatImageLoader {
    fn load(&self, path: &str, space: &mut AddressSpace, frames: &FrameTable) -> Result<LoadedImage> {
        let image = self
            .images
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))?;
        Self::validate(&image)?;

        space.map_range(frames, USER_CODE_BASE, image.code.len(), PteFlags::USER_CODE)?;
        space.write_bytes(frames, USER_CODE_BASE, &image.code, Access::Kernel)?;
        log::debug!("loader: mapped {} ({} bytes)", path, image.code.len());

        Ok(LoadedImage {
            entry: USER_CODE_BASE + image.entry_offset,
            code_end: page_round_up(USER_CODE_BASE + image.code.len()),
        })
    }
}
