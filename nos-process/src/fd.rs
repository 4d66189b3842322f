//! Per-process file descriptor table
//!
//! Descriptors refer to shared open-file objects through `Arc`; the strong
//! count is the open-file reference count, so duplicating a table for fork
//! is a clone of every slot.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;
use nos_api::{Fd, KernelError, OpenFile, Result};

bitflags! {
    /// Per-descriptor flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FdFlags: u32 {
        /// Close this descriptor on a successful exec
        const CLOEXEC = 0x1;
    }
}

/// One open descriptor
#[derive(Clone)]
pub struct FileDescriptor {
    /// Descriptor number
    pub fd: Fd,
    /// Current file offset
    pub offset: u64,
    /// Descriptor flags
    pub flags: FdFlags,
    /// Shared open-file object
    pub file: Arc<dyn OpenFile>,
}

impl FileDescriptor {
    /// True if the descriptor is closed on exec
    pub fn is_cloexec(&self) -> bool {
        self.flags.contains(FdFlags::CLOEXEC)
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("fd", &self.fd)
            .field("offset", &self.offset)
            .field("flags", &self.flags)
            .field("file", &self.file.name())
            .finish()
    }
}

/// Fixed-size descriptor table
#[derive(Clone, Debug)]
pub struct FdTable {
    slots: Vec<Option<FileDescriptor>>,
}

impl FdTable {
    /// Creates an empty table with `size` slots
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of open descriptors
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Installs `file` at the lowest free descriptor number.
    pub fn install(&mut self, file: Arc<dyn OpenFile>, flags: FdFlags) -> Result<Fd> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(KernelError::TooManyFiles)?;
        let fd = index as Fd;
        self.slots[index] = Some(FileDescriptor {
            fd,
            offset: 0,
            flags,
            file,
        });
        Ok(fd)
    }

    fn slot(&self, fd: Fd) -> Option<&Option<FileDescriptor>> {
        usize::try_from(fd).ok().and_then(|index| self.slots.get(index))
    }

    /// Looks up an open descriptor
    pub fn get(&self, fd: Fd) -> Option<&FileDescriptor> {
        self.slot(fd).and_then(|slot| slot.as_ref())
    }

    /// Replaces the flags of an open descriptor
    pub fn set_flags(&mut self, fd: Fd, flags: FdFlags) -> Result<()> {
        let entry = usize::try_from(fd)
            .ok()
            .and_then(|index| self.slots.get_mut(index))
            .and_then(|slot| slot.as_mut())
            .ok_or(KernelError::BadFileDescriptor)?;
        entry.flags = flags;
        Ok(())
    }

    /// Closes one descriptor
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let entry = usize::try_from(fd)
            .ok()
            .and_then(|index| self.slots.get_mut(index))
            .and_then(|slot| slot.take())
            .ok_or(KernelError::BadFileDescriptor)?;
        entry.file.on_descriptor_close();
        Ok(())
    }

    /// Copy for a forked child: same open files, same flags and offsets.
    pub fn duplicate(&self) -> Self {
        let dup = self.clone();
        log::trace!("fd: duplicated {} descriptors", dup.open_count());
        dup
    }

    /// Closes every close-on-exec descriptor; returns how many were closed.
    pub fn close_on_exec(&mut self) -> usize {
        self.close_matching(|desc| desc.is_cloexec())
    }

    /// Closes everything; returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        self.close_matching(|_| true)
    }

    fn close_matching(&mut self, pred: impl Fn(&FileDescriptor) -> bool) -> usize {
        let mut closed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(&pred) {
                if let Some(desc) = slot.take() {
                    desc.file.on_descriptor_close();
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Iterates open descriptors
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }
}
