//! Process table
//!
//! A bounded arena of PCB slots. Each slot carries a generation counter
//! that is bumped when the slot is freed, so a [`ProcHandle`] taken before
//! a reap can never reach the slot's next occupant.
//!
//! Every parent keeps two singly linked lists threaded through
//! `next_sibling`: live children (`first_child`) and zombie children
//! (`first_zombie`). A PCB is on exactly one of them unless it is the root.

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use nos_api::error::{invalid_state, try_again};
use nos_api::{KernelError, Pid, Result};

use crate::pcb::{Proc, SlotIndex};

/// Generation-checked reference to a process table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcHandle {
    index: SlotIndex,
    generation: u32,
}

impl ProcHandle {
    /// Slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Generation the slot had when this handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    proc: Option<Proc>,
}

/// Process table
pub struct ProcTable {
    slots: Vec<Slot>,
    free_list: Vec<SlotIndex>,
    pid_to_index: HashMap<Pid, SlotIndex>,
    next_pid: Pid,
    first_pid: Pid,
    max_pid: Pid,
    root: Option<SlotIndex>,
}

impl ProcTable {
    /// Creates a table with `capacity` slots allocating pids in
    /// `first_pid..max_pid`.
    pub fn new(capacity: usize, first_pid: Pid, max_pid: Pid) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        let mut pid_to_index = HashMap::new();
        pid_to_index.reserve(capacity);
        Self {
            slots,
            // Slot 0 comes off the free list first
            free_list: (0..capacity).rev().collect(),
            pid_to_index,
            next_pid: first_pid,
            first_pid,
            max_pid,
            root: None,
        }
    }

    /// Number of occupied slots (live and zombie)
    pub fn len(&self) -> usize {
        self.pid_to_index.len()
    }

    /// True if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.pid_to_index.is_empty()
    }

    /// Table ceiling
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True if an insert would succeed
    pub fn has_free_slot(&self) -> bool {
        !self.free_list.is_empty()
    }

    /// Pid the next insert will use. Does not consume it.
    pub fn peek_pid(&self) -> Result<Pid> {
        let span = self.max_pid - self.first_pid;
        let mut pid = self.next_pid;
        for _ in 0..span {
            if pid >= self.max_pid {
                pid = self.first_pid;
            }
            if !self.pid_to_index.contains_key(&pid) {
                return Ok(pid);
            }
            pid += 1;
        }
        Err(try_again("pid space exhausted"))
    }

    /// Places `proc` in a free slot. Its pid must come from [`peek_pid`].
    ///
    /// [`peek_pid`]: ProcTable::peek_pid
    pub fn insert(&mut self, proc: Proc) -> Result<ProcHandle> {
        if self.pid_to_index.contains_key(&proc.pid) {
            return Err(invalid_state("pid already in use"));
        }
        let index = self
            .free_list
            .pop()
            .ok_or_else(|| try_again("process table full"))?;
        let pid = proc.pid;
        let slot = &mut self.slots[index];
        slot.proc = Some(proc);
        self.pid_to_index.insert(pid, index);
        self.next_pid = if pid + 1 >= self.max_pid { self.first_pid } else { pid + 1 };
        Ok(ProcHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Inserts the root process; it has no parent and is never reaped.
    pub fn insert_root(&mut self, proc: Proc) -> Result<ProcHandle> {
        if self.root.is_some() {
            return Err(KernelError::Busy.into());
        }
        let handle = self.insert(proc)?;
        self.root = Some(handle.index);
        Ok(handle)
    }

    /// Frees a slot. The PCB must already be unlinked from its parent.
    pub fn remove(&mut self, handle: ProcHandle) -> Result<Proc> {
        let index = self.validate(handle)?;
        if Some(index) == self.root {
            return Err(invalid_state("root process cannot be freed"));
        }
        let slot = &mut self.slots[index];
        let proc = slot
            .proc
            .take()
            .ok_or_else(|| invalid_state("slot already free"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.pid_to_index.remove(&proc.pid);
        self.free_list.push(index);
        Ok(proc)
    }

    fn validate(&self, handle: ProcHandle) -> Result<SlotIndex> {
        match self.slots.get(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.proc.is_some() => Ok(handle.index),
            _ => Err(KernelError::NoProcess.into()),
        }
    }

    /// Resolves a handle, failing if the slot was freed since it was issued
    pub fn get(&self, handle: ProcHandle) -> Option<&Proc> {
        self.validate(handle).ok().and_then(|index| self.at(index))
    }

    /// Mutable variant of [`ProcTable::get`]
    pub fn get_mut(&mut self, handle: ProcHandle) -> Option<&mut Proc> {
        let index = self.validate(handle).ok()?;
        self.at_mut(index)
    }

    /// Handle for a pid
    pub fn lookup(&self, pid: Pid) -> Option<ProcHandle> {
        self.pid_to_index.get(&pid).map(|&index| self.handle_at(index))
    }

    /// Pid of the root process
    pub fn root_pid(&self) -> Option<Pid> {
        self.root.and_then(|index| self.at(index)).map(|proc| proc.pid)
    }

    pub(crate) fn root_index(&self) -> Option<SlotIndex> {
        self.root
    }

    pub(crate) fn handle_at(&self, index: SlotIndex) -> ProcHandle {
        ProcHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    pub(crate) fn index_of(&self, pid: Pid) -> Option<SlotIndex> {
        self.pid_to_index.get(&pid).copied()
    }

    pub(crate) fn at(&self, index: SlotIndex) -> Option<&Proc> {
        self.slots.get(index).and_then(|slot| slot.proc.as_ref())
    }

    pub(crate) fn at_mut(&mut self, index: SlotIndex) -> Option<&mut Proc> {
        self.slots.get_mut(index).and_then(|slot| slot.proc.as_mut())
    }

    /// Slot index of a live (non-zombie) process
    pub(crate) fn live_index(&self, pid: Pid) -> Result<SlotIndex> {
        match self.index_of(pid) {
            Some(index) if self.at(index).is_some_and(Proc::is_alive) => Ok(index),
            _ => Err(KernelError::NoProcess.into()),
        }
    }

    fn proc_mut(&mut self, index: SlotIndex) -> Result<&mut Proc> {
        self.at_mut(index).ok_or_else(|| invalid_state("dangling slot index"))
    }

    // ========================================================================
    // Tree links
    // ========================================================================

    /// Pushes `child` onto the head of `parent`'s live-children list
    pub(crate) fn link_child(&mut self, parent: SlotIndex, child: SlotIndex) -> Result<()> {
        let (parent_pid, head) = {
            let p = self.proc_mut(parent)?;
            (p.pid, p.first_child)
        };
        let c = self.proc_mut(child)?;
        c.parent = Some(parent);
        c.ppid = parent_pid;
        c.next_sibling = head;
        self.proc_mut(parent)?.first_child = Some(child);
        Ok(())
    }

    /// Pushes `child` onto the head of `parent`'s zombie list
    pub(crate) fn link_zombie(&mut self, parent: SlotIndex, child: SlotIndex) -> Result<()> {
        let (parent_pid, head) = {
            let p = self.proc_mut(parent)?;
            (p.pid, p.first_zombie)
        };
        let c = self.proc_mut(child)?;
        c.parent = Some(parent);
        c.ppid = parent_pid;
        c.next_sibling = head;
        self.proc_mut(parent)?.first_zombie = Some(child);
        Ok(())
    }

    /// Removes `child` from `parent`'s live-children list
    pub(crate) fn unlink_child(&mut self, parent: SlotIndex, child: SlotIndex) -> Result<()> {
        self.unlink(parent, child, false)
    }

    /// Removes `child` from `parent`'s zombie list
    pub(crate) fn unlink_zombie(&mut self, parent: SlotIndex, child: SlotIndex) -> Result<()> {
        self.unlink(parent, child, true)
    }

    fn unlink(&mut self, parent: SlotIndex, child: SlotIndex, zombie: bool) -> Result<()> {
        let next = self.proc_mut(child)?.next_sibling;
        let head = {
            let p = self.proc_mut(parent)?;
            if zombie { p.first_zombie } else { p.first_child }
        };

        if head == Some(child) {
            let p = self.proc_mut(parent)?;
            if zombie {
                p.first_zombie = next;
            } else {
                p.first_child = next;
            }
        } else {
            let mut cursor = head;
            loop {
                let index = cursor.ok_or_else(|| invalid_state("child not on parent list"))?;
                let node = self.proc_mut(index)?;
                if node.next_sibling == Some(child) {
                    node.next_sibling = next;
                    break;
                }
                cursor = node.next_sibling;
            }
        }

        let c = self.proc_mut(child)?;
        c.parent = None;
        c.next_sibling = None;
        Ok(())
    }

    fn collect_list(&self, head: Option<SlotIndex>) -> Vec<SlotIndex> {
        let mut out = Vec::new();
        let mut cursor = head;
        while let Some(index) = cursor {
            out.push(index);
            cursor = self.at(index).and_then(|proc| proc.next_sibling);
            if out.len() > self.slots.len() {
                // cycle; validate_tree reports it
                break;
            }
        }
        out
    }

    /// Live children of `parent`, most recent first
    pub(crate) fn children_of(&self, parent: SlotIndex) -> Vec<SlotIndex> {
        self.collect_list(self.at(parent).and_then(|proc| proc.first_child))
    }

    /// Zombie children of `parent`, most recently exited first
    pub(crate) fn zombies_of(&self, parent: SlotIndex) -> Vec<SlotIndex> {
        self.collect_list(self.at(parent).and_then(|proc| proc.first_zombie))
    }

    /// Iterates every occupied slot
    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.slots.iter().filter_map(|slot| slot.proc.as_ref())
    }

    /// Checks the tree invariants:
    /// every non-root PCB has a parent and sits exactly once on the list
    /// matching its state; list members point back at their parent; no
    /// zombie has live children; the pid index agrees with the slots.
    pub fn validate_tree(&self) -> Result<()> {
        let mut seen = alloc::vec![0usize; self.slots.len()];

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(proc) = slot.proc.as_ref() else {
                continue;
            };
            if self.pid_to_index.get(&proc.pid) != Some(&index) {
                return Err(invalid_state("pid index out of sync"));
            }
            if !proc.is_alive() && proc.first_child.is_some() {
                return Err(invalid_state("zombie with live children"));
            }
            for (list, zombie) in [(self.children_of(index), false), (self.zombies_of(index), true)] {
                for member in list {
                    let child = self
                        .at(member)
                        .ok_or_else(|| invalid_state("list points at a free slot"))?;
                    if child.parent != Some(index) || child.ppid != proc.pid {
                        return Err(invalid_state("child's parent link disagrees with list"));
                    }
                    if child.is_alive() == zombie {
                        return Err(invalid_state("child on the wrong list for its state"));
                    }
                    seen[member] += 1;
                }
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let expected = match slot.proc {
                Some(_) if Some(index) == self.root => 0,
                Some(_) => 1,
                None => 0,
            };
            if seen[index] != expected {
                return Err(invalid_state("process not linked exactly once"));
            }
        }
        if self.len() + self.free_list.len() != self.capacity() {
            return Err(invalid_state("free list out of sync"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProcTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("next_pid", &self.next_pid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::FdTable;
    use alloc::string::String;
    use alloc::sync::Arc;
    use nos_api::ProcessState;
    use nos_memory_management::{AddressSpace, FrameTable};
    use spin::Mutex;

    fn proc(frames: &FrameTable, pid: Pid) -> Proc {
        let space = Arc::new(Mutex::new(AddressSpace::new(frames).unwrap()));
        Proc::new(pid, String::from("p"), space, FdTable::new(4))
    }

    fn table_with_root(frames: &FrameTable, capacity: usize) -> (ProcTable, SlotIndex) {
        let mut table = ProcTable::new(capacity, 1, 100);
        let pid = table.peek_pid().unwrap();
        let root = table.insert_root(proc(frames, pid)).unwrap();
        (table, root.index())
    }

    fn spawn(table: &mut ProcTable, frames: &FrameTable, parent: SlotIndex) -> ProcHandle {
        let pid = table.peek_pid().unwrap();
        let handle = table.insert(proc(frames, pid)).unwrap();
        table.link_child(parent, handle.index()).unwrap();
        handle
    }

    #[test]
    fn test_failed_link_unwinds_insert() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 4);
        let pid = table.peek_pid().unwrap();
        let handle = table.insert(proc(&frames, pid)).unwrap();

        assert!(table.link_child(99, handle.index()).is_err());
        let unwound = table.remove(handle).unwrap();
        assert_eq!(unwound.pid, pid);
        assert!(table.index_of(pid).is_none());
        assert!(table.get(handle).is_none());
        assert!(table.children_of(root).is_empty());
        table.validate_tree().unwrap();

        let retry = spawn(&mut table, &frames, root);
        assert_eq!(retry.index(), handle.index());
        assert_ne!(retry, handle);
    }

    #[test]
    fn test_head_insertion_order() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 8);
        let a = spawn(&mut table, &frames, root);
        let b = spawn(&mut table, &frames, root);
        assert_eq!(table.children_of(root), [b.index(), a.index()]);
        assert_eq!(table.get(a).unwrap().ppid, 1);
        table.validate_tree().unwrap();
    }

    #[test]
    fn test_unlink_middle_and_tail() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 8);
        let a = spawn(&mut table, &frames, root);
        let b = spawn(&mut table, &frames, root);
        let c = spawn(&mut table, &frames, root);
        table.unlink_child(root, b.index()).unwrap();
        assert_eq!(table.children_of(root), [c.index(), a.index()]);
        table.unlink_child(root, a.index()).unwrap();
        assert_eq!(table.children_of(root), [c.index()]);
        assert!(table.unlink_child(root, a.index()).is_err());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 4);
        let a = spawn(&mut table, &frames, root);
        table.unlink_child(root, a.index()).unwrap();
        table.remove(a).unwrap();

        let b = spawn(&mut table, &frames, root);
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());
        assert!(table.remove(a).is_err());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 2);
        spawn(&mut table, &frames, root);
        assert!(!table.has_free_slot());
        let pid = table.peek_pid().unwrap();
        let err = table.insert(proc(&frames, pid)).unwrap_err();
        assert_eq!(err.kind(), KernelError::TryAgain);
    }

    #[test]
    fn test_pid_allocation_wraps_and_skips_live() {
        let frames = FrameTable::new(16);
        let mut table = ProcTable::new(4, 10, 13);
        for expected in [10, 11, 12] {
            let pid = table.peek_pid().unwrap();
            assert_eq!(pid, expected);
            table.insert(proc(&frames, pid)).unwrap();
        }
        let h = table.lookup(11).unwrap();
        table.remove(h).unwrap();
        assert_eq!(table.peek_pid().unwrap(), 11);
    }

    #[test]
    fn test_validate_detects_wrong_list() {
        let frames = FrameTable::new(16);
        let (mut table, root) = table_with_root(&frames, 4);
        let a = spawn(&mut table, &frames, root);
        table.get_mut(a).unwrap().state = ProcessState::Zombie;
        assert!(table.validate_tree().is_err());
    }
}
