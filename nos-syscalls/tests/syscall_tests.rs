//! System call tests

use std::sync::Arc;

use nos_api::process::{wexitstatus, wifexited};
use nos_api::{KernelError, Pid, SyscallArgs, SyscallResult};
use nos_memory_management::{FrameTable, PAGE_SIZE, USER_CODE_BASE, USER_HEAP_BASE};
use nos_process::{FifoScheduler, FlatImage, FlatImageLoader, ProcessConfig, ProcessManager};
use nos_syscalls::*;

const WNOHANG: usize = 0x1;

struct Kernel {
    manager: ProcessManager,
    dispatcher: SyscallDispatcher,
    scheduler: Arc<FifoScheduler>,
    frames: Arc<FrameTable>,
    root: Pid,
}

impl Kernel {
    fn boot() -> Self {
        Self::boot_with(256, 4)
    }

    fn boot_with(frame_count: usize, heap_pages: usize) -> Self {
        let loader = Arc::new(FlatImageLoader::new());
        loader.register("/bin/prog", FlatImage::new(vec![0xc3; 32]).with_entry(4));
        let scheduler = Arc::new(FifoScheduler::new());
        let frames = Arc::new(FrameTable::new(frame_count));
        let manager = ProcessManager::new(
            ProcessConfig::default().with_pid_range(100, 32768),
            frames.clone(),
            loader,
            scheduler.clone(),
        )
        .unwrap();
        let root = manager.bootstrap_root("init").unwrap();
        manager.extend_heap(root, heap_pages * PAGE_SIZE).unwrap();
        Self {
            manager,
            dispatcher: init_dispatcher().unwrap(),
            scheduler,
            frames,
            root,
        }
    }

    fn call(&self, caller: Pid, id: u32, args: SyscallArgs) -> SyscallResult {
        self.dispatcher.dispatch(&self.manager, caller, id, &args)
    }

    fn poke(&self, pid: Pid, va: usize, bytes: &[u8]) {
        self.manager.copy_to_user(pid, va, bytes).unwrap();
    }

    fn poke_ptrs(&self, pid: Pid, va: usize, ptrs: &[usize]) {
        let bytes: Vec<u8> = ptrs.iter().flat_map(|p| (*p as u64).to_le_bytes()).collect();
        self.poke(pid, va, &bytes);
    }

    fn peek_status(&self, pid: Pid, va: usize) -> i32 {
        let mut raw = [0u8; 4];
        self.manager.copy_from_user(pid, va, &mut raw).unwrap();
        i32::from_le_bytes(raw)
    }
}

#[test]
fn test_syscall_result() {
    let success = SyscallResult::Success(42);
    assert_eq!(success.to_isize(), 42);

    let error = SyscallResult::Error(KernelError::NoChild);
    assert_eq!(error.to_isize(), -10);

    assert_eq!(SyscallResult::from_isize(42), SyscallResult::Success(42));
    assert_eq!(SyscallResult::from_isize(-11), SyscallResult::Error(KernelError::TryAgain));
}

#[test]
fn test_syscall_numbers() {
    assert_eq!((SYS_FORK, SYS_EXECVE, SYS_WAIT, SYS_WAITPID), (2, 3, 4, 5));
    assert_eq!(syscall_name(SYS_WAITPID), "waitpid");
    assert_eq!(syscall_name(999), "unknown");
}

#[test]
fn test_unknown_syscall_is_enosys() {
    let k = Kernel::boot();
    let result = k.call(k.root, 999, SyscallArgs::empty());
    assert_eq!(result, SyscallResult::Error(KernelError::NotImplemented));
    assert_eq!(result.to_isize(), -38);
    assert_eq!(k.dispatcher.get_stats().error_count, 1);
}

#[test]
fn test_getpid_and_getppid() {
    let k = Kernel::boot();
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;
    assert_eq!(k.call(child, SYS_GETPID, SyscallArgs::empty()), SyscallResult::Success(child as isize));
    assert_eq!(k.call(child, SYS_GETPPID, SyscallArgs::empty()), SyscallResult::Success(100));
    assert_eq!(k.call(4242, SYS_GETPID, SyscallArgs::empty()).to_isize(), -3);
}

#[test]
fn test_fork_exit_wait_through_syscalls() {
    let k = Kernel::boot();
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty());
    assert_eq!(child, SyscallResult::Success(101));

    assert_eq!(k.call(101, SYS_EXIT, SyscallArgs::with1(0)), SyscallResult::Success(0));

    let status_va = USER_HEAP_BASE + 0x100;
    k.poke(k.root, status_va, &(-1i32).to_le_bytes());
    let reaped = k.call(k.root, SYS_WAIT, SyscallArgs::with1(status_va));
    assert_eq!(reaped, SyscallResult::Success(101));
    let status = k.peek_status(k.root, status_va);
    assert!(wifexited(status));
    assert_eq!(wexitstatus(status), 0);

    assert_eq!(k.call(k.root, SYS_FORK, SyscallArgs::empty()), SyscallResult::Success(102));
    assert_eq!(k.dispatcher.get_stats().calls_by_type.get(&SYS_FORK), Some(&2));
}

#[test]
fn test_wait_without_children_is_echild() {
    let k = Kernel::boot();
    let result = k.call(k.root, SYS_WAIT, SyscallArgs::with1(0));
    assert_eq!(result.to_isize(), -10);
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3((-1isize) as usize, 0, WNOHANG));
    assert_eq!(result, SyscallResult::Error(KernelError::NoChild));
}

#[test]
fn test_waitpid_nohang_and_restart() {
    let k = Kernel::boot();
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as usize;

    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(child, 0, WNOHANG));
    assert_eq!(result, SyscallResult::Success(0));

    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(child, 0, 0));
    assert_eq!(result, SyscallResult::Restart);
    assert!(k.scheduler.is_blocked(k.root));
    assert_eq!(k.dispatcher.get_stats().restart_count, 1);

    k.call(child as Pid, SYS_EXIT, SyscallArgs::with1(3));
    assert!(k.scheduler.is_ready(k.root));

    let status_va = USER_HEAP_BASE;
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(child, status_va, 0));
    assert_eq!(result, SyscallResult::Success(child as isize));
    assert_eq!(wexitstatus(k.peek_status(k.root, status_va)), 3);
}

#[test]
fn test_waitpid_bad_options_and_groups() {
    let k = Kernel::boot();
    k.call(k.root, SYS_FORK, SyscallArgs::empty());
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(0, 0, WNOHANG));
    assert_eq!(result.to_isize(), -22);
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3((-1isize) as usize, 0, 0x100));
    assert_eq!(result.to_isize(), -22);
}

#[test]
fn test_bad_status_pointer_keeps_zombie() {
    let k = Kernel::boot();
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;
    k.call(child, SYS_EXIT, SyscallArgs::with1(0));

    let unmapped = USER_HEAP_BASE + 64 * PAGE_SIZE;
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3((-1isize) as usize, unmapped, WNOHANG));
    assert_eq!(result.to_isize(), -14);
    assert_eq!(k.manager.zombies(k.root).unwrap(), vec![child]);

    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3((-1isize) as usize, 0, WNOHANG));
    assert_eq!(result, SyscallResult::Success(child as isize));
}

#[test]
fn test_execve_decodes_user_arguments() {
    let k = Kernel::boot();
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;

    let base = USER_HEAP_BASE;
    k.poke(child, base, b"/bin/prog\0");
    k.poke(child, base + 0x20, b"prog\0");
    k.poke(child, base + 0x28, b"-v\0");
    k.poke(child, base + 0x30, b"TERM=vt100\0");
    k.poke_ptrs(child, base + 0x100, &[base + 0x20, base + 0x28, 0]);
    k.poke_ptrs(child, base + 0x180, &[base + 0x30, 0]);

    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(base, base + 0x100, base + 0x180));
    assert_eq!(result, SyscallResult::Success(0));

    let regs = k.manager.context(child).unwrap();
    assert_eq!(regs.rip as usize, USER_CODE_BASE + 4);
    assert_eq!(regs.rdi, 2);
    let info = k.manager.info(child).unwrap();
    assert_eq!(info.name, "/bin/prog");
    assert_eq!(info.cmdline, "prog -v");
    let envp = k.manager.read_user_ptr_array(child, regs.rdx as usize, 4).unwrap();
    assert_eq!(k.manager.read_user_cstr(child, envp[0], 32).unwrap(), "TERM=vt100");
}

#[test]
fn test_execve_argument_errors() {
    let k = Kernel::boot();
    let base = USER_HEAP_BASE;
    k.poke(k.root, base, b"/bin/prog\0");
    k.poke_ptrs(k.root, base + 0x100, &[base, 0]);
    let child = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;
    let before = k.manager.info(child).unwrap();

    // null path, null argv, unmapped argv
    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(0, base + 0x100, 0));
    assert_eq!(result.to_isize(), -14);
    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(base, 0, 0));
    assert_eq!(result.to_isize(), -14);
    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(base, base + 64 * PAGE_SIZE, 0));
    assert_eq!(result.to_isize(), -14);

    // a single argument over the per-string ceiling
    let long = vec![b'a'; 4097];
    k.poke(child, base + PAGE_SIZE, &long);
    k.poke(child, base + PAGE_SIZE + long.len(), b"\0");
    k.poke_ptrs(child, base + 0x200, &[base + PAGE_SIZE, 0]);
    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(base, base + 0x200, 0));
    assert_eq!(result, SyscallResult::Error(KernelError::ArgumentListTooLong));

    // missing image
    k.poke(child, base + 0x300, b"/bin/none\0");
    let result = k.call(child, SYS_EXECVE, SyscallArgs::with3(base + 0x300, base + 0x100, 0));
    assert_eq!(result.to_isize(), -2);

    assert_eq!(k.manager.info(child).unwrap(), before);
}

#[test]
fn test_root_exit_is_eperm() {
    let k = Kernel::boot();
    let result = k.call(k.root, SYS_EXIT, SyscallArgs::with1(0));
    assert_eq!(result.to_isize(), -1);
}

#[test]
fn test_status_copy_failure_keeps_zombie() {
    let k = Kernel::boot_with(16, 1);
    let status_va = USER_HEAP_BASE;
    let c1 = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;
    let c2 = k.call(k.root, SYS_FORK, SyscallArgs::empty()).to_isize() as Pid;
    k.call(c1, SYS_EXIT, SyscallArgs::with1(7));

    // c2 still shares the status page; use up every free frame
    while k.manager.extend_heap(c2, PAGE_SIZE).is_ok() {}
    assert_eq!(k.frames.free_frames(), 0);

    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(c1 as usize, status_va, 0));
    assert_eq!(result, SyscallResult::Error(KernelError::OutOfMemory));
    assert_eq!(k.manager.zombies(k.root).unwrap(), vec![c1]);

    // once c2 is gone the root owns the page outright
    k.call(c2, SYS_EXIT, SyscallArgs::with1(0));
    let result = k.call(k.root, SYS_WAITPID, SyscallArgs::with3(c1 as usize, status_va, 0));
    assert_eq!(result, SyscallResult::Success(c1 as isize));
    let status = k.peek_status(k.root, status_va);
    assert!(wifexited(status));
    assert_eq!(wexitstatus(status), 7);
}
