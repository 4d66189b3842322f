//! Saved user CPU context
//!
//! The register file a process resumes with. Only the parts the lifecycle
//! core touches have named accessors; the layout follows x86_64.

/// User code segment selector
pub const USER_CODE_SEGMENT: u64 = 0x18;
/// User data/stack segment selector
pub const USER_DATA_SEGMENT: u64 = 0x20;
/// RFLAGS for a fresh user context: IF set plus the reserved bit 1
pub const USER_RFLAGS: u64 = 0x202;

/// Saved CPU context
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
    pub cs: u64,
    pub ss: u64,
}

impl CpuContext {
    pub const fn new() -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            rsp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
            rflags: 0,
            cs: 0,
            ss: 0,
        }
    }

    /// Context for entering a freshly loaded image.
    ///
    /// `argc`, `argv` and `envp` are also passed in the first three
    /// argument registers.
    pub const fn user_entry(entry: usize, sp: usize, argc: usize, argv: usize, envp: usize) -> Self {
        let mut ctx = Self::new();
        ctx.rip = entry as u64;
        ctx.rsp = sp as u64;
        ctx.rdi = argc as u64;
        ctx.rsi = argv as u64;
        ctx.rdx = envp as u64;
        ctx.cs = USER_CODE_SEGMENT;
        ctx.ss = USER_DATA_SEGMENT;
        ctx.rflags = USER_RFLAGS;
        ctx
    }

    /// Syscall return value register
    pub const fn return_value(&self) -> i64 {
        self.rax as i64
    }

    /// Overrides the syscall return value register
    pub fn set_return_value(&mut self, value: i64) {
        self.rax = value as u64;
    }

    /// Instruction pointer
    pub const fn instruction_pointer(&self) -> usize {
        self.rip as usize
    }

    /// Stack pointer
    pub const fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }
}
