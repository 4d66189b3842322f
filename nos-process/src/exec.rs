//! Program execution
//!
//! Exec runs in three phases:
//!
//! 1. Validate the path and the argument and environment strings. Nothing
//!    is touched if this fails.
//! 2. Stage the new image in a fresh address space: load the program and
//!    lay out the initial stack. The caller still runs its old image, so
//!    a loader failure here is reported like a validation failure.
//! 3. Commit under the table lock: swap the address space, close
//!    close-on-exec descriptors, reset signal dispositions and install the
//!    entry context. The old space is released afterwards.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use nos_api::error::{bad_address, no_process, too_big};
use nos_api::{KernelError, Pid, Result};
use nos_memory_management::{
    page_round_down, Access, AddressSpace, FrameTable, MemoryRegions, PteFlags, USER_HEAP_BASE, USER_STACK_SIZE,
    USER_STACK_TOP,
};
use spin::Mutex;

use crate::config::ProcessConfig;
use crate::context::CpuContext;
use crate::loader::LoadedImage;
use crate::manager::ProcessManager;
use crate::pcb::bounded;

const WORD: usize = core::mem::size_of::<u64>();

/// State of the process an exec replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSnapshot {
    pub name: String,
    pub cmdline: String,
    pub entry_point: usize,
    pub context: CpuContext,
}

/// Validated exec parameters and the resulting image layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    pub path: String,
    pub argc: usize,
    pub envc: usize,
    /// Bytes of argument strings, terminators included
    pub args_size: usize,
    /// Bytes of environment strings, terminators included
    pub env_size: usize,
    pub entry_point: usize,
    pub stack_base: usize,
    pub stack_pointer: usize,
    pub heap_base: usize,
    /// What the process looked like before the exec
    pub previous: Option<ExecSnapshot>,
}

/// Sums `len + 1` over `strings`, enforcing both ceilings.
fn measure(strings: &[&str], max_len: usize, max_total: usize, what: &str) -> Result<usize> {
    let mut total = 0usize;
    for s in strings {
        if s.len() > max_len {
            return Err(too_big(what));
        }
        total += s.len() + 1;
        if total > max_total {
            return Err(too_big(what));
        }
    }
    Ok(total)
}

impl ExecContext {
    /// Checks exec arguments against `config`. Pure: no process state is read.
    ///
    /// A missing path or argv is `EFAULT`; an empty path or one of
    /// `max_path_len` bytes or more is `ENAMETOOLONG`; an oversized string
    /// or aggregate is `E2BIG`.
    pub fn validate(config: &ProcessConfig, path: Option<&str>, argv: Option<&[&str]>, envp: &[&str]) -> Result<Self> {
        let path = path.ok_or_else(|| bad_address(0))?;
        let argv = argv.ok_or_else(|| bad_address(0))?;
        if path.is_empty() || path.len() >= config.max_path_len {
            return Err(KernelError::NameTooLong.into());
        }
        let args_size = measure(argv, config.max_arg_strlen, config.max_args_size, "argument list too long")?;
        let env_size = measure(envp, config.max_env_strlen, config.max_env_size, "environment too long")?;
        Ok(Self {
            path: String::from(path),
            argc: argv.len(),
            envc: envp.len(),
            args_size,
            env_size,
            entry_point: 0,
            stack_base: USER_STACK_TOP - USER_STACK_SIZE,
            stack_pointer: 0,
            heap_base: USER_HEAP_BASE,
            previous: None,
        })
    }
}

/// Addresses produced by [`build_user_stack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    /// Initial stack pointer; `argc` lives here
    pub sp: usize,
    /// Address of `argv[0]`
    pub argv: usize,
    /// Address of `envp[0]`
    pub envp: usize,
}

/// Lays out the initial user stack below `USER_STACK_TOP`:
///
/// ```text
/// top   -> argument and environment strings, NUL terminated
///          (padding to 16 bytes)
///          envp[envc] = 0
///          envp[0..envc]
///          argv[argc] = 0
///          argv[0..argc]
/// sp    -> argc
/// ```
pub fn build_user_stack(space: &mut AddressSpace, frames: &FrameTable, argv: &[&str], envp: &[&str]) -> Result<StackLayout> {
    let strings_len: usize = argv.iter().chain(envp).map(|s| s.len() + 1).sum();
    let words = 1 + argv.len() + 1 + envp.len() + 1;
    let strings_base = USER_STACK_TOP
        .checked_sub(strings_len)
        .ok_or_else(|| too_big("stack overflow"))?;
    let sp = strings_base
        .checked_sub(words * WORD)
        .ok_or_else(|| too_big("stack overflow"))?
        & !0xf;
    if USER_STACK_TOP - sp > USER_STACK_SIZE {
        return Err(too_big("arguments do not fit on the stack"));
    }

    let first_page = page_round_down(sp);
    space.map_range(frames, first_page, USER_STACK_TOP - first_page, PteFlags::USER_DATA)?;

    let mut strings = Vec::with_capacity(strings_len);
    let mut pointers = Vec::with_capacity(words);
    pointers.push(argv.len());
    for list in [argv, envp] {
        for s in list {
            pointers.push(strings_base + strings.len());
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
        }
        pointers.push(0);
    }
    space.write_bytes(frames, strings_base, &strings, Access::Kernel)?;

    let block: Vec<u8> = pointers.iter().flat_map(|&p| (p as u64).to_le_bytes()).collect();
    space.write_bytes(frames, sp, &block, Access::Kernel)?;

    log::trace!(
        "exec: stack sp={:#x} argc={} envc={} strings={} bytes",
        sp,
        argv.len(),
        envp.len(),
        strings_len
    );
    Ok(StackLayout {
        sp,
        argv: sp + WORD,
        envp: sp + WORD * (argv.len() + 2),
    })
}

impl ProcessManager {
    /// Replaces the image of `caller` with the program at `path`.
    ///
    /// On success the caller resumes at the new entry point; the returned
    /// context describes the new image and what it replaced. On failure
    /// the caller is unchanged.
    pub fn execve(&self, caller: Pid, path: Option<&str>, argv: Option<&[&str]>, envp: &[&str]) -> Result<ExecContext> {
        self.stats.exec_attempt();
        let result = self.exec_staged(caller, path, argv, envp);
        self.stats.exec_result(result.is_ok());
        match &result {
            Ok(ctx) => log::info!(
                "process: {} exec {} (argc={}, entry={:#x})",
                caller,
                ctx.path,
                ctx.argc,
                ctx.entry_point
            ),
            Err(err) => log::warn!("process: exec by {} failed: {}", caller, err),
        }
        result
    }

    fn stage_image(&self, space: &mut AddressSpace, path: &str, argv: &[&str], envp: &[&str]) -> Result<(LoadedImage, StackLayout)> {
        let image = self.loader.load(path, space, &self.frames)?;
        let stack = build_user_stack(space, &self.frames, argv, envp)?;
        space.set_regions(MemoryRegions::standard(image.code_end));
        Ok((image, stack))
    }

    fn exec_staged(&self, caller: Pid, path: Option<&str>, argv: Option<&[&str]>, envp: &[&str]) -> Result<ExecContext> {
        let mut ctx = ExecContext::validate(&self.config, path, argv, envp)?;
        let argv = argv.unwrap_or_default();

        let handle = {
            let table = self.table.lock();
            let index = table.live_index(caller)?;
            table.handle_at(index)
        };

        let mut space = AddressSpace::new(&self.frames)?;
        let (image, stack) = match self.stage_image(&mut space, &ctx.path, argv, envp) {
            Ok(staged) => staged,
            Err(err) => {
                space.teardown(&self.frames);
                return Err(err);
            }
        };
        ctx.entry_point = image.entry;
        ctx.stack_pointer = stack.sp;

        let cmdline = if argv.is_empty() { ctx.path.clone() } else { argv.join(" ") };

        let old_space = {
            let mut table = self.table.lock();
            let Some(proc) = table.get_mut(handle).filter(|proc| proc.is_alive()) else {
                // exited while the image was being staged
                space.teardown(&self.frames);
                return Err(no_process(caller));
            };

            ctx.previous = Some(ExecSnapshot {
                name: proc.name.clone(),
                cmdline: proc.cmdline.clone(),
                entry_point: proc.entry_point,
                context: proc.context,
            });

            let old = proc.space.replace(Arc::new(Mutex::new(space)));
            let closed = proc.fds.close_on_exec();
            proc.signals.reset_for_exec();
            proc.name = bounded(&ctx.path, self.config.max_name_len);
            proc.cmdline = bounded(&cmdline, self.config.max_cmdline_len);
            proc.entry_point = image.entry;
            proc.context = CpuContext::user_entry(image.entry, stack.sp, ctx.argc, stack.argv, stack.envp);
            log::debug!("exec: {} closed {} close-on-exec descriptors", caller, closed);
            old
        };

        if let Some(old) = old_space {
            let released = old.lock().teardown(&self.frames);
            log::debug!("exec: {} released {} old pages", caller, released);
        }
        Ok(ctx)
    }
}
