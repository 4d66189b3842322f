//! Process system calls
//!
//! Decodes raw register arguments for the lifecycle calls. User pointers
//! (exec path, argv/envp arrays, wait status slots) are read and written
//! through the caller's address space; a bad pointer is `EFAULT`.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use nos_api::error::too_big;
use nos_api::process::WaitOutcome;
use nos_api::{ErrorContext, Result, SyscallArgs, SyscallResult};

use crate::core::dispatcher::SyscallDispatcher;
use crate::core::traits::{SyscallContext, SyscallHandler};
use crate::types::{SYS_EXECVE, SYS_EXIT, SYS_FORK, SYS_GETPID, SYS_GETPPID, SYS_WAIT, SYS_WAITPID, STATUS_SIZE};

/// Register process system call handlers
pub fn register_handlers(dispatcher: &mut SyscallDispatcher) -> Result<()> {
    dispatcher.register_handler(SYS_FORK, Box::new(ForkHandler))?;
    dispatcher.register_handler(SYS_EXECVE, Box::new(ExecveHandler))?;
    dispatcher.register_handler(SYS_WAIT, Box::new(WaitHandler))?;
    dispatcher.register_handler(SYS_WAITPID, Box::new(WaitpidHandler))?;
    dispatcher.register_handler(SYS_GETPID, Box::new(GetpidHandler))?;
    dispatcher.register_handler(SYS_EXIT, Box::new(ExitHandler))?;
    dispatcher.register_handler(SYS_GETPPID, Box::new(GetppidHandler))?;
    Ok(())
}

/// Fork system call handler
struct ForkHandler;

impl SyscallHandler for ForkHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, _args: &SyscallArgs) -> SyscallResult {
        ctx.manager
            .fork(ctx.caller)
            .map(|fork| fork.child_pid as isize)
            .into()
    }

    fn name(&self) -> &str {
        "fork"
    }

    fn id(&self) -> u32 {
        SYS_FORK
    }
}

/// Reads a NUL-terminated pointer array of strings, each at most
/// `strlen` bytes (one more is read so the ceiling check sees overruns).
fn read_string_array(ctx: &SyscallContext<'_>, va: usize, max: usize, strlen: usize) -> Result<Vec<String>> {
    let ptrs = ctx.manager.read_user_ptr_array(ctx.caller, va, max)?;
    if ptrs.len() > max {
        return Err(too_big("too many strings"));
    }
    ptrs.into_iter()
        .map(|ptr| ctx.manager.read_user_cstr(ctx.caller, ptr, strlen + 1))
        .collect()
}

/// Execve system call handler
///
/// arg0 = path, arg1 = argv, arg2 = envp (may be null).
struct ExecveHandler;

impl ExecveHandler {
    fn exec(ctx: &SyscallContext<'_>, args: &SyscallArgs) -> Result<isize> {
        let config = ctx.manager.config();
        let path = match args.arg0 {
            0 => None,
            va => Some(ctx.manager.read_user_cstr(ctx.caller, va, config.max_path_len).context("execve path")?),
        };
        // every string takes at least its terminator
        let argv = match args.arg1 {
            0 => None,
            va => Some(read_string_array(ctx, va, config.max_args_size, config.max_arg_strlen).context("execve argv")?),
        };
        let envp = read_string_array(ctx, args.arg2, config.max_env_size, config.max_env_strlen).context("execve envp")?;

        let argv_refs: Option<Vec<&str>> = argv.as_ref().map(|v| v.iter().map(String::as_str).collect());
        let envp_refs: Vec<&str> = envp.iter().map(String::as_str).collect();
        ctx.manager
            .execve(ctx.caller, path.as_deref(), argv_refs.as_deref(), &envp_refs)?;
        Ok(0)
    }
}

impl SyscallHandler for ExecveHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, args: &SyscallArgs) -> SyscallResult {
        Self::exec(ctx, args).into()
    }

    fn name(&self) -> &str {
        "execve"
    }

    fn id(&self) -> u32 {
        SYS_EXECVE
    }
}

/// Shared body of wait and waitpid. The status slot is made privately
/// writable before waiting, so neither a bad pointer nor a failed COW copy
/// can cost the caller a reaped child.
fn wait_common(ctx: &SyscallContext<'_>, pid: i32, status_va: usize, options: u32) -> SyscallResult {
    if status_va != 0 {
        if let Err(err) = ctx.manager.prepare_user_write(ctx.caller, status_va, STATUS_SIZE) {
            return err.into();
        }
    }
    match ctx.manager.waitpid(ctx.caller, pid, options) {
        Ok(WaitOutcome::Reaped { pid, status }) => {
            if status_va != 0 {
                if let Err(err) = ctx.manager.copy_to_user(ctx.caller, status_va, &status.to_le_bytes()) {
                    return err.into();
                }
            }
            SyscallResult::Success(pid as isize)
        }
        Ok(WaitOutcome::NotReady) => SyscallResult::Success(0),
        Ok(WaitOutcome::Blocked) => {
            sys_debug!("syscall: {} blocked in wait", ctx.caller);
            SyscallResult::Restart
        }
        Err(err) => err.into(),
    }
}

/// Wait system call handler
///
/// arg0 = status pointer (may be null).
struct WaitHandler;

impl SyscallHandler for WaitHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, args: &SyscallArgs) -> SyscallResult {
        wait_common(ctx, -1, args.arg0, 0)
    }

    fn name(&self) -> &str {
        "wait"
    }

    fn id(&self) -> u32 {
        SYS_WAIT
    }
}

/// Waitpid system call handler
///
/// arg0 = pid, arg1 = status pointer (may be null), arg2 = options.
struct WaitpidHandler;

impl SyscallHandler for WaitpidHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, args: &SyscallArgs) -> SyscallResult {
        wait_common(ctx, args.arg0 as i32, args.arg1, args.arg2 as u32)
    }

    fn name(&self) -> &str {
        "waitpid"
    }

    fn id(&self) -> u32 {
        SYS_WAITPID
    }
}

/// Exit system call handler
struct ExitHandler;

impl SyscallHandler for ExitHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, args: &SyscallArgs) -> SyscallResult {
        ctx.manager.exit(ctx.caller, args.arg0 as i32).map(|()| 0).into()
    }

    fn name(&self) -> &str {
        "exit"
    }

    fn id(&self) -> u32 {
        SYS_EXIT
    }
}

/// Getpid system call handler
struct GetpidHandler;

impl SyscallHandler for GetpidHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, _args: &SyscallArgs) -> SyscallResult {
        ctx.manager.getpid(ctx.caller).map(|pid| pid as isize).into()
    }

    fn name(&self) -> &str {
        "getpid"
    }

    fn id(&self) -> u32 {
        SYS_GETPID
    }
}

/// Getppid system call handler
struct GetppidHandler;

impl SyscallHandler for GetppidHandler {
    fn execute(&self, ctx: &SyscallContext<'_>, _args: &SyscallArgs) -> SyscallResult {
        ctx.manager.getppid(ctx.caller).map(|pid| pid as isize).into()
    }

    fn name(&self) -> &str {
        "getppid"
    }

    fn id(&self) -> u32 {
        SYS_GETPPID
    }
}
