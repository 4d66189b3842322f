//! Unified logging support for nos-syscalls
//!
//! Syscall tracing goes through these macros so the `log` feature can be
//! switched off without sprinkling `#[cfg]` over every handler.

/// Unified trace-level logging
#[macro_export]
macro_rules! sys_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    }
}

/// Unified debug-level logging
#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    }
}

/// Unified warn-level logging
#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_in_statement_position() {
        let x = 42;
        let y = "test";
        sys_trace!("traced {} {}", x, y);
        sys_debug!("debug {}", x);
        sys_warn!("warn {}", y);
    }
}
