//! Per-process signal dispositions
//!
//! Only the state the lifecycle touches lives here: what fork inherits and
//! what exec resets. Delivery belongs to the signal layer.

use nos_api::error::invalid_argument;
use nos_api::process::signal::{NSIG, SIGKILL, SIGSTOP};
use nos_api::{Result, Signal};

/// What to do when a signal arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigAction {
    /// Default action for the signal
    #[default]
    Default,
    /// Discard the signal
    Ignore,
    /// Run the user handler at this address
    Handler(usize),
}

/// Dispositions, blocked mask and pending set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalState {
    actions: [SigAction; NSIG],
    mask: u32,
    pending: u32,
}

fn bit(sig: Signal) -> Result<u32> {
    if sig == 0 || sig as usize >= NSIG {
        return Err(invalid_argument("signal number out of range"));
    }
    Ok(1 << sig)
}

impl SignalState {
    /// All default, nothing blocked or pending
    pub const fn new() -> Self {
        Self {
            actions: [SigAction::Default; NSIG],
            mask: 0,
            pending: 0,
        }
    }

    /// Disposition of `sig`
    pub fn action(&self, sig: Signal) -> Result<SigAction> {
        bit(sig)?;
        Ok(self.actions[sig as usize])
    }

    /// Installs a disposition, returning the previous one.
    /// SIGKILL and SIGSTOP cannot be caught or ignored.
    pub fn set_action(&mut self, sig: Signal, action: SigAction) -> Result<SigAction> {
        bit(sig)?;
        if sig == SIGKILL || sig == SIGSTOP {
            return Err(invalid_argument("SIGKILL and SIGSTOP cannot be changed"));
        }
        Ok(core::mem::replace(&mut self.actions[sig as usize], action))
    }

    /// Marks `sig` pending
    pub fn raise(&mut self, sig: Signal) -> Result<()> {
        self.pending |= bit(sig)?;
        Ok(())
    }

    /// Pending set as a bitmask
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Blocked mask
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Replaces the blocked mask, returning the old one
    pub fn set_mask(&mut self, mask: u32) -> u32 {
        core::mem::replace(&mut self.mask, mask)
    }

    /// State a forked child starts with: dispositions and mask are
    /// inherited, nothing is pending.
    pub fn fork_copy(&self) -> Self {
        Self {
            actions: self.actions,
            mask: self.mask,
            pending: 0,
        }
    }

    /// Exec reset: handlers revert to default, ignored signals stay
    /// ignored, pending signals are dropped, the mask is kept.
    pub fn reset_for_exec(&mut self) {
        for action in self.actions.iter_mut() {
            if *action != SigAction::Ignore {
                *action = SigAction::Default;
            }
        }
        self.pending = 0;
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}
