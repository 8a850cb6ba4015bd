//! The interaction gate: one process-wide flag shared with the SIGINT handler.
//!
//! Transitions:
//! - false → true on the first interrupt, or at startup with `--interactive-start`
//! - true → false once the user's splice has been queued
//! - an interrupt while already true terminates the process with status 130

use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the signal handler, cleared by the loop.
pub static IS_INTERACTING: AtomicBool = AtomicBool::new(false);

/// Exit status for a second interrupt during a splice.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// What an interrupt means given the current gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The gate was closed; the loop will open a splice at its next check.
    Splice,
    /// A splice was already pending or open.
    Terminate,
}

/// Handle to an interaction flag.
///
/// [`InteractionGate::global`] refers to the flag the signal handler writes.
/// [`InteractionGate::detached`] gives a private flag, so tests do not race
/// each other through the process-wide one.
#[derive(Debug, Clone, Copy)]
pub struct InteractionGate {
    flag: &'static AtomicBool,
}

impl InteractionGate {
    pub fn global() -> Self {
        Self {
            flag: &IS_INTERACTING,
        }
    }

    pub fn detached() -> Self {
        Self {
            flag: Box::leak(Box::new(AtomicBool::new(false))),
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a splice at the next safe point.
    pub fn open(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Mark the splice as consumed.
    pub fn close(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Record an interrupt. Only an atomic swap, so it is safe from a signal handler.
    pub fn on_interrupt(&self) -> Interrupt {
        if self.flag.swap(true, Ordering::SeqCst) {
            Interrupt::Terminate
        } else {
            Interrupt::Splice
        }
    }
}

#[cfg(unix)]
extern "C" fn handle_sigint(_signo: libc::c_int) {
    if InteractionGate::global().on_interrupt() == Interrupt::Terminate {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(INTERRUPT_EXIT_CODE) }
    }
}

/// Route SIGINT to the global gate.
///
/// Installed without `SA_RESTART`. A blocked stdin read is retried by the
/// standard library, so the splice it belongs to still completes.
#[cfg(unix)]
pub fn install_sigint_handler() -> crate::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only touches an atomic and calls _exit.
    unsafe { sigaction(Signal::SIGINT, &action) }.map_err(|e| {
        crate::GenerateError::Config(format!("cannot install SIGINT handler: {}", e))
    })?;
    tracing::debug!("SIGINT handler installed");
    Ok(())
}

/// Without signals the gate is only opened by `--interactive-start`.
#[cfg(not(unix))]
pub fn install_sigint_handler() -> crate::Result<()> {
    Ok(())
}
