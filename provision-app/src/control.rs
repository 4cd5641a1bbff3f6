// SPDX-License-Identifier: GPL-3.0-only

//! Shared state between the signal listener and the blocking pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{InterruptSignal, ProvisionError, Result};

const NO_SIGNAL: u8 = 0;
const SIGINT: u8 = 1;
const SIGTERM: u8 = 2;

#[derive(Debug, Default)]
struct ControlState {
    armed: AtomicBool,
    signal: AtomicU8,
}

/// Cancellation token plus the unwind arming flag.
///
/// While disarmed a signal may end the process on the spot: no device has
/// been touched yet. Once armed, a signal is only recorded and the pipeline
/// stops at its next checkpoint so teardown can run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    state: Arc<ControlState>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) {
        self.state.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.state.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed.load(Ordering::SeqCst)
    }

    /// Record a stop request. The first signal wins.
    pub fn request_stop(&self, signal: InterruptSignal) {
        let code = match signal {
            InterruptSignal::Interrupt => SIGINT,
            InterruptSignal::Terminate => SIGTERM,
        };
        let _ = self
            .state
            .signal
            .compare_exchange(NO_SIGNAL, code, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> Option<InterruptSignal> {
        match self.state.signal.load(Ordering::SeqCst) {
            SIGINT => Some(InterruptSignal::Interrupt),
            SIGTERM => Some(InterruptSignal::Terminate),
            _ => None,
        }
    }

    /// Called between stages.
    pub fn checkpoint(&self) -> Result<()> {
        match self.stop_requested() {
            Some(signal) => Err(ProvisionError::Interrupted(signal)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_reports_first_signal() {
        let control = RunControl::new();
        assert!(control.checkpoint().is_ok());

        let listener = control.clone();
        listener.request_stop(InterruptSignal::Terminate);
        listener.request_stop(InterruptSignal::Interrupt);

        assert!(matches!(
            control.checkpoint(),
            Err(ProvisionError::Interrupted(InterruptSignal::Terminate))
        ));
    }

    #[test]
    fn arming_is_shared_between_clones() {
        let control = RunControl::new();
        let listener = control.clone();
        assert!(!listener.is_armed());
        control.arm();
        assert!(listener.is_armed());
        control.disarm();
        assert!(!listener.is_armed());
    }
}
