//! Pause gate
//!
//! The run loop calls [`PauseGate::wait`] before each step. While the gate is
//! open the call returns immediately; while paused it parks until a resume,
//! a single-step release, or cancellation. Control-surface methods (pause,
//! resume, step) are synchronous and safe to call from any task.

use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

/// Why a paused waiter was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRelease {
    /// The gate is open; run freely.
    Resumed,
    /// Released for exactly one step; the gate stays closed.
    SingleStep,
    /// The run was cancelled while parked.
    Cancelled,
}

#[derive(Default)]
struct GateFlags {
    paused: bool,
    single_step: bool,
    cancelled: bool,
}

#[derive(Default)]
pub struct PauseGate {
    flags: Mutex<GateFlags>,
    notify: Notify,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let mut flags = self.flags.lock().unwrap();
        if !flags.paused {
            debug!("pause gate closed");
            flags.paused = true;
        }
    }

    pub fn resume(&self) {
        {
            let mut flags = self.flags.lock().unwrap();
            flags.paused = false;
            flags.single_step = false;
        }
        debug!("pause gate opened");
        self.notify.notify_waiters();
    }

    /// Release one waiter for one step without opening the gate.
    pub fn step_once(&self) {
        self.flags.lock().unwrap().single_step = true;
        self.notify.notify_waiters();
    }

    /// Wake every waiter with [`GateRelease::Cancelled`]. Sticky until
    /// [`PauseGate::reset`].
    pub fn cancel(&self) {
        self.flags.lock().unwrap().cancelled = true;
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.flags.lock().unwrap().paused
    }

    /// Reopen the gate and clear every flag, ready for the next run.
    pub fn reset(&self) {
        let mut flags = self.flags.lock().unwrap();
        *flags = GateFlags::default();
    }

    /// Park until the gate permits the next step.
    pub async fn wait(&self) -> GateRelease {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flags so a notify between the
            // check and the await cannot be lost.
            notified.as_mut().enable();
            {
                let mut flags = self.flags.lock().unwrap();
                if flags.cancelled {
                    return GateRelease::Cancelled;
                }
                if !flags.paused {
                    return GateRelease::Resumed;
                }
                if flags.single_step {
                    flags.single_step = false;
                    return GateRelease::SingleStep;
                }
            }
            notified.await;
        }
    }
}
