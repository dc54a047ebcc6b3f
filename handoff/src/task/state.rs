use crate::registry::TaskStatus;
use std::sync::atomic::{AtomicU8, Ordering};

/// Nobody is polling the task, it waits for a wake.
const IDLE: u8 = 0;

/// Some thread is polling the task right now.
const RUNNING: u8 = 1;

/// Woken while running: the polling thread must poll once more before it
/// lets go.
const NOTIFIED: u8 = 2;

/// The body returned. Terminal.
const COMPLETE: u8 = 3;

/// Lifecycle of a spawned task: `Idle -> Running <-> Notified -> Complete`.
///
/// Only the thread that won `transition_to_running` polls the future, which
/// is what makes the harness' `UnsafeCell` sound.
pub(crate) struct State(AtomicU8);

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TransitionToRunning {
    /// The caller now owns the right to poll.
    Success,

    /// Another thread is polling. It was told to poll again.
    Busy,

    /// Nothing left to poll.
    Complete,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TransitionToIdle {
    Ok,

    /// A wake arrived during the poll. The caller still owns the task and
    /// must poll again.
    OkNotified,
}

impl State {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub(crate) fn transition_to_running(&self) -> TransitionToRunning {
        let mut curr = self.0.load(Ordering::Acquire);

        loop {
            let (next, res) = match curr {
                IDLE => (RUNNING, TransitionToRunning::Success),
                RUNNING | NOTIFIED => (NOTIFIED, TransitionToRunning::Busy),
                _ => return TransitionToRunning::Complete,
            };

            match self
                .0
                .compare_exchange_weak(curr, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return res,
                Err(actual) => curr = actual,
            }
        }
    }

    /// Must only be called by the thread that owns the `Running` state.
    pub(crate) fn transition_to_idle(&self) -> TransitionToIdle {
        match self
            .0
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => TransitionToIdle::Ok,
            Err(actual) => {
                debug_assert_eq!(actual, NOTIFIED);

                // Only the running thread leaves `Notified`, no race here.
                self.0.store(RUNNING, Ordering::Release);
                TransitionToIdle::OkNotified
            }
        }
    }

    pub(crate) fn set_complete(&self) {
        self.0.store(COMPLETE, Ordering::Release);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire) == COMPLETE
    }

    pub(crate) fn status(&self) -> TaskStatus {
        match self.0.load(Ordering::Acquire) {
            IDLE => TaskStatus::Suspended,
            RUNNING | NOTIFIED => TaskStatus::Running,
            _ => TaskStatus::Complete,
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("State").field(&self.status()).finish()
    }
}
