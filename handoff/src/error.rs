use crate::registry::RegistryId;
use std::fmt;
use std::panic::Location;

/// Failure delivered through the error slot of an outcome.
///
/// Whatever consumes a [`Waiter`] observes these exactly like a value: the
/// body of a task never unwinds across a suspension point.
///
/// [`Waiter`]: crate::Waiter
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// The computation returned an error, or a producer called `set_error`.
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),

    /// The computation panicked while being polled.
    #[error("task panicked: {0}")]
    Panic(String),

    /// The producer was dropped before it delivered anything.
    #[error("outcome abandoned before a result was delivered")]
    Abandoned,
}

impl TaskError {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskError::Failed(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panic(_))
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, TaskError::Abandoned)
    }
}

/// Recoverable failures when tracking a new task.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry was closed because its owning thread is exiting.
    #[error("registry {0} is closed")]
    Closed(RegistryId),

    /// The thread-local context was already torn down on this thread.
    #[error("thread context unavailable, the thread is shutting down")]
    NoContext,
}

/// Precondition that was violated. Every variant is a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanicReason {
    /// `add` called on a thread that does not own the registry.
    AddOffOwner,
    /// `collect` called on a thread that does not own the registry.
    CollectOffOwner,
    /// `close` called on a thread that does not own the registry.
    CloseOffOwner,
    /// `retire` called with a task that belongs to another registry.
    ForeignTask,
    /// `retire` called with a task that was already reclaimed.
    StaleTask,
    /// `on_ready` called on a waiter that was already polled directly.
    OnReadyAfterPoll,
    /// A future was polled again after it returned `Ready`.
    PolledAfterReady,
}

/// Panic payload raised through [`std::panic::panic_any`] when a
/// precondition is violated. Tests downcast to it to check the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractPanic {
    pub reason: PanicReason,
    pub msg: String,
    pub location: &'static Location<'static>,
}

impl fmt::Display for ContractPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}: {}", self.reason, self.location, self.msg)
    }
}

/// Fails fast on a violated precondition. Tolerating any of these would let a
/// node be freed twice or be read after it was freed.
#[cold]
#[track_caller]
pub(crate) fn violation(reason: PanicReason, msg: impl Into<String>) -> ! {
    let payload = ContractPanic {
        reason,
        msg: msg.into(),
        location: Location::caller(),
    };

    tracing::error!(reason = ?payload.reason, location = %payload.location, "{}", payload.msg);
    std::panic::panic_any(payload)
}
