use crate::error::{ContractPanic, PanicReason};
use std::any::Any;
use std::thread;

// Exports
pub(crate) mod mocks;
pub(crate) use mocks::{StatusKind, counting_node, counting_task, mock_waker};

/// Extracts the violated precondition from a panic payload, if the panic was
/// raised by a contract check.
pub(crate) fn panic_reason(payload: Box<dyn Any + Send>) -> Option<PanicReason> {
    payload
        .downcast_ref::<ContractPanic>()
        .map(|panic| panic.reason)
}

/// Runs `f` on a fresh thread and returns the contract it violated.
pub(crate) fn violation_on_other_thread<F>(f: F) -> Option<PanicReason>
where
    F: FnOnce() + Send + 'static,
{
    match thread::spawn(f).join() {
        Ok(()) => None,
        Err(payload) => panic_reason(payload),
    }
}
