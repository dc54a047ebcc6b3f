use crate::error::TaskError;
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::task::Waker;

pub(crate) type Callback<T> = Box<dyn FnOnce(Result<T, TaskError>) + Send + 'static>;

/// Who, if anyone, is waiting on the other end of the cell.
pub(super) enum Consumer<T> {
    /// Nobody registered interest yet.
    Idle,

    /// The waiter is being polled directly as a future.
    Polling(Waker),

    /// A continuation attached with `on_ready`, fired on delivery.
    Callback(Callback<T>),

    /// The continuation already ran, or the value was taken by a poll.
    Fired,

    /// The waiter was dropped. Any delivered value is discarded.
    Gone,
}

pub(super) struct Slot<T> {
    pub(super) value: Option<Result<T, TaskError>>,

    pub(super) consumer: Consumer<T>,

    /// Set once the producer delivered, whether or not the value was taken.
    pub(super) delivered: bool,

    /// Set once the waiter was polled directly. `on_ready` is forbidden after.
    pub(super) polled: bool,
}

/// The shared, single-assignment cell behind a `Setter`/`Waiter` pair.
///
/// Both handles hold an `Arc` to it; the cell is freed once both are gone.
pub(crate) struct Inner<T> {
    pub(super) slot: Mutex<Slot<T>>,
}

impl<T> Inner<T> {
    pub(super) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                consumer: Consumer::Idle,
                delivered: false,
                polled: false,
            }),
        }
    }

    /// Stores the result, then fires whatever consumer is registered. The
    /// continuation and waker always run after the lock is released, on the
    /// calling thread.
    pub(super) fn deliver(&self, res: Result<T, TaskError>) {
        let mut slot = self.slot.lock();
        debug_assert!(!slot.delivered, "outcome delivered twice");
        slot.delivered = true;

        match mem::replace(&mut slot.consumer, Consumer::Idle) {
            Consumer::Idle => {
                slot.value = Some(res);
            }
            Consumer::Polling(waker) => {
                slot.value = Some(res);
                slot.consumer = Consumer::Polling(waker.clone());
                drop(slot);
                waker.wake();
            }
            Consumer::Callback(callback) => {
                slot.consumer = Consumer::Fired;
                drop(slot);
                callback(res);
            }
            consumer @ (Consumer::Fired | Consumer::Gone) => {
                slot.consumer = consumer;
                drop(slot);
                drop(res);
            }
        }
    }
}

impl<T> fmt::Debug for Inner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        let consumer = match slot.consumer {
            Consumer::Idle => "idle",
            Consumer::Polling(_) => "polling",
            Consumer::Callback(_) => "callback",
            Consumer::Fired => "fired",
            Consumer::Gone => "gone",
        };

        f.debug_struct("Inner")
            .field("ready", &slot.value.is_some())
            .field("delivered", &slot.delivered)
            .field("consumer", &consumer)
            .finish()
    }
}
