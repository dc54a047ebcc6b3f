//! One-shot result handoff between a producer and a consumer.
//!
//! [`make_outcome`] allocates a shared cell and hands back its two ends. The
//! [`Setter`] delivers exactly one value or error, the [`Waiter`] observes it
//! either by attaching a single continuation with [`Waiter::on_ready`] or by
//! being polled directly as a future. Continuations run synchronously on the
//! thread that delivers, before the delivering call returns.
use crate::error::{PanicReason, TaskError, violation};
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

mod cell;
use cell::{Consumer, Inner};

/// Allocates a fresh outcome cell and returns its producer and consumer.
///
/// # Examples
///
/// ```
/// let (setter, waiter) = handoff::make_outcome::<u32>();
///
/// std::thread::spawn(move || setter.set_value(7));
///
/// let value = futures::executor::block_on(waiter).unwrap();
/// assert_eq!(value, 7);
/// ```
pub fn make_outcome<T: Send + 'static>() -> (Setter<T>, Waiter<T>) {
    let inner = Arc::new(Inner::new());

    let setter = Setter {
        inner: Some(Arc::clone(&inner)),
    };
    let waiter = Waiter { inner: Some(inner) };

    (setter, waiter)
}

/// Producer side of an outcome.
///
/// Delivery consumes the setter, so a second `set_value` on the same cell
/// cannot be written. Dropping a setter that never delivered resolves the
/// waiter with [`TaskError::Abandoned`].
pub struct Setter<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Setter<T> {
    /// Delivers a value. If a continuation is attached it runs right here,
    /// on the calling thread, before this returns.
    pub fn set_value(self, value: T) {
        self.deliver(Ok(value));
    }

    /// Delivers an error through the outcome's error slot.
    pub fn set_error<E>(self, err: E)
    where
        E: Into<anyhow::Error>,
    {
        self.deliver(Err(TaskError::Failed(err.into())));
    }

    pub(crate) fn deliver(mut self, res: Result<T, TaskError>) {
        if let Some(inner) = self.inner.take() {
            inner.deliver(res);
        }
    }

    /// Returns true if the waiter was dropped and nobody will observe a result.
    pub fn is_closed(&self) -> bool {
        self.inner
            .as_ref()
            .is_none_or(|inner| matches!(inner.slot.lock().consumer, Consumer::Gone))
    }
}

impl<T> Drop for Setter<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.deliver(Err(TaskError::Abandoned));
        }
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter").field("inner", &self.inner).finish()
    }
}

/// Consumer side of an outcome.
///
/// Use exactly one of: [`Waiter::on_ready`], awaiting it directly, or
/// [`Waiter::try_take`]. Mixing direct polling with `on_ready` is a
/// programming error and panics with [`PanicReason::OnReadyAfterPoll`].
pub struct Waiter<T> {
    /// Taken by `on_ready`, which hands the consumer over to the cell.
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Waiter<T> {
    /// Attaches the one continuation of this outcome.
    ///
    /// If the result is already present the callback fires immediately, on
    /// the calling thread. Otherwise it fires on whichever thread delivers.
    #[track_caller]
    pub fn on_ready<F>(mut self, callback: F)
    where
        F: FnOnce(Result<T, TaskError>) + Send + 'static,
    {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let mut slot = inner.slot.lock();

        if slot.polled {
            drop(slot);
            violation(
                PanicReason::OnReadyAfterPoll,
                "on_ready called on a waiter that was already polled",
            );
        }

        match slot.value.take() {
            Some(res) => {
                slot.consumer = Consumer::Fired;
                drop(slot);
                callback(res);
            }
            None => {
                slot.consumer = Consumer::Callback(Box::new(callback));
            }
        }
    }

    /// Returns true if the producer has delivered and the result is still
    /// waiting to be consumed.
    pub fn is_ready(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.slot.lock().value.is_some())
    }

    /// Takes the result if it is already present. Counts as direct polling.
    pub fn try_take(&mut self) -> Option<Result<T, TaskError>> {
        let mut slot = self.inner.as_ref()?.slot.lock();
        slot.polled = true;

        let res = slot.value.take();
        if res.is_some() {
            slot.consumer = Consumer::Fired;
        }
        res
    }
}

impl<T> Future for Waiter<T> {
    type Output = Result<T, TaskError>;

    #[track_caller]
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(inner) = self.inner.as_ref() else {
            return Poll::Pending;
        };
        let mut slot = inner.slot.lock();
        slot.polled = true;

        if let Some(res) = slot.value.take() {
            slot.consumer = Consumer::Fired;
            return Poll::Ready(res);
        }

        match &slot.consumer {
            Consumer::Fired => {
                drop(slot);
                violation(
                    PanicReason::PolledAfterReady,
                    "waiter polled after its result was taken",
                );
            }
            Consumer::Polling(waker) if waker.will_wake(cx.waker()) => {}
            _ => slot.consumer = Consumer::Polling(cx.waker().clone()),
        }

        Poll::Pending
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        // Gone already if `on_ready` handed the consumer to the cell.
        let Some(inner) = self.inner.take() else {
            return;
        };
        let mut slot = inner.slot.lock();
        let value = slot.value.take();
        let consumer = mem::replace(&mut slot.consumer, Consumer::Gone);
        drop(slot);

        // Run user destructors outside the lock.
        drop(value);
        drop(consumer);
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("inner", &self.inner).finish()
    }
}
