//! Turns "wait for an outcome" into a suspension point.
//!
//! [`awaiting`] always suspends on its first poll, even when the result is
//! already there, so a task resumes through exactly one path: the waker
//! fired by the outcome's continuation. Tasks created with [`spawn`] are
//! polled inline by that waker, which means the rest of the body runs on
//! whichever thread called `set_value`.
//!
//! [`spawn`]: crate::spawn
use crate::error::{PanicReason, TaskError, violation};
use crate::outcome::Waiter;
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Suspends the current task until `waiter` is fulfilled, then returns its
/// value or its error at the `.await`.
///
/// ```
/// use handoff::{awaiting, make_outcome};
///
/// let (setter, waiter) = make_outcome::<u32>();
///
/// let task = handoff::spawn(async move {
///     let n = awaiting(waiter).await?;
///     anyhow::Ok(n * 2)
/// });
///
/// setter.set_value(21);
/// assert_eq!(futures::executor::block_on(task).unwrap(), 42);
/// ```
pub fn awaiting<T: Send + 'static>(waiter: Waiter<T>) -> Awaiting<T> {
    Awaiting {
        stage: Stage::Init(waiter),
    }
}

/// Future returned by [`awaiting`].
#[must_use = "futures do nothing unless polled"]
pub struct Awaiting<T> {
    stage: Stage<T>,
}

enum Stage<T> {
    /// Not polled yet.
    Init(Waiter<T>),

    /// Continuation attached, waiting to be resumed.
    Suspended(Arc<Mutex<Resume<T>>>),

    /// Result handed out.
    Done,
}

/// Shared between the suspended future and the continuation that resumes it.
struct Resume<T> {
    result: Option<Result<T, TaskError>>,
    waker: Waker,
}

impl<T: Send + 'static> Future for Awaiting<T> {
    type Output = Result<T, TaskError>;

    #[track_caller]
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match mem::replace(&mut self.stage, Stage::Done) {
            Stage::Init(waiter) => {
                let resume = Arc::new(Mutex::new(Resume {
                    result: None,
                    waker: cx.waker().clone(),
                }));

                // Record the suspension before attaching: the continuation may
                // fire synchronously if the value is already present.
                self.stage = Stage::Suspended(Arc::clone(&resume));

                waiter.on_ready(move |res| {
                    let waker = {
                        let mut resume = resume.lock();
                        resume.result = Some(res);
                        resume.waker.clone()
                    };
                    waker.wake();
                });

                Poll::Pending
            }
            Stage::Suspended(resume) => {
                let mut guard = resume.lock();
                match guard.result.take() {
                    Some(res) => Poll::Ready(res),
                    None => {
                        // Spurious poll, possibly from another executor.
                        if !guard.waker.will_wake(cx.waker()) {
                            guard.waker = cx.waker().clone();
                        }
                        drop(guard);

                        self.stage = Stage::Suspended(resume);
                        Poll::Pending
                    }
                }
            }
            Stage::Done => violation(
                PanicReason::PolledAfterReady,
                "awaiting polled after it returned Ready",
            ),
        }
    }
}

impl<T> fmt::Debug for Awaiting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            Stage::Init(_) => "init",
            Stage::Suspended(_) => "suspended",
            Stage::Done => "done",
        };
        f.debug_struct("Awaiting").field("stage", &stage).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::make_outcome;
    use crate::test_utils::*;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;
    use std::pin::pin;

    assert_impl_all!(Awaiting<u32>: Send, Unpin);

    #[test]
    fn test_always_suspends_even_if_ready() {
        let (waker, waker_data) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        let (setter, waiter) = make_outcome::<u32>();
        setter.set_value(5);

        let mut fut = pin!(awaiting(waiter));

        // The continuation fired synchronously and woke us, but the first
        // poll still suspends.
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert_eq!(waker_data.get_count(), 1);

        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(5))));
    }

    #[test]
    fn test_resumed_by_delivery() {
        let (waker, waker_data) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        let (setter, waiter) = make_outcome::<&'static str>();
        let mut fut = pin!(awaiting(waiter));

        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert_eq!(waker_data.get_count(), 0);

        setter.set_value("ok");
        assert_eq!(waker_data.get_count(), 1);
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok("ok"))));
    }

    #[test]
    fn test_error_reraised_at_suspension_point() {
        let (setter, waiter) = make_outcome::<u32>();
        setter.set_error(anyhow!("replica unavailable"));

        let res = futures::executor::block_on(async {
            let n = awaiting(waiter).await?;
            anyhow::Ok(n)
        });

        let err = res.unwrap_err();
        let err = err.downcast_ref::<TaskError>().expect("expected TaskError");
        assert!(err.is_failed());
    }

    #[test]
    fn test_spurious_poll_updates_waker() {
        let (first, first_data) = mock_waker();
        let (second, second_data) = mock_waker();

        let (setter, waiter) = make_outcome::<u32>();
        let mut fut = pin!(awaiting(waiter));

        assert!(fut.as_mut().poll(&mut Context::from_waker(&first)).is_pending());
        assert!(fut.as_mut().poll(&mut Context::from_waker(&second)).is_pending());

        setter.set_value(1);
        assert_eq!(first_data.get_count(), 0);
        assert_eq!(second_data.get_count(), 1);
    }

    #[test]
    fn test_poll_after_ready_is_a_violation() {
        let (waker, _) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        let (setter, waiter) = make_outcome::<u32>();
        setter.set_value(1);

        let mut fut = awaiting(waiter);
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut fut).poll(&mut cx).is_ready());

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = Pin::new(&mut fut).poll(&mut cx);
        }));
        assert_eq!(
            panic_reason(res.unwrap_err()),
            Some(PanicReason::PolledAfterReady)
        );
    }
}
