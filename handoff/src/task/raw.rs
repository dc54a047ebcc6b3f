use crate::registry::{TaskKind, TaskRef, TaskStatus, ThreadRegistry};
use crate::task::Id;
use crate::task::state::{State, TransitionToIdle, TransitionToRunning};
use crate::utils::ScopeGuard;
use futures::future::BoxFuture;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::task::{Context, Poll, Wake, Waker};

/// Where a task's node lives, used to retire it on completion.
struct Tracking {
    /// Weak so that a task outliving its thread never keeps the registry
    /// alive, and so that node -> task -> registry is not a cycle.
    registry: Weak<ThreadRegistry>,
    node: TaskRef,
}

pub(crate) struct Header {
    pub(crate) id: Id,

    pub(crate) state: State,

    /// Number of times the future was polled.
    polls: AtomicU64,

    /// Unset for tasks running untracked.
    tracking: OnceLock<Tracking>,
}

/// Control block of a spawned task.
///
/// There is no executor: the task's waker polls it inline, on whichever
/// thread calls `wake`. Resuming after `set_value` therefore runs the rest of
/// the body on the producer's thread.
pub(crate) struct RawTask {
    header: Header,

    /// Dropped as soon as the body returns, which tears down every local the
    /// body still held.
    future: UnsafeCell<Option<BoxFuture<'static, ()>>>,
}

// Safety: `future` is only accessed by the thread that owns the `Running`
// state, handed out one thread at a time by `State`.
unsafe impl Sync for RawTask {}

impl RawTask {
    pub(crate) fn new(id: Id, future: BoxFuture<'static, ()>) -> Arc<Self> {
        Arc::new(Self {
            header: Header {
                id,
                state: State::new(),
                polls: AtomicU64::new(0),
                tracking: OnceLock::new(),
            },
            future: UnsafeCell::new(Some(future)),
        })
    }

    pub(crate) fn id(&self) -> Id {
        self.header.id
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.header.state.status()
    }

    pub(crate) fn polls(&self) -> u64 {
        self.header.polls.load(Ordering::Relaxed)
    }

    /// Records the node to retire on completion. Must happen before the first
    /// poll.
    pub(crate) fn track(&self, registry: &Arc<ThreadRegistry>, node: TaskRef) {
        let tracking = Tracking {
            registry: Arc::downgrade(registry),
            node,
        };

        if self.header.tracking.set(tracking).is_err() {
            debug_assert!(false, "task {} tracked twice", self.id());
        }
    }

    /// Polls the task on the calling thread until it suspends or completes.
    /// A no-op if another thread is polling it, that thread polls again.
    pub(crate) fn run(self: &Arc<Self>) {
        match self.header.state.transition_to_running() {
            TransitionToRunning::Success => {}
            TransitionToRunning::Busy | TransitionToRunning::Complete => return,
        }

        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);

        loop {
            // Contract violations unwind out of the body, and so can the
            // continuations it triggers on delivery.
            let mut guard = ScopeGuard::new(|| self.complete());

            self.header.polls.fetch_add(1, Ordering::Relaxed);

            // Safety: we own the `Running` state.
            let res = unsafe { self.poll_future(&mut cx) };
            guard.disarm();

            match res {
                Poll::Ready(()) => {
                    self.complete();
                    return;
                }
                Poll::Pending => match self.header.state.transition_to_idle() {
                    TransitionToIdle::Ok => return,
                    TransitionToIdle::OkNotified => continue,
                },
            }
        }
    }

    /// # Safety
    ///
    /// The caller must own the `Running` state.
    unsafe fn poll_future(&self, cx: &mut Context<'_>) -> Poll<()> {
        match unsafe { &mut *self.future.get() } {
            Some(future) => future.as_mut().poll(cx),
            None => Poll::Ready(()),
        }
    }

    /// Drops the body, then retires the node from the completing thread.
    fn complete(&self) {
        // Safety: only the thread owning `Running` gets here.
        let future = unsafe { (*self.future.get()).take() };
        self.header.state.set_complete();
        drop(future);

        tracing::trace!(task = %self.id(), polls = self.polls(), "task complete");

        if let Some(Tracking { registry, node }) = self.header.tracking.get()
            && let Some(registry) = registry.upgrade()
        {
            registry.retire(*node);
        }
    }
}

impl Wake for RawTask {
    fn wake(self: Arc<Self>) {
        self.run();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.run();
    }
}

impl fmt::Debug for RawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTask")
            .field("id", &self.header.id)
            .field("state", &self.header.state)
            .field("polls", &self.polls())
            .field("tracked", &self.header.tracking.get().is_some())
            .finish()
    }
}

pub(crate) type ReclaimHook = Box<dyn FnOnce() + Send + 'static>;

/// Registry node kind of a spawned task.
pub(crate) struct SpawnedTask {
    pub(crate) raw: Arc<RawTask>,
    pub(crate) on_reclaim: Option<ReclaimHook>,
}

impl TaskKind for SpawnedTask {
    fn status(&self) -> TaskStatus {
        self.raw.status()
    }

    fn finalize(self: Box<Self>) {
        tracing::trace!(task = %self.raw.id(), "task reclaimed");

        if let Some(hook) = self.on_reclaim {
            hook();
        }
    }
}
