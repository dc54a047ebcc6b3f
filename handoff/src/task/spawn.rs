use crate::context;
use crate::error::{ContractPanic, RegistryError, TaskError};
use crate::outcome::{Setter, Waiter, make_outcome};
use crate::registry::TrackedTask;
use crate::task::raw::{RawTask, ReclaimHook, SpawnedTask};
use crate::task::{Id, TaskOutput};
use crate::utils::panic_message;
use futures::FutureExt;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;

type Value<F> = <<F as Future>::Output as TaskOutput>::Value;

/// Starts `fut` as a tracked task on the calling thread and returns the
/// consumer of its result.
///
/// The body runs right away, synchronously, until its first suspension point.
/// It resumes on whichever thread fulfils the outcome it awaits. When it
/// finishes, its value or error is delivered through the returned [`Waiter`],
/// then the task tears itself down and retires its node from the calling
/// thread's registry.
///
/// Errors and panics raised by the body come out of the waiter as
/// [`TaskError`]. Contract violations are the exception: they keep unwinding
/// into whichever thread was polling the body, and the waiter resolves with
/// [`TaskError::Abandoned`].
#[track_caller]
pub fn spawn<F>(fut: F) -> Waiter<Value<F>>
where
    F: Future + Send + 'static,
    F::Output: TaskOutput,
{
    SpawnBuilder::new().spawn(fut)
}

pub fn spawn_builder() -> SpawnBuilder {
    SpawnBuilder::new()
}

/// Configures a task before spawning it.
///
/// ```
/// let waiter = handoff::spawn_builder()
///     .with_tag("warmup")
///     .spawn(async { anyhow::Ok(3) });
///
/// assert_eq!(futures::executor::block_on(waiter).unwrap(), 3);
/// ```
#[derive(Default)]
pub struct SpawnBuilder {
    tag: Option<&'static str>,
    on_reclaim: Option<ReclaimHook>,
}

impl SpawnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbolic name shown next to the source location in diagnostics.
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Runs `hook` when the task's node is reclaimed, which normally happens
    /// on the spawning thread during `collect`. If the task cannot be
    /// tracked the hook runs before the body starts, or not at all when the
    /// thread context is already gone.
    pub fn on_reclaim<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_reclaim = Some(Box::new(hook));
        self
    }

    /// Spawns the task. If the calling thread cannot track it, because its
    /// registry is closed or its context is being torn down, the task still
    /// runs but stays invisible to diagnostics.
    #[track_caller]
    pub fn spawn<F>(self, fut: F) -> Waiter<Value<F>>
    where
        F: Future + Send + 'static,
        F::Output: TaskOutput,
    {
        let location = Location::caller();
        let (raw, waiter) = new_task(fut);

        if let Err(err) = self.track(&raw, location) {
            tracing::warn!(task = %raw.id(), %location, %err, "task running untracked");
        }

        raw.run();
        waiter
    }

    /// Spawns the task only if it can be tracked.
    ///
    /// # Errors
    ///
    /// Returns the registry error without running anything. The body is
    /// dropped unpolled.
    #[track_caller]
    pub fn try_spawn<F>(self, fut: F) -> Result<Waiter<Value<F>>, RegistryError>
    where
        F: Future + Send + 'static,
        F::Output: TaskOutput,
    {
        let location = Location::caller();
        let (raw, waiter) = new_task(fut);

        self.track(&raw, location)?;

        raw.run();
        Ok(waiter)
    }

    fn track(
        self,
        raw: &Arc<RawTask>,
        location: &'static Location<'static>,
    ) -> Result<(), RegistryError> {
        let kind = Box::new(SpawnedTask {
            raw: Arc::clone(raw),
            on_reclaim: self.on_reclaim,
        });

        let mut node = TrackedTask::with_id(raw.id(), kind, location);
        if let Some(tag) = self.tag {
            node = node.with_tag(tag);
        }

        context::with_registry(|registry| {
            let task_ref = registry.add(node)?;
            raw.track(registry, task_ref);
            Ok(())
        })?
    }
}

impl fmt::Debug for SpawnBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnBuilder")
            .field("tag", &self.tag)
            .field("on_reclaim", &self.on_reclaim.is_some())
            .finish()
    }
}

fn new_task<F>(fut: F) -> (Arc<RawTask>, Waiter<Value<F>>)
where
    F: Future + Send + 'static,
    F::Output: TaskOutput,
{
    let id = Id::next();
    let (setter, waiter) = make_outcome();

    let raw = RawTask::new(id, body(id, fut, setter).boxed());
    (raw, waiter)
}

/// Wraps the user's future: captures its result, or its panic, and delivers
/// it through `setter`. Contract violations are re-raised, never delivered.
async fn body<F>(id: Id, fut: F, setter: Setter<Value<F>>)
where
    F: Future + Send + 'static,
    F::Output: TaskOutput,
{
    let res = match AssertUnwindSafe(fut).catch_unwind().await {
        // An outcome error re-raised with `?` keeps its original kind.
        Ok(output) => output
            .into_result()
            .map_err(|err| err.downcast::<TaskError>().unwrap_or_else(TaskError::Failed)),
        Err(payload) if payload.is::<ContractPanic>() => panic::resume_unwind(payload),
        Err(payload) => Err(TaskError::Panic(panic_message(&*payload))),
    };

    match &res {
        Ok(_) => tracing::debug!(task = %id, "task finished"),
        Err(err) => tracing::debug!(task = %id, %err, "task failed"),
    }

    setter.deliver(res);
}
