//! Per-thread registry of live suspendable computations.
//!
//! Insertion and physical reclamation are confined to the owning thread.
//! Enumeration and retirement may come from any thread. All of them take the
//! same mutex, so a node is never observed half-unlinked and never freed
//! while an enumeration is walking the list.
use crate::context::RegistryConfig;
use crate::diagnostics;
use crate::error::{PanicReason, RegistryError, violation};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

mod id;
pub use id::RegistryId;

mod list;
use list::{Reclaimed, TaskList};

mod node;
pub use node::{TaskKind, TaskRef, TaskSnapshot, TaskStatus, TrackedTask};


pub struct ThreadRegistry {
    id: RegistryId,

    owner: ThreadId,

    /// Name of the owning thread, for diagnostics only.
    owner_name: Option<String>,

    /// Retired nodes that trigger a sweep on the next `add`.
    collect_threshold: Option<usize>,

    list: Mutex<TaskList>,
}

impl ThreadRegistry {
    /// Creates a registry owned by the calling thread.
    pub fn new() -> Arc<Self> {
        Self::with_config(&RegistryConfig::default())
    }

    pub fn with_config(cfg: &RegistryConfig) -> Arc<Self> {
        let current = thread::current();

        let registry = Arc::new(Self {
            id: RegistryId::next(),
            owner: current.id(),
            owner_name: current.name().map(str::to_owned),
            collect_threshold: cfg.collect_threshold,
            list: Mutex::new(TaskList::new()),
        });

        diagnostics::register(&registry);
        tracing::trace!(registry = %registry.id, owner = ?registry.owner, "registry created");

        registry
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    /// Returns true when called from the owning thread.
    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Links `task` at the head of the list and takes ownership of it.
    ///
    /// # Panics
    ///
    /// Panics with [`PanicReason::AddOffOwner`] when called from any thread
    /// other than the owner.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Closed`] once the registry was closed. The node
    /// is finalized before returning since the caller gave up ownership.
    #[track_caller]
    pub fn add(&self, task: TrackedTask) -> Result<TaskRef, RegistryError> {
        self.assert_owner(PanicReason::AddOffOwner, "add");

        if self.should_sweep() {
            self.collect_unchecked();
        }

        let mut task = Box::new(task);
        task.registry = Some(self.id);
        task.retired = false;

        let task_ref = TaskRef {
            registry: self.id,
            id: task.id,
        };

        let mut list = self.list.lock();
        if list.closed {
            drop(list);
            tracing::debug!(registry = %self.id, task = %task_ref.id, "add on closed registry");
            task.next = None;
            task.finalize();
            return Err(RegistryError::Closed(self.id));
        }

        list.push_front(task);
        let len = list.len;
        drop(list);

        tracing::trace!(registry = %self.id, task = %task_ref.id, len, "task added");
        Ok(task_ref)
    }

    /// Visits every linked node, most recently added first, retired or not.
    ///
    /// Callable from any thread. The registry lock is held for the whole walk:
    /// `visit` must not call back into this registry or it deadlocks.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&TrackedTask),
    {
        let list = self.list.lock();
        for task in list.iter() {
            visit(task);
        }
    }

    /// Owned copy of every linked node, in `for_each` order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let list = self.list.lock();
        list.iter().map(TrackedTask::snapshot).collect()
    }

    /// Marks `task` as finished. Callable from any thread, idempotent until
    /// the owner collects it. Nothing is unlinked or freed here.
    ///
    /// # Panics
    ///
    /// Panics with [`PanicReason::ForeignTask`] if `task` was added to another
    /// registry and with [`PanicReason::StaleTask`] if it was already
    /// reclaimed.
    #[track_caller]
    pub fn retire(&self, task: TaskRef) {
        if task.registry != self.id {
            violation(
                PanicReason::ForeignTask,
                format!(
                    "retire of task {} from registry {} on registry {}",
                    task.id, task.registry, self.id
                ),
            );
        }

        let mut list = self.list.lock();
        let Some(node) = list.find_mut(task.id) else {
            drop(list);
            violation(
                PanicReason::StaleTask,
                format!("retire of task {} already reclaimed by registry {}", task.id, self.id),
            );
        };

        if node.retired {
            return;
        }

        node.retired = true;
        list.retired += 1;
        drop(list);

        tracing::trace!(registry = %self.id, task = %task.id, "task retired");
    }

    /// Unlinks every retired node and finalizes it, returning how many were
    /// reclaimed. Nodes never retired are left untouched.
    ///
    /// # Panics
    ///
    /// Panics with [`PanicReason::CollectOffOwner`] when called from any
    /// thread other than the owner.
    #[track_caller]
    pub fn collect(&self) -> usize {
        self.assert_owner(PanicReason::CollectOffOwner, "collect");
        self.collect_unchecked()
    }

    fn collect_unchecked(&self) -> usize {
        let mut reclaimed = Reclaimed::new();
        self.list.lock().unlink_retired(&mut reclaimed);

        // Finalizers run user code, keep them out of the critical section.
        let n = reclaimed.len();
        for task in reclaimed {
            task.finalize();
        }

        if n > 0 {
            tracing::trace!(registry = %self.id, reclaimed = n, "collected retired tasks");
        }
        n
    }

    /// Refuses further `add`s and reclaims what is already retired. Nodes that
    /// are still live stay linked until the registry itself is dropped.
    #[track_caller]
    pub fn close(&self) -> usize {
        self.assert_owner(PanicReason::CloseOffOwner, "close");
        self.close_unchecked()
    }

    /// Same as `close` without the owner check. Thread-local destructors run
    /// after the thread handle may already be gone.
    pub(crate) fn close_unchecked(&self) -> usize {
        let was_closed = std::mem::replace(&mut self.list.lock().closed, true);
        if !was_closed {
            diagnostics::unregister(self.id);
            tracing::debug!(registry = %self.id, "registry closed");
        }

        self.collect_unchecked()
    }

    pub fn is_closed(&self) -> bool {
        self.list.lock().closed
    }

    /// Number of linked nodes, including retired ones not yet collected.
    pub fn len(&self) -> usize {
        self.list.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of retired nodes waiting for `collect`.
    pub fn retired(&self) -> usize {
        self.list.lock().retired
    }

    fn should_sweep(&self) -> bool {
        self.collect_threshold
            .is_some_and(|threshold| self.retired() >= threshold)
    }

    #[track_caller]
    fn assert_owner(&self, reason: PanicReason, op: &str) {
        let current = thread::current().id();
        if current != self.owner {
            violation(
                reason,
                format!(
                    "{op} on registry {} from {:?}, owned by {:?}",
                    self.id, current, self.owner
                ),
            );
        }
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        let list = self.list.get_mut();
        let was_closed = std::mem::replace(&mut list.closed, true);
        let remaining = list.drain();

        if !was_closed {
            diagnostics::unregister(self.id);
        }

        if !remaining.is_empty() {
            tracing::debug!(
                registry = %self.id,
                remaining = remaining.len(),
                "finalizing tasks still tracked at teardown"
            );
        }

        for task in remaining {
            task.finalize();
        }
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self.list.lock();
        f.debug_struct("ThreadRegistry")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("owner_name", &self.owner_name)
            .field("len", &list.len)
            .field("retired", &list.retired)
            .field("closed", &list.closed)
            .finish()
    }
}
