use crate::registry::RegistryId;
use crate::task::Id;
use std::fmt;
use std::panic::Location;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

/// Behaviour each concrete kind of tracked computation supplies.
///
/// `status` is called from any thread while the owning registry's lock is
/// held. `finalize` runs exactly once, on the owning thread, during
/// `collect`, and must not call back into that registry.
pub trait TaskKind: Send + 'static {
    /// Coarse state shown in diagnostics dumps.
    fn status(&self) -> TaskStatus {
        TaskStatus::Unknown
    }

    /// Releases whatever the task still owns.
    fn finalize(self: Box<Self>) {}
}

/// Coarse state of a tracked computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Parked at a suspension point, waiting for an outcome.
    Suspended,
    /// Currently being polled by some thread.
    Running,
    /// Body finished. The node is waiting to be retired or reclaimed.
    Complete,
    /// The task kind does not report a status.
    Unknown,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Suspended => "suspended",
            TaskStatus::Running => "running",
            TaskStatus::Complete => "complete",
            TaskStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Bookkeeping record for one live computation.
///
/// Build it with [`TrackedTask::new`] and hand it to
/// [`ThreadRegistry::add`], which takes ownership. The registry frees it
/// during `collect` after it was retired.
///
/// [`ThreadRegistry::add`]: crate::ThreadRegistry::add
pub struct TrackedTask {
    /// Intrusive link, only touched by the registry under its lock.
    pub(super) next: Option<NonNull<TrackedTask>>,

    pub(super) id: Id,

    /// Back-pointer to the owning registry, set by `add`.
    pub(super) registry: Option<RegistryId>,

    pub(super) retired: bool,

    location: &'static Location<'static>,

    tag: Option<&'static str>,

    created: Instant,

    kind: Box<dyn TaskKind>,
}

// Safety: `next` is `None` until the node is linked, after which it is only
// read or written while holding the owning registry's lock.
unsafe impl Send for TrackedTask {}

impl TrackedTask {
    /// Creates a node for `kind`, tagged with the caller's source location.
    #[track_caller]
    pub fn new<K: TaskKind>(kind: K) -> Self {
        Self::with_id(Id::next(), Box::new(kind), Location::caller())
    }

    pub(crate) fn with_id(
        id: Id,
        kind: Box<dyn TaskKind>,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            next: None,
            id,
            registry: None,
            retired: false,
            location,
            tag: None,
            created: Instant::now(),
            kind,
        }
    }

    /// Attaches a symbolic tag shown in diagnostics.
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns true once `retire` was called. Retired nodes stay visible
    /// until the owning thread collects them.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Handle for retiring this node, `None` until a registry adopted it.
    pub fn task_ref(&self) -> Option<TaskRef> {
        self.registry.map(|registry| TaskRef {
            registry,
            id: self.id,
        })
    }

    pub fn status(&self) -> TaskStatus {
        self.kind.status()
    }

    /// Time since the node was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            registry: self.registry,
            tag: self.tag,
            location: self.location,
            retired: self.retired,
            status: self.status(),
            age: self.age(),
        }
    }

    pub(crate) fn finalize(self: Box<Self>) {
        debug_assert!(self.next.is_none(), "finalizing a linked node");
        let TrackedTask { kind, .. } = *self;
        kind.finalize();
    }
}

impl fmt::Debug for TrackedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedTask")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .field("tag", &self.tag)
            .field("location", &self.location)
            .field("retired", &self.retired)
            .finish()
    }
}

/// Names a node inside a registry. Cheap to copy and safe to send anywhere:
/// it carries no pointer, only the pair of IDs that `retire` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub(super) registry: RegistryId,
    pub(super) id: Id,
}

impl TaskRef {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn registry(&self) -> RegistryId {
        self.registry
    }
}

/// Owned copy of a node's diagnostic fields, safe to keep after the lock
/// that produced it was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: Id,
    pub registry: Option<RegistryId>,
    pub tag: Option<&'static str>,
    pub location: &'static Location<'static>,
    pub retired: bool,
    pub status: TaskStatus,
    pub age: Duration,
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} [{}] {} at {} ({:?} old)",
            self.id,
            self.tag.unwrap_or("-"),
            self.status,
            self.location,
            self.age
        )?;

        if self.retired {
            f.write_str(" retired")?;
        }
        Ok(())
    }
}
