//! Process-wide view of in-flight work.
//!
//! Every [`ThreadRegistry`] registers itself in a global directory when it is
//! created and leaves it when it is closed or dropped. The directory only
//! holds weak references: it never keeps a registry alive past its thread.
use crate::registry::{RegistryId, TaskSnapshot, TaskStatus, ThreadRegistry};
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};
use std::thread::ThreadId;
use std::time::Duration;

static DIRECTORY: LazyLock<DashMap<RegistryId, Weak<ThreadRegistry>>> =
    LazyLock::new(|| DashMap::with_shard_amount(8));

pub(crate) fn register(registry: &Arc<ThreadRegistry>) {
    let old = DIRECTORY.insert(registry.id(), Arc::downgrade(registry));
    debug_assert!(old.is_none());
}

pub(crate) fn unregister(id: RegistryId) {
    DIRECTORY.remove(&id);
}

/// In-flight work of one thread, as seen by a single `for_each` walk.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub registry: RegistryId,
    pub owner: ThreadId,
    pub owner_name: Option<String>,
    /// Most recently added first.
    pub tasks: Vec<TaskSnapshot>,
}

impl RegistrySnapshot {
    fn of(registry: &ThreadRegistry) -> Self {
        Self {
            registry: registry.id(),
            owner: registry.owner(),
            owner_name: registry.owner_name().map(str::to_owned),
            tasks: registry.snapshot(),
        }
    }

    /// Tasks not yet retired.
    pub fn live(&self) -> impl Iterator<Item = &TaskSnapshot> {
        self.tasks.iter().filter(|task| !task.retired)
    }
}

impl fmt::Display for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "registry {} on {} ({:?}): {} tasks",
            self.registry,
            self.owner_name.as_deref().unwrap_or("<unnamed>"),
            self.owner,
            self.tasks.len()
        )?;

        for task in &self.tasks {
            writeln!(f, "  {task}")?;
        }
        Ok(())
    }
}

/// Strong handles to every registry still alive, taken without holding any
/// directory shard lock while they are used.
fn live_registries() -> Vec<Arc<ThreadRegistry>> {
    let mut registries = DIRECTORY
        .iter()
        .filter_map(|entry| entry.value().upgrade())
        .collect::<Vec<_>>();

    registries.sort_by_key(|registry| registry.id());
    registries
}

/// Snapshots every registry in the process, ordered by registry id.
pub fn dump() -> Vec<RegistrySnapshot> {
    live_registries()
        .iter()
        .map(|registry| RegistrySnapshot::of(registry))
        .collect()
}

/// Tasks parked at a suspension point for longer than `older_than`. A hang
/// detector polls this periodically.
pub fn stalled(older_than: Duration) -> Vec<TaskSnapshot> {
    dump()
        .into_iter()
        .flat_map(|snapshot| snapshot.tasks)
        .filter(|task| {
            !task.retired && task.status == TaskStatus::Suspended && task.age >= older_than
        })
        .collect()
}

/// Emits the full dump through `tracing` at info level.
pub fn log_inflight() {
    for snapshot in dump() {
        tracing::info!(
            registry = %snapshot.registry,
            owner = ?snapshot.owner,
            tasks = snapshot.tasks.len(),
            live = snapshot.live().count(),
            "in-flight tasks"
        );

        for task in &snapshot.tasks {
            tracing::info!(
                registry = %snapshot.registry,
                task = %task.id,
                tag = task.tag.unwrap_or("-"),
                status = %task.status,
                location = %task.location,
                retired = task.retired,
                age = ?task.age,
            );
        }
    }
}
