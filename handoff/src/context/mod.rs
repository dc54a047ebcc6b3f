use crate::error::RegistryError;
use crate::registry::ThreadRegistry;
use std::cell::OnceCell;
use std::sync::Arc;
use std::thread_local;

mod builder;
pub use builder::{Builder, RegistryConfig};

/// Per-thread state: the registry every task spawned on this thread joins.
struct ThreadContext {
    registry: Arc<ThreadRegistry>,
}

impl ThreadContext {
    fn new(cfg: &RegistryConfig) -> Self {
        Self {
            registry: ThreadRegistry::with_config(cfg),
        }
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        // Tasks still suspended keep a weak handle and can retire themselves
        // until the last strong reference goes away.
        let n = self.registry.close_unchecked();
        tracing::trace!(registry = %self.registry.id(), reclaimed = n, "thread context torn down");
    }
}

thread_local! {
    static CONTEXT: OnceCell<ThreadContext> = const { OnceCell::new() };
}

pub(super) fn init(cfg: &RegistryConfig) -> anyhow::Result<Arc<ThreadRegistry>> {
    CONTEXT
        .try_with(|ctx| {
            if let Some(existing) = ctx.get() {
                anyhow::bail!(
                    "registry {} already initialized on this thread",
                    existing.registry.id()
                );
            }

            let registry = Arc::clone(&ctx.get_or_init(|| ThreadContext::new(cfg)).registry);
            Ok(registry)
        })
        .map_err(|_| anyhow::anyhow!("thread context unavailable, the thread is shutting down"))?
}

/// Runs `f` against the calling thread's registry, creating it with the
/// default configuration on first use.
///
/// # Errors
///
/// Returns [`RegistryError::NoContext`] once the thread-local storage of the
/// calling thread is being torn down.
pub(crate) fn with_registry<F, R>(f: F) -> Result<R, RegistryError>
where
    F: FnOnce(&Arc<ThreadRegistry>) -> R,
{
    CONTEXT
        .try_with(|ctx| {
            let ctx = ctx.get_or_init(|| ThreadContext::new(&RegistryConfig::default()));
            f(&ctx.registry)
        })
        .map_err(|_| RegistryError::NoContext)
}

/// Returns the calling thread's registry.
///
/// # Panics
///
/// Panics if called from a thread-local destructor after the context was
/// torn down. Use [`try_registry`] there.
#[track_caller]
pub fn registry() -> Arc<ThreadRegistry> {
    try_registry().expect("thread context already torn down")
}

/// Returns the calling thread's registry, or `None` during thread teardown.
pub fn try_registry() -> Option<Arc<ThreadRegistry>> {
    with_registry(Arc::clone).ok()
}

/// Reclaims every retired task of the calling thread's registry. This is the
/// periodic reclamation hook a worker loop calls between batches of work.
pub fn collect() -> usize {
    with_registry(|registry| registry.collect()).unwrap_or(0)
}
