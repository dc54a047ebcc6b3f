use crate::registry::ThreadRegistry;
use std::sync::Arc;

/// Settings applied to a thread's registry when it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Once this many nodes are retired, the next `add` reclaims them first.
    ///
    /// `None` leaves reclamation entirely to explicit `collect` calls.
    pub collect_threshold: Option<usize>,
}

/// Configures the calling thread's registry before any task is spawned on it.
///
/// ```
/// let registry = handoff::Builder::new().collect_threshold(64).init().unwrap();
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    cfg: RegistryConfig,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweeps retired tasks automatically once `val` of them pile up.
    ///
    /// # Panics
    ///
    /// This function will panic if 0 is passed as an argument.
    pub fn collect_threshold(&mut self, val: usize) -> &mut Self {
        assert!(val > 0, "collect_threshold must be greater than 0");
        self.cfg.collect_threshold = Some(val);
        self
    }

    pub fn config(&self) -> RegistryConfig {
        self.cfg.clone()
    }

    /// Creates the calling thread's registry.
    ///
    /// # Errors
    ///
    /// Fails if the thread already has a registry, including one created
    /// lazily by an earlier `spawn`, or if the thread is shutting down.
    pub fn init(&mut self) -> anyhow::Result<Arc<ThreadRegistry>> {
        super::init(&self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        assert_eq!(Builder::new().config(), RegistryConfig::default());
        assert_eq!(RegistryConfig::default().collect_threshold, None);
    }

    #[test]
    fn test_builder_collect_threshold() {
        let cfg = Builder::new().collect_threshold(8).config();
        assert_eq!(cfg.collect_threshold, Some(8));
    }

    #[test]
    #[should_panic(expected = "collect_threshold must be greater than 0")]
    fn test_builder_rejects_zero_threshold() {
        Builder::new().collect_threshold(0);
    }
}
