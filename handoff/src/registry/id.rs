use std::sync::atomic::{AtomicU32, Ordering};
use std::{fmt, num::NonZeroU32};

/// Identifies one [`ThreadRegistry`]. Stored in every node it tracks so that
/// `retire` can reject nodes belonging to another registry.
///
/// We don't use `std::thread::ThreadId` here because a thread may tear down
/// its registry and the ID must stay unique for the life of the process.
///
/// [`ThreadRegistry`]: crate::ThreadRegistry
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct RegistryId(NonZeroU32);

impl RegistryId {
    pub(crate) fn next() -> RegistryId {
        static COUNTER: AtomicU32 = AtomicU32::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Safety: We use U32 which means we can create 4 Billion registries,
        // one per worker thread, which should be more than enough.
        let Some(id) = NonZeroU32::new(id) else {
            Self::exhausted();
        };

        RegistryId(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique registry ID: bitspace exhausted")
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
