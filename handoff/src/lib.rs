//! Suspendable tasks that resume on whichever thread completes their work,
//! tracked by per-thread registries.
//!
//! - [`make_outcome`] pairs a [`Setter`] with a [`Waiter`] for one result.
//! - [`awaiting`] turns a `Waiter` into a suspension point.
//! - [`spawn`] (or `#[handoff::task]`) starts a task that runs inline until
//!   it suspends and registers itself in the calling thread's
//!   [`ThreadRegistry`].
//! - [`diagnostics`] enumerates in-flight tasks across every thread.

#[doc(inline)]
pub use handoff_macros::task;

mod bridge;
pub use bridge::{Awaiting, awaiting};

pub mod context;
pub use context::{Builder, RegistryConfig};

pub mod diagnostics;

mod error;
pub use error::{ContractPanic, PanicReason, RegistryError, TaskError};

mod outcome;
pub use outcome::{Setter, Waiter, make_outcome};

mod registry;
pub use registry::{
    RegistryId, TaskKind, TaskRef, TaskSnapshot, TaskStatus, ThreadRegistry, TrackedTask,
};

pub mod task;
pub use task::{SpawnBuilder, TaskOutput, spawn, spawn_builder};

mod utils;

#[cfg(test)]
mod test_utils;
