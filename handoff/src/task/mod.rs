//! The task-producing adapter.
//!
//! A spawned task is a boxed future plus a small atomic state machine. It has
//! no scheduler: whoever wakes it polls it, on their own stack.

mod id;
pub use id::Id;

mod output;
pub use output::TaskOutput;

mod raw;

mod spawn;
pub use spawn::{SpawnBuilder, spawn, spawn_builder};

mod state;
