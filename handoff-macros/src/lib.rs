#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Attribute macros for the `handoff` crate.

mod entry;

/// Turns an `async fn` into a function that spawns its body as a tracked
/// task and returns the task's `handoff::Waiter`.
///
/// The body starts running before the call returns and keeps running on the
/// calling thread until its first suspension point. The task is registered in
/// the calling thread's registry, tagged with the function name.
///
/// # Arguments
///
/// - `tag = "..."` overrides the diagnostics tag.
/// - `crate = "..."` sets the path to the `handoff` crate when it is renamed.
///
/// Function arguments are moved into the task, so they must be owned:
/// methods taking `self` are rejected.
///
/// # Usage
///
/// ```ignore
/// #[handoff::task(tag = "checkpoint")]
/// async fn checkpoint(done: handoff::Waiter<u64>) -> anyhow::Result<u64> {
///     let lsn = handoff::awaiting(done).await?;
///     Ok(lsn)
/// }
///
/// let (setter, waiter) = handoff::make_outcome();
/// let task = checkpoint(waiter);
/// setter.set_value(42);
/// ```
///
/// Equivalent code not using `#[handoff::task]`
///
/// ```ignore
/// #[track_caller]
/// fn checkpoint(done: handoff::Waiter<u64>) -> handoff::Waiter<u64> {
///     handoff::spawn_builder().with_tag("checkpoint").spawn(async move {
///         let lsn = handoff::awaiting(done).await?;
///         anyhow::Ok(lsn)
///     })
/// }
/// ```
#[proc_macro_attribute]
pub fn task(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::task(args.into(), item.into()).into()
}
