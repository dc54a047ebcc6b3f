use anyhow::{Result, anyhow, bail};
use handoff::{TaskError, Waiter, awaiting, context, make_outcome};
use std::thread;

#[handoff::task]
async fn double(input: Waiter<u32>) -> Result<u32> {
    let n = awaiting(input).await?;
    Ok(n * 2)
}

#[handoff::task(tag = "validate")]
async fn validate(input: Waiter<i64>) -> Result<i64> {
    let n = awaiting(input).await?;
    if n < 0 {
        bail!("negative input {n}");
    }
    Ok(n)
}

#[handoff::task]
async fn fire_and_forget(input: Waiter<()>) {
    let _ = awaiting(input).await;
}

#[test]
fn test_macro_spawns_and_tags_with_fn_name() -> Result<()> {
    let (setter, waiter) = make_outcome();
    let task = double(waiter);

    let registry = context::registry();
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].tag, Some("double"));
    assert_eq!(snapshot[0].location.file(), file!());

    thread::spawn(move || setter.set_value(21))
        .join()
        .map_err(|_| anyhow!("producer panicked"))?;

    assert_eq!(futures::executor::block_on(task)?, 42);
    assert_eq!(context::collect(), 1);
    Ok(())
}

#[test]
fn test_macro_custom_tag_and_error() -> Result<()> {
    let (setter, waiter) = make_outcome();
    let task = validate(waiter);

    assert_eq!(context::registry().snapshot()[0].tag, Some("validate"));

    setter.set_value(-1);
    match futures::executor::block_on(task) {
        Err(TaskError::Failed(err)) => assert!(err.to_string().contains("negative input -1")),
        other => bail!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_macro_unit_return() {
    let (setter, waiter) = make_outcome();
    let task: Waiter<()> = fire_and_forget(waiter);

    assert!(!task.is_ready());
    setter.set_value(());
    assert!(task.is_ready());
}
