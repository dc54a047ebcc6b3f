use anyhow::{Result, anyhow};
use handoff::{
    Setter, TaskKind, TaskStatus, ThreadRegistry, TrackedTask, awaiting, context, make_outcome,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, ThreadId};

/// Remembers which thread finalized it.
struct Probe(Arc<Mutex<Vec<ThreadId>>>);

impl TaskKind for Probe {
    fn status(&self) -> TaskStatus {
        TaskStatus::Suspended
    }

    fn finalize(self: Box<Self>) {
        self.0.lock().push(thread::current().id());
    }
}

fn live(registry: &ThreadRegistry) -> usize {
    let mut n = 0;
    registry.for_each(|task| n += usize::from(!task.is_retired()));
    n
}

#[test]
fn test_task_resumes_on_producer_and_owner_reclaims() -> Result<()> {
    let (to_b, from_a) = mpsc::channel::<(Setter<u64>, Arc<ThreadRegistry>)>();
    let (to_a, from_b) = mpsc::channel::<ThreadId>();

    let producer = thread::spawn(move || -> Result<()> {
        let (setter, registry_a) = from_a.recv()?;

        // The rest of the task body runs right here, inside set_value.
        setter.set_value(41);
        assert_eq!(registry_a.retired(), 1);

        to_a.send(thread::current().id())?;
        Ok(())
    });

    let owner = thread::spawn(move || -> Result<()> {
        let registry = context::registry();
        let resumed_on = Arc::new(Mutex::new(None));
        let reclaimed_on = Arc::new(Mutex::new(Vec::new()));

        let (setter, waiter) = make_outcome::<u64>();
        let slot = Arc::clone(&resumed_on);
        let reclaim_log = Arc::clone(&reclaimed_on);
        let task = handoff::spawn_builder()
            .with_tag("replicate")
            .on_reclaim(move || reclaim_log.lock().push(thread::current().id()))
            .spawn(async move {
                let n = awaiting(waiter).await?;
                *slot.lock() = Some(thread::current().id());
                anyhow::Ok(n + 1)
            });

        // Registered at creation, suspended on the outcome.
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].tag, Some("replicate"));
        assert_eq!(snapshot[0].status, TaskStatus::Suspended);

        to_b.send((setter, Arc::clone(&registry)))?;
        let producer_id = from_b.recv()?;

        assert_eq!(*resumed_on.lock(), Some(producer_id));
        assert_ne!(producer_id, thread::current().id());

        // Retired from B, still linked until A collects.
        assert_eq!(registry.len(), 1);
        assert_eq!(live(&registry), 0);
        assert!(reclaimed_on.lock().is_empty());

        assert_eq!(context::collect(), 1);
        assert!(registry.is_empty());
        assert_eq!(*reclaimed_on.lock(), vec![thread::current().id()]);
        assert_eq!(futures::executor::block_on(task)?, 42);
        Ok(())
    });

    producer.join().map_err(|_| anyhow!("producer panicked"))??;
    owner.join().map_err(|_| anyhow!("owner panicked"))??;
    Ok(())
}

#[test]
fn test_foreign_retire_then_owner_finalizes() -> Result<()> {
    let registry = ThreadRegistry::new();
    let finalized_on = Arc::new(Mutex::new(Vec::new()));

    let task = registry.add(TrackedTask::new(Probe(Arc::clone(&finalized_on))))?;

    let other = Arc::clone(&registry);
    thread::spawn(move || other.retire(task))
        .join()
        .map_err(|_| anyhow!("retirer panicked"))?;

    // Retirement is not removal.
    let mut seen = Vec::new();
    registry.for_each(|t| seen.push((t.id(), t.is_retired())));
    assert_eq!(seen, vec![(task.id(), true)]);
    assert!(finalized_on.lock().is_empty());

    assert_eq!(registry.collect(), 1);
    assert_eq!(*finalized_on.lock(), vec![thread::current().id()]);

    let mut remaining = 0;
    registry.for_each(|_| remaining += 1);
    assert_eq!(remaining, 0);
    Ok(())
}

#[test]
fn test_many_producers_resume_many_tasks() -> Result<()> {
    const N: usize = 32;

    let finished = Arc::new(AtomicUsize::new(0));
    let owner_registry = context::registry();

    let mut setters = Vec::with_capacity(N);
    let mut tasks = Vec::with_capacity(N);

    for i in 0..N {
        let (setter, waiter) = make_outcome::<usize>();
        let finished = Arc::clone(&finished);

        tasks.push(handoff::spawn(async move {
            let v = awaiting(waiter).await?;
            finished.fetch_add(1, Ordering::Relaxed);
            anyhow::Ok(v * 2 + i)
        }));
        setters.push(setter);
    }

    assert_eq!(live(&owner_registry), N);

    let producers = setters
        .into_iter()
        .enumerate()
        .map(|(i, setter)| thread::spawn(move || setter.set_value(i)))
        .collect::<Vec<_>>();

    for producer in producers {
        producer.join().map_err(|_| anyhow!("producer panicked"))?;
    }

    assert_eq!(finished.load(Ordering::Relaxed), N);
    assert_eq!(live(&owner_registry), 0);
    assert_eq!(context::collect(), N);

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(futures::executor::block_on(task)?, i * 3);
    }
    Ok(())
}

#[test]
fn test_diagnostics_see_suspended_work() -> Result<()> {
    let (setter, waiter) = make_outcome::<()>();
    let task = handoff::spawn_builder()
        .with_tag("stuck-flush")
        .spawn(async move { awaiting(waiter).await });

    let registry = context::registry();
    let stalled = thread::spawn(|| handoff::diagnostics::stalled(std::time::Duration::ZERO))
        .join()
        .map_err(|_| anyhow!("inspector panicked"))?;

    assert!(stalled.iter().any(|t| t.tag == Some("stuck-flush")));
    assert!(
        handoff::diagnostics::dump()
            .iter()
            .any(|r| r.registry == registry.id() && r.to_string().contains("stuck-flush"))
    );

    setter.set_value(());
    futures::executor::block_on(task)?;
    assert_eq!(context::collect(), 1);
    Ok(())
}
