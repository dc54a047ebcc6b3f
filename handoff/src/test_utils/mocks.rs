#![allow(unsafe_op_in_unsafe_fn)]

use crate::registry::{TaskKind, TaskStatus, TrackedTask};
use crate::task::Id;
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{RawWaker, RawWakerVTable, Waker};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
pub(crate) struct WakerData {
    pub wake_count: AtomicUsize,
}

impl WakerData {
    pub(crate) fn get_count(&self) -> usize {
        self.wake_count.load(Ordering::Relaxed)
    }
}

unsafe fn mock_wake(data: *const ()) {
    // Need to consume 1 Arc reference
    let data = Arc::<WakerData>::from_raw(data.cast());
    data.wake_count.fetch_add(1, Ordering::Relaxed);
}

unsafe fn mock_wake_by_ref(data: *const ()) {
    // Not consuming any Arc ref
    let data = ManuallyDrop::new(Arc::<WakerData>::from_raw(data.cast()));
    data.wake_count.fetch_add(1, Ordering::Relaxed);
}

// Drop the Waker Arc reference.
unsafe fn mock_drop(data: *const ()) {
    if !data.is_null() {
        drop(Arc::<WakerData>::from_raw(data.cast()));
    }
}

unsafe fn mock_clone(data: *const ()) -> RawWaker {
    Arc::<WakerData>::increment_strong_count(data.cast());
    RawWaker::new(data, &MOCK_VTABLE)
}

static MOCK_VTABLE: RawWakerVTable =
    RawWakerVTable::new(mock_clone, mock_wake, mock_wake_by_ref, mock_drop);

// Mocking where the Waker will increment the atomic everytime it is woken up.
// Calling Arc::into_raw *does not decrement the reference count*, so we need to
// ensure we call `Arc::from_raw` on all these leaked ptrs.
pub(crate) fn mock_waker() -> (Waker, Arc<WakerData>) {
    let data = Arc::new(WakerData::default());
    let raw_data = Arc::into_raw(Arc::clone(&data));

    let raw_waker = RawWaker::new(raw_data as *const (), &MOCK_VTABLE);

    unsafe { (Waker::from_raw(raw_waker), data) }
}

/// Records every `finalize` call of the nodes sharing it.
#[derive(Debug, Default)]
pub(crate) struct FinalizeLog {
    count: AtomicUsize,
    threads: Mutex<Vec<ThreadId>>,
}

impl FinalizeLog {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }
}

#[derive(Debug)]
pub(crate) struct CountingKind(pub Arc<FinalizeLog>);

impl TaskKind for CountingKind {
    fn finalize(self: Box<Self>) {
        self.0.threads.lock().push(thread::current().id());
        self.0.count.fetch_add(1, Ordering::Release);
    }
}

/// A node whose `finalize` calls are counted.
#[track_caller]
pub(crate) fn counting_task() -> (TrackedTask, Arc<FinalizeLog>) {
    counting_node(Id::next())
}

#[track_caller]
pub(crate) fn counting_node(id: Id) -> (TrackedTask, Arc<FinalizeLog>) {
    let log = Arc::new(FinalizeLog::default());
    let kind = Box::new(CountingKind(Arc::clone(&log)));

    (TrackedTask::with_id(id, kind, Location::caller()), log)
}

/// A node that reports a fixed status and owns nothing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusKind(pub TaskStatus);

impl TaskKind for StatusKind {
    fn status(&self) -> TaskStatus {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_raw_waker() {
        let (waker1, waker_data) = mock_waker();
        waker1.wake_by_ref();
        assert_eq!(waker_data.get_count(), 1);

        let waker2 = waker1.clone();
        waker2.wake();
        assert_eq!(waker_data.get_count(), 2);

        drop(waker1);
        assert_eq!(waker_data.get_count(), 2);
        assert_eq!(Arc::strong_count(&waker_data), 1);
    }

    #[test]
    fn test_counting_kind_records_thread() {
        let (task, log) = counting_task();
        Box::new(task).finalize();

        assert_eq!(log.count(), 1);
        assert_eq!(log.threads(), vec![thread::current().id()]);
    }
}
