use crate::registry::node::TrackedTask;
use crate::task::Id;
use smallvec::SmallVec;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Batch of unlinked nodes handed back by `unlink_retired`. A sweep rarely
/// reclaims more than a handful of nodes, keep them on the stack.
pub(super) type Reclaimed = SmallVec<[Box<TrackedTask>; SPILL_TO_HEAP_THRESHOLD]>;

pub(super) const SPILL_TO_HEAP_THRESHOLD: usize = 16;

/// Singly-linked, intrusive list of tracked nodes, most recently added first.
///
/// Every method requires the caller to hold the owning registry's lock.
pub(super) struct TaskList {
    head: Option<NonNull<TrackedTask>>,

    /// Nodes currently linked, retired or not.
    pub(super) len: usize,

    /// Linked nodes whose retirement flag is set.
    pub(super) retired: usize,

    pub(super) closed: bool,
}

// Safety: the list exclusively owns every linked node. Nodes are `Send`, and
// the list is only reachable through the registry's mutex.
unsafe impl Send for TaskList {}

impl TaskList {
    pub(super) fn new() -> Self {
        Self {
            head: None,
            len: 0,
            retired: 0,
            closed: false,
        }
    }

    pub(super) fn push_front(&mut self, node: Box<TrackedTask>) {
        debug_assert!(node.next.is_none(), "node is already linked");

        let mut node = NonNull::from(Box::leak(node));

        // Safety: we just leaked the box, nobody else can see the node yet.
        unsafe { node.as_mut().next = self.head.take() };

        self.head = Some(node);
        self.len += 1;
    }

    pub(super) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _p: PhantomData,
        }
    }

    pub(super) fn find_mut(&mut self, id: Id) -> Option<&mut TrackedTask> {
        let mut cursor = self.head;

        while let Some(mut node) = cursor {
            // Safety: linked nodes stay valid while the list is borrowed
            // mutably, only the list itself frees them.
            let node = unsafe { node.as_mut() };
            if node.id == id {
                return Some(node);
            }
            cursor = node.next;
        }

        None
    }

    /// Unlinks every retired node into `out`, preserving the relative order of
    /// the nodes left behind.
    pub(super) fn unlink_retired(&mut self, out: &mut Reclaimed) {
        let mut link: *mut Option<NonNull<TrackedTask>> = &mut self.head;

        // Safety: `link` always points either at `self.head` or at the `next`
        // field of a node still linked in this list.
        unsafe {
            while let Some(node) = *link {
                let raw = node.as_ptr();

                if (*raw).retired {
                    *link = (*raw).next.take();
                    out.push(Box::from_raw(raw));
                } else {
                    link = &raw mut (*raw).next;
                }
            }
        }

        self.len -= out.len();
        self.retired -= out.len();
    }

    /// Unlinks every node, retired or not. Used on teardown.
    pub(super) fn drain(&mut self) -> Vec<Box<TrackedTask>> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head.take();

        while let Some(node) = cursor {
            // Safety: the node is linked, hence owned by this list.
            let mut node = unsafe { Box::from_raw(node.as_ptr()) };
            cursor = node.next.take();
            out.push(node);
        }

        self.len = 0;
        self.retired = 0;
        out
    }
}

impl Drop for TaskList {
    fn drop(&mut self) {
        debug_assert!(self.head.is_none(), "task list dropped with linked nodes");
    }
}

pub(super) struct Iter<'a> {
    next: Option<NonNull<TrackedTask>>,
    _p: PhantomData<&'a TrackedTask>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TrackedTask;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            // Safety: the list outlives 'a and cannot be mutated meanwhile.
            let node = unsafe { node.as_ref() };
            self.next = node.next;
            node
        })
    }
}
