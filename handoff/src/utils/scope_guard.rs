use std::marker::PhantomData;

/// Runs a closure when it goes out of scope, including during unwinding,
/// unless it was disarmed first.
///
/// The task harness arms one around every poll so a panic escaping from
/// continuation code still completes the task instead of leaving it stuck in
/// the running state.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // Taken on drop or disarm, so the closure runs at most once.
    closure: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    /// Creates an armed guard.
    ///
    /// ```ignore
    /// let mut completed = false;
    /// {
    ///     let _guard = ScopeGuard::new(|| completed = true);
    /// }
    /// assert!(completed);
    /// ```
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
            _p: PhantomData,
        }
    }

    /// Prevents the closure from running on drop.
    pub(crate) fn disarm(&mut self) {
        self.closure.take();
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
