mod panic;
pub(crate) use panic::panic_message;

mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;
