//! The capability set the sandbox needs from an embedded interpreter.

pub mod marshal;
pub mod quickjs;

use std::cell::Cell;
use std::rc::Rc;

use crate::bridge::Bridge;
use crate::error::SandboxError;

/// Source of isolated guest contexts.
#[allow(async_fn_in_trait)]
pub trait Engine {
    type Context: GuestContext;

    /// Create a fresh context. No globals or queued work are shared with any other context.
    async fn acquire(&self) -> Result<Self::Context, SandboxError>;
}

/// One live interpreter context, exclusively owned by a single `execute` call.
///
/// Dropping a context must release it and every handle allocated in it;
/// [`GuestContext::dispose`] is the same release, made explicit.
pub trait GuestContext {
    /// Bind a guest-callable function named `name` in the global scope.
    /// Each guest call converts its arguments, forwards them to `bridge`,
    /// and returns the first argument unchanged (or the guest's `undefined`).
    fn install_bridge(&mut self, name: &str, bridge: Rc<Bridge>) -> Result<(), SandboxError>;

    /// Evaluate `code` as a complete program. The completion value is released, not returned.
    fn evaluate(&mut self, code: &str) -> Result<(), SandboxError>;

    /// Run queued guest continuations until none remain. Returns how many ran.
    fn drain_deferred(&mut self) -> Result<usize, SandboxError>;

    fn dispose(self);
}

/// Count of contexts an engine has handed out and not yet had back.
#[derive(Debug, Default)]
pub struct Ledger {
    live: Cell<usize>,
    acquired: Cell<usize>,
}

impl Ledger {
    pub fn new() -> Rc<Self> {
        Rc::new(Ledger::default())
    }

    /// Record one acquisition. The returned lease gives it back when dropped.
    pub fn lease(self: &Rc<Self>) -> Lease {
        self.live.set(self.live.get() + 1);
        self.acquired.set(self.acquired.get() + 1);
        Lease {
            ledger: Rc::clone(self),
        }
    }

    pub fn live(&self) -> usize {
        self.live.get()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.get()
    }
}

/// Proof that one context is still allocated.
#[derive(Debug)]
pub struct Lease {
    ledger: Rc<Ledger>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.live.set(self.ledger.live.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_are_returned_on_drop() {
        let ledger = Ledger::new();
        let first = ledger.lease();
        let second = ledger.lease();
        assert_eq!(ledger.live(), 2);

        drop(first);
        assert_eq!(ledger.live(), 1);
        drop(second);
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.acquired(), 2);
    }
}
