use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, error};

use crate::error::VerificationError;
use crate::host_value::HostValue;
use crate::verifier::{Verdict, Verifier};

/// The value the bridge is computing for the current `execute` call.
///
/// Every bridge call is numbered. A settlement only lands if no later call has
/// landed first, so the last invocation wins regardless of settlement order.
#[derive(Debug, Default)]
struct ResultSlot {
    seq: u64,
    value: Option<HostValue>,
}

impl ResultSlot {
    fn store(&mut self, seq: u64, value: Option<HostValue>) {
        if seq >= self.seq {
            self.seq = seq;
            // `undefined` is the guest's empty sentinel.
            self.value = value.filter(|v| !v.is_undefined());
        }
    }
}

/// What one `execute` call observed through the bridge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captured {
    /// Result of the last bridge call, or `None` when there was no call,
    /// the call produced `undefined`, or its verification failed.
    pub value: Option<HostValue>,
    /// Number of bridge invocations.
    pub calls: u64,
    /// Number of bridge calls whose verification failed.
    pub failures: usize,
}

/// Host half of the guest's bridge function.
///
/// The engine converts guest arguments and hands them to [`Bridge::call`];
/// echoing a value back to the guest stays on the engine side.
pub struct Bridge {
    verifier: Rc<dyn Verifier>,
    slot: Rc<RefCell<ResultSlot>>,
    failures: Rc<Cell<usize>>,
    calls: Cell<u64>,
    pending: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

impl Bridge {
    pub fn new(verifier: Rc<dyn Verifier>) -> Self {
        Bridge {
            verifier,
            slot: Rc::new(RefCell::new(ResultSlot::default())),
            failures: Rc::new(Cell::new(0)),
            calls: Cell::new(0),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Run verification logic for one guest call. Never blocks on host futures:
    /// a deferred verdict is queued and settles into the slot later.
    pub fn call(&self, args: Vec<HostValue>) {
        let seq = self.calls.get() + 1;
        self.calls.set(seq);
        debug!(call = seq, args = args.len(), "bridge invoked");

        match self.verifier.verify(args) {
            Verdict::Ready(result) => settle(&self.slot, &self.failures, seq, result),
            Verdict::Deferred(future) => {
                let slot = Rc::clone(&self.slot);
                let failures = Rc::clone(&self.failures);
                let settlement = async move {
                    let result = future.await;
                    settle(&slot, &failures, seq, result);
                };
                self.pending.borrow_mut().push(settlement.boxed_local());
            }
        }
    }

    /// Host computations still outstanding. Takes them; a second call returns
    /// only what was queued since.
    pub fn take_pending(&self) -> Vec<LocalBoxFuture<'static, ()>> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn captured(&self) -> Captured {
        Captured {
            value: self.slot.borrow().value.clone(),
            calls: self.calls.get(),
            failures: self.failures.get(),
        }
    }
}

fn settle(
    slot: &RefCell<ResultSlot>,
    failures: &Cell<usize>,
    seq: u64,
    result: Result<HostValue, VerificationError>,
) {
    match result {
        Ok(value) => slot.borrow_mut().store(seq, Some(value)),
        Err(err) => {
            error!(call = seq, error = %err, "verification failed");
            failures.set(failures.get() + 1);
            slot.borrow_mut().store(seq, None);
        }
    }
}
