//! QuickJS backend (via `rquickjs`).
//!
//! Each acquisition builds its own `Runtime`: QuickJS keeps the pending-job queue
//! per runtime, so sharing one would let a block drain another block's promises.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rquickjs::function::Rest;
use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime, Value};
use tracing::{debug, trace, warn};

use crate::bridge::Bridge;
use crate::engine::marshal::{describe, to_host};
use crate::engine::{Engine, GuestContext, Lease, Ledger};
use crate::error::SandboxError;

/// Resource limits applied to every context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Deadline for evaluation plus draining, measured from the start of evaluation.
    pub timeout: Option<Duration>,
    /// QuickJS heap limit in bytes.
    pub memory_limit: Option<usize>,
}

/// Hands out isolated QuickJS contexts.
#[derive(Debug)]
pub struct QuickJs {
    limits: Limits,
    ledger: Rc<Ledger>,
}

impl QuickJs {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        QuickJs {
            limits,
            ledger: Ledger::new(),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Contexts handed out by this engine that are still alive.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl Default for QuickJs {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for QuickJs {
    type Context = QuickJsContext;

    async fn acquire(&self) -> Result<QuickJsContext, SandboxError> {
        QuickJsContext::new(self.limits, self.ledger.lease())
    }
}

const NO_DEADLINE: u64 = u64::MAX;

/// Deadline shared with the runtime's interrupt handler,
/// kept as nanoseconds since the context was created.
#[derive(Debug)]
struct Watchdog {
    origin: Instant,
    deadline: AtomicU64,
    tripped: AtomicBool,
}

impl Watchdog {
    fn new() -> Self {
        Watchdog {
            origin: Instant::now(),
            deadline: AtomicU64::new(NO_DEADLINE),
            tripped: AtomicBool::new(false),
        }
    }

    fn arm(&self, timeout: Duration) {
        let deadline = self.origin.elapsed().saturating_add(timeout);
        let nanos = u64::try_from(deadline.as_nanos()).unwrap_or(NO_DEADLINE - 1);
        self.deadline.store(nanos, Ordering::Relaxed);
    }

    fn should_interrupt(&self) -> bool {
        let deadline = self.deadline.load(Ordering::Relaxed);
        let due =
            deadline != NO_DEADLINE && self.origin.elapsed().as_nanos() >= u128::from(deadline);
        if due {
            self.tripped.store(true, Ordering::Relaxed);
        }
        due
    }

    fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}

/// One QuickJS runtime and its single context.
///
/// Field order is drop order: the context goes before its runtime,
/// and the lease is returned last.
pub struct QuickJsContext {
    context: Context,
    runtime: Runtime,
    limits: Limits,
    watchdog: Arc<Watchdog>,
    bridge_name: Option<String>,
    _lease: Lease,
    // QuickJS contexts are single-threaded.
    _not_send: PhantomData<*mut ()>,
}

impl QuickJsContext {
    fn new(limits: Limits, lease: Lease) -> Result<Self, SandboxError> {
        let runtime = Runtime::new().map_err(|e| SandboxError::Initialization(e.to_string()))?;
        if let Some(bytes) = limits.memory_limit {
            runtime.set_memory_limit(bytes);
        }

        let watchdog = Arc::new(Watchdog::new());
        if limits.timeout.is_some() {
            let watchdog = Arc::clone(&watchdog);
            runtime.set_interrupt_handler(Some(Box::new(move || watchdog.should_interrupt())));
        }

        let context =
            Context::full(&runtime).map_err(|e| SandboxError::Initialization(e.to_string()))?;
        debug!("guest context acquired");

        Ok(QuickJsContext {
            context,
            runtime,
            limits,
            watchdog,
            bridge_name: None,
            _lease: lease,
            _not_send: PhantomData,
        })
    }

    fn timed_out(&self) -> Option<SandboxError> {
        match (self.watchdog.tripped(), self.limits.timeout) {
            (true, Some(timeout)) => Some(SandboxError::Timeout(timeout)),
            _ => None,
        }
    }
}

fn install<'js>(ctx: &Ctx<'js>, name: &str, bridge: Rc<Bridge>) -> rquickjs::Result<()> {
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, Rest(args): Rest<Value<'js>>| -> Value<'js> {
            let converted = args.iter().map(|arg| to_host(&ctx, arg)).collect();
            bridge.call(converted);
            args.into_iter()
                .next()
                .unwrap_or_else(|| Value::new_undefined(ctx.clone()))
        },
    )?;
    ctx.globals().set(name, function)
}

impl GuestContext for QuickJsContext {
    fn install_bridge(&mut self, name: &str, bridge: Rc<Bridge>) -> Result<(), SandboxError> {
        self.context
            .with(|ctx| install(&ctx, name, bridge).catch(&ctx).map_err(|e| e.to_string()))
            .map_err(|message| SandboxError::BridgeInstall {
                name: name.to_string(),
                message,
            })?;
        self.bridge_name = Some(name.to_string());
        Ok(())
    }

    fn evaluate(&mut self, code: &str) -> Result<(), SandboxError> {
        if let Some(timeout) = self.limits.timeout {
            self.watchdog.arm(timeout);
        }

        let outcome = self.context.with(|ctx| {
            let completion = ctx
                .eval::<Value, _>(code)
                .catch(&ctx)
                .map_err(|e| e.to_string())?;
            drop(completion);
            Ok::<(), String>(())
        });

        match outcome {
            Ok(()) => Ok(()),
            Err(message) => Err(self
                .timed_out()
                .unwrap_or(SandboxError::GuestEvaluation(message))),
        }
    }

    fn drain_deferred(&mut self) -> Result<usize, SandboxError> {
        let mut ran = 0;
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => ran += 1,
                Ok(false) => break,
                Err(exception) => {
                    ran += 1;
                    let message = exception.0.with(|ctx| describe(&ctx, &ctx.catch()));
                    // The wrapped context holds no reference of its own; dropping it would free ours.
                    std::mem::forget(exception);
                    if let Some(err) = self.timed_out() {
                        return Err(err);
                    }
                    warn!(error = %message, "guest deferred task failed");
                }
            }
        }
        trace!(ran, "deferred queue drained");
        self.timed_out().map_or(Ok(ran), Err)
    }

    fn dispose(mut self) {
        if let Some(name) = self.bridge_name.take() {
            self.context.with(|ctx| {
                if ctx.globals().remove(name.as_str()).is_err() {
                    ctx.catch();
                }
            });
        }
        self.runtime.run_gc();
    }
}

impl Drop for QuickJsContext {
    fn drop(&mut self) {
        debug!("guest context released");
    }
}
