use std::rc::Rc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::bridge::{Bridge, Captured};
use crate::engine::{Engine, GuestContext};
use crate::error::SandboxError;
use crate::verifier::Verifier;

/// Name of the bridge function in the guest's global scope.
pub const DEFAULT_BRIDGE_NAME: &str = "verify";

/// Runs guest programs, one fresh context per run.
pub struct Sandbox<E> {
    engine: E,
    bridge_name: String,
}

impl<E: Engine> Sandbox<E> {
    pub fn new(engine: E) -> Self {
        Sandbox {
            engine,
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
        }
    }

    pub fn with_bridge_name(mut self, name: impl Into<String>) -> Self {
        self.bridge_name = name.into();
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn bridge_name(&self) -> &str {
        &self.bridge_name
    }

    /// Evaluate `code` in an isolated context and return what the bridge captured.
    ///
    /// Order of completion: synchronous evaluation, then the guest's deferred queue
    /// is drained, then every pending host verification is awaited (concurrently).
    /// A guest that calls the bridge from a promise callback is therefore observed
    /// before the pending host work is collected.
    ///
    /// The context is released on every path; an early `?` drops it.
    pub async fn execute(
        &self,
        code: &str,
        verifier: Rc<dyn Verifier>,
    ) -> Result<Captured, SandboxError> {
        let bridge = Rc::new(Bridge::new(verifier));

        let mut context = self.engine.acquire().await?;
        context.install_bridge(&self.bridge_name, Rc::clone(&bridge))?;
        context.evaluate(code)?;
        context.drain_deferred()?;

        let pending = bridge.take_pending();
        if !pending.is_empty() {
            debug!(count = pending.len(), "awaiting host verification");
            join_all(pending).await;
        }

        context.dispose();
        if Rc::strong_count(&bridge) != 1 {
            warn!("bridge function outlived its guest context");
        }
        Ok(bridge.captured())
    }
}
