// ── Process lifecycle ──
//
// Ordered stop hooks. Components register a hook once they own something
// that must be torn down; the binary runs them all on shutdown.

use futures_util::future::BoxFuture;
use tracing::{debug, error};

use crate::error::CoreError;

/// Something that must be stopped when the process shuts down.
pub trait StopHook: Send + Sync {
    /// Name used in shutdown logs.
    fn name(&self) -> &str;

    fn stop(&self) -> BoxFuture<'_, Result<(), CoreError>>;
}

/// Registered stop hooks, run in reverse registration order.
#[derive(Default)]
pub struct Lifecycle {
    hooks: Vec<Box<dyn StopHook>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, hook: impl StopHook + 'static) {
        debug!(hook = hook.name(), "stop hook registered");
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook, last registered first.
    ///
    /// All hooks run even if one fails; the first failure is returned.
    /// Hooks are consumed, so a second call does nothing.
    pub async fn stop(&mut self) -> Result<(), CoreError> {
        let mut first_err = None;

        while let Some(hook) = self.hooks.pop() {
            match hook.stop().await {
                Ok(()) => debug!(hook = hook.name(), "stopped"),
                Err(e) => {
                    error!(hook = hook.name(), error = %e, "stop hook failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("Lifecycle").field("hooks", &names).finish()
    }
}
