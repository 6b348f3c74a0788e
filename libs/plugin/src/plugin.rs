//! Plugin lifecycle.

use std::sync::Arc;

use offwatch_store::{HookError, OffsetStore};
use thiserror::Error;

/// Errors raised while launching a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin was already launched against a store.
    #[error("plugin {plugin} already launched")]
    AlreadyLaunched { plugin: &'static str },

    /// A hook failed while existing entities were being dispatched.
    #[error("hook failed during launch: {0}")]
    Hook(#[from] HookError),

    /// The plugin could not acquire a resource it needs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unit of behaviour driven by store events.
///
/// `launch` is called once, after the store has loaded its initial state.
/// Plugins build a [`SubscriptionManager`](crate::SubscriptionManager) over
/// the store and enable the categories they need.
pub trait Plugin: Send + Sync {
    /// Short, stable name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Attach the plugin to a store.
    fn launch(&self, store: Arc<dyn OffsetStore>) -> Result<(), PluginError>;
}
