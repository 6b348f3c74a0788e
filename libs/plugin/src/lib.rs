//! Subscription fan-out primitives.
//!
//! This library sits between an [`OffsetStore`] and a plugin's hooks. Key
//! concepts:
//!
//! - **Handler**: the four hooks a plugin may implement, all defaulting to no-ops.
//! - **Subscription manager**: opts a handler into event categories and
//!   reconciles "what exists now" with "what will exist next".
//! - **Lag tracker**: a handler that turns commits and head offsets into
//!   consumer lag updates.
//!
//! # Invariants
//!
//! - Each entity is registered with the store at most once per tracking category
//! - Each entity is dispatched to a discovery hook at most once
//! - A newly discovered entity is registered for tracking before its
//!   discovery hook runs
//! - Hook errors are returned to the caller of the dispatch path untouched

mod handler;
mod lag;
mod manager;
mod plugin;

pub use handler::Handler;
pub use lag::{LagEntry, LagHandler, LagTracker};
pub use manager::SubscriptionManager;
pub use plugin::{Plugin, PluginError};

pub use offwatch_events::SubscriptionCategory;
pub use offwatch_store::{HookError, HookResult, OffsetStore};
