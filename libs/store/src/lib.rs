//! # offwatch-store
//!
//! The offset store contract and an in-memory implementation of it.
//!
//! ## Contract
//!
//! An [`OffsetStore`] answers two kinds of questions:
//! - Snapshot enumeration: which consumer groups and topics exist right now
//! - Live notification: call me when a group or topic appears, or when a
//!   group commits / a topic advances
//!
//! Registrations are append-only and are NOT deduplicated. Registering the
//! same callback twice delivers every event twice; callers that need
//! exactly-once delivery must register at most once per entity.
//!
//! ## In-memory store
//!
//! [`InMemoryOffsetStore`] keeps the latest offsets in memory and derives
//! discovery events from the first record that mentions a group or topic.
//! Entities become enumerable before their discovery notification fires.

mod contract;
mod error;
mod memory;
mod observer;

pub use contract::*;
pub use error::HookError;
pub use memory::InMemoryOffsetStore;
pub use observer::{Listeners, Observer};
