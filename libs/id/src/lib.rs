//! # offwatch-id
//!
//! Typed identifiers for the entities reported by an offset store.
//!
//! ## Design Principles
//!
//! - Names are opaque: the store decides what a consumer group or topic is called
//! - A name is never empty; everything else is forwarded as-is
//! - Names and numeric positions are typed so a topic can't be passed where a
//!   consumer group is expected
//!
//! ## Types
//!
//! - [`ConsumerGroupId`]: a consumer group as reported by the store
//! - [`TopicName`]: a topic as reported by the store
//! - [`Partition`]: a partition index, scoped to a topic
//! - [`Offset`]: a position within a partition
//! - [`TopicPartition`]: the (topic, partition) pair offsets are keyed by

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
