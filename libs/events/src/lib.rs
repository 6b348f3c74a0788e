//! # offwatch-events
//!
//! Event records and subscription categories shared by the store, the
//! subscription manager and the monitor service.
//!
//! ## Event Records
//!
//! The store only ever learns two facts:
//! - A consumer group committed an offset on a topic partition (`consumer_commit`)
//! - A topic partition advanced to a new head offset (`topic_offset`)
//!
//! Discovery of new consumer groups and topics is derived by the store from
//! the first record that mentions them.
//!
//! ## Feed Format
//!
//! Records are exchanged as JSON lines, one [`FeedRecord`] per line:
//!
//! ```text
//! {"type":"consumer_commit","group_id":"billing","topic":"orders","partition":0,"offset":41}
//! {"type":"topic_offset","topic":"orders","partition":0,"offset":57}
//! ```

mod error;
mod types;

pub use error::EventError;
pub use types::*;
