//! offwatch monitor
//!
//! Feeds an in-memory offset store from a JSON-lines event file and runs
//! plugins against it:
//! - `event-log` writes every discovery, commit and head move to a file
//! - `lag-report` computes consumer lag and logs it
//! - `status` serves both plugins' state over HTTP

pub mod app;
pub mod config;
pub mod feed;
pub mod plugins;
pub mod status;

pub use app::Application;
pub use config::{Config, PluginSet};
pub use feed::{FeedError, FeedReader, FeedStats};
