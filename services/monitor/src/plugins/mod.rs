//! Plugins shipped with the monitor.

pub mod event_log;
pub mod lag_report;

pub use event_log::{EventLog, EventLogPlugin};
pub use lag_report::{LagReport, LagReportPlugin};
