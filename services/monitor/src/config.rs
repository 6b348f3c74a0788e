//! Monitor configuration.
//!
//! Everything is env-driven. Parsing goes through a lookup function so tests
//! can supply values without touching the process environment.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

/// Which plugins to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginSet {
    pub event_log: bool,
    pub lag_report: bool,
    pub status: bool,
}

impl PluginSet {
    /// Every plugin enabled.
    pub const ALL: Self = Self {
        event_log: true,
        lag_report: true,
        status: true,
    };

    /// Parse a comma-separated list such as `event-log,lag-report`.
    ///
    /// `status` serves the state of the other two, so it enables them.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut set = Self {
            event_log: false,
            lag_report: false,
            status: false,
        };

        for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "event-log" => set.event_log = true,
                "lag-report" => set.lag_report = true,
                "status" => set.status = true,
                other => bail!(
                    "Unknown plugin '{other}' in OFFWATCH_PLUGINS. \
                     Expected event-log, lag-report or status."
                ),
            }
        }

        Ok(set.resolved())
    }

    /// The set with the plugins `status` depends on switched on.
    pub fn resolved(self) -> Self {
        Self {
            event_log: self.event_log || self.status,
            lag_report: self.lag_report || self.status,
            status: self.status,
        }
    }
}

/// Monitor configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-lines file the store is fed from.
    pub feed_path: PathBuf,

    /// Keep tailing the feed after the backlog has been applied.
    pub follow: bool,

    /// Poll interval while tailing.
    pub poll_interval: Duration,

    /// Per-entity notification cool-down in the store.
    pub notify_cooldown: Duration,

    /// Plugins to launch.
    pub plugins: PluginSet,

    /// Output file of the event-log plugin.
    pub event_log_path: PathBuf,

    /// Listen address of the status server.
    pub status_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let feed_path = lookup("OFFWATCH_FEED_PATH")
            .map(PathBuf::from)
            .context("Missing feed path. Set OFFWATCH_FEED_PATH to a JSON-lines event file.")?;

        let follow = lookup("OFFWATCH_FOLLOW")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let poll_interval_ms: u64 = lookup("OFFWATCH_POLL_INTERVAL_MS")
            .map(|v| v.parse())
            .transpose()
            .context("OFFWATCH_POLL_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(1000);
        let poll_interval = Duration::from_millis(poll_interval_ms.max(50));

        let cooldown_ms: u64 = lookup("OFFWATCH_NOTIFY_COOLDOWN_MS")
            .map(|v| v.parse())
            .transpose()
            .context("OFFWATCH_NOTIFY_COOLDOWN_MS must be an integer (milliseconds).")?
            .unwrap_or(0);

        let plugins = match lookup("OFFWATCH_PLUGINS") {
            Some(raw) => PluginSet::parse(&raw)?,
            None => PluginSet::ALL,
        };

        let event_log_path = lookup("OFFWATCH_EVENT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/events"));

        let status_addr = lookup("OFFWATCH_STATUS_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("OFFWATCH_STATUS_ADDR must be a socket address (host:port).")?;

        let log_level = lookup("OFFWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            feed_path,
            follow,
            poll_interval,
            notify_cooldown: Duration::from_millis(cooldown_ms),
            plugins,
            event_log_path,
            status_addr,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("OFFWATCH_FEED_PATH", "/var/feed.jsonl")])).unwrap();
        assert_eq!(config.feed_path, PathBuf::from("/var/feed.jsonl"));
        assert!(!config.follow);
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.notify_cooldown, Duration::ZERO);
        assert_eq!(config.plugins, PluginSet::ALL);
        assert_eq!(config.event_log_path, PathBuf::from("/tmp/events"));
        assert_eq!(config.status_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_feed_path() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OFFWATCH_FEED_PATH"));
    }

    #[test]
    fn test_poll_interval_floor() {
        let config = Config::from_lookup(lookup(&[
            ("OFFWATCH_FEED_PATH", "f"),
            ("OFFWATCH_POLL_INTERVAL_MS", "5"),
            ("OFFWATCH_FOLLOW", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert!(config.follow);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(Config::from_lookup(lookup(&[
            ("OFFWATCH_FEED_PATH", "f"),
            ("OFFWATCH_NOTIFY_COOLDOWN_MS", "soon"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("OFFWATCH_FEED_PATH", "f"),
            ("OFFWATCH_STATUS_ADDR", "localhost"),
        ]))
        .is_err());
    }

    #[rstest]
    #[case("event-log", true, false, false)]
    #[case("lag-report", false, true, false)]
    #[case(" event-log , lag-report ", true, true, false)]
    #[case("status", true, true, true)]
    #[case("", false, false, false)]
    fn test_plugin_set_parse(
        #[case] raw: &str,
        #[case] event_log: bool,
        #[case] lag_report: bool,
        #[case] status: bool,
    ) {
        let set = PluginSet::parse(raw).unwrap();
        assert_eq!(
            set,
            PluginSet {
                event_log,
                lag_report,
                status
            }
        );
    }

    #[test]
    fn test_plugin_set_unknown() {
        let err = PluginSet::parse("event-log,metrics").unwrap_err();
        assert!(err.to_string().contains("metrics"));
    }
}
