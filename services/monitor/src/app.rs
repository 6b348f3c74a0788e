//! Application wiring.
//!
//! The application owns the store and the plugins. It applies the feed
//! backlog first, launches every plugin once, then optionally keeps
//! following the feed.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use offwatch_plugin::{OffsetStore, Plugin};
use offwatch_store::InMemoryOffsetStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    feed::{self, FeedReader, FeedStats},
    plugins::{EventLogPlugin, LagReportPlugin},
    status::StatusState,
};

pub struct Application {
    store: Arc<InMemoryOffsetStore>,
    plugins: Vec<Arc<dyn Plugin>>,
    status: Option<StatusState>,
    launched: bool,
}

impl Application {
    /// An application with no plugins.
    pub fn new(store: Arc<InMemoryOffsetStore>) -> Self {
        Self {
            store,
            plugins: Vec::new(),
            status: None,
            launched: false,
        }
    }

    /// Build the store and the configured plugins.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(InMemoryOffsetStore::with_cooldown(config.notify_cooldown));
        let mut app = Self::new(store);
        let plugins = config.plugins.resolved();

        let event_log = if plugins.event_log {
            let plugin = EventLogPlugin::create(&config.event_log_path).with_context(|| {
                format!(
                    "Failed to open event log {}",
                    config.event_log_path.display()
                )
            })?;
            let plugin = Arc::new(plugin);
            app.add_plugin(plugin.clone());
            Some(plugin)
        } else {
            None
        };

        let lag_report = if plugins.lag_report {
            let plugin = Arc::new(LagReportPlugin::new());
            app.add_plugin(plugin.clone());
            Some(plugin)
        } else {
            None
        };

        if plugins.status {
            if let (Some(event_log), Some(lag_report)) = (event_log, lag_report) {
                app.status = Some(StatusState::new(event_log, lag_report));
            }
        }

        Ok(app)
    }

    pub fn store(&self) -> &Arc<InMemoryOffsetStore> {
        &self.store
    }

    /// State for the status routes, when the status plugin is configured.
    pub fn status(&self) -> Option<&StatusState> {
        self.status.as_ref()
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Launch every plugin against the store. Returns how many launched.
    ///
    /// Only the first call does anything. A plugin that fails to launch is
    /// logged and the rest are still launched.
    pub fn launch_plugins(&mut self) -> usize {
        if self.launched {
            warn!("Plugins already launched");
            return 0;
        }
        self.launched = true;
        launch_all(&self.plugins, self.store.clone())
    }

    /// Apply the backlog, launch plugins, then follow the feed if
    /// `follow` carries a poll interval.
    pub async fn run(
        mut self,
        reader: FeedReader,
        follow: Option<Duration>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<FeedStats> {
        let (reader, backlog) = feed::read_blocking(reader, Arc::clone(&self.store))
            .await
            .context("Failed to load feed backlog")?;
        info!(
            path = %reader.path().display(),
            applied = backlog.applied,
            skipped = backlog.skipped,
            failed = backlog.failed,
            consumers = self.store.consumers().len(),
            topics = self.store.topics().len(),
            "Feed backlog loaded"
        );

        if !self.launched {
            self.launched = true;
            let plugins = self.plugins.clone();
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || launch_all(&plugins, store))
                .await
                .context("Plugin launch task failed")?;
        }

        let Some(poll_interval) = follow else {
            return Ok(backlog);
        };

        let store = Arc::clone(&self.store);
        let followed = feed::run_follow_loop(reader, store, poll_interval, shutdown)
            .await
            .context("Feed follower failed")?;

        Ok(FeedStats {
            applied: backlog.applied + followed.applied,
            skipped: backlog.skipped + followed.skipped,
            failed: backlog.failed + followed.failed,
        })
    }
}

/// Launch each plugin, logging failures. Returns how many launched.
fn launch_all(plugins: &[Arc<dyn Plugin>], store: Arc<InMemoryOffsetStore>) -> usize {
    let store: Arc<dyn OffsetStore> = store;
    let mut launched = 0;
    for plugin in plugins {
        match plugin.launch(Arc::clone(&store)) {
            Ok(()) => launched += 1,
            Err(e) => error!(plugin = plugin.name(), error = %e, "Plugin launch failed"),
        }
    }

    info!(launched, configured = plugins.len(), "Plugins launched");
    launched
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use offwatch_plugin::PluginError;

    use super::*;
    use crate::config::PluginSet;

    struct Failing;

    impl Plugin for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn launch(&self, _store: Arc<dyn OffsetStore>) -> Result<(), PluginError> {
            Err(PluginError::Io(std::io::Error::other("no disk")))
        }
    }

    fn config(dir: &std::path::Path, plugins: PluginSet) -> Config {
        Config {
            feed_path: dir.join("feed.jsonl"),
            follow: false,
            poll_interval: Duration::from_millis(50),
            notify_cooldown: Duration::ZERO,
            plugins,
            event_log_path: dir.join("events"),
            status_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_from_config_builds_selected_plugins() {
        let dir = tempfile::tempdir().unwrap();

        let app = Application::from_config(&config(dir.path(), PluginSet::ALL)).unwrap();
        assert_eq!(app.plugin_names(), vec!["event-log", "lag-report"]);
        assert!(app.status().is_some());

        let only_lag = PluginSet::parse("lag-report").unwrap();
        let app = Application::from_config(&config(dir.path(), only_lag)).unwrap();
        assert_eq!(app.plugin_names(), vec!["lag-report"]);
        assert!(app.status().is_none());
    }

    #[test]
    fn test_status_alone_brings_its_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let status_only = PluginSet {
            event_log: false,
            lag_report: false,
            status: true,
        };

        let app = Application::from_config(&config(dir.path(), status_only)).unwrap();
        assert_eq!(app.plugin_names(), vec!["event-log", "lag-report"]);
        assert!(app.status().is_some());
    }

    #[tokio::test]
    async fn test_run_launches_plugins_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), PluginSet::ALL);
        std::fs::write(
            &cfg.feed_path,
            "{\"type\":\"topic_offset\",\"topic\":\"orders\",\"partition\":0,\"offset\":3}\n",
        )
        .unwrap();

        let app = Application::from_config(&cfg).unwrap();
        let status = app.status().cloned().unwrap();
        let (_tx, rx) = watch::channel(false);
        let stats = app.run(FeedReader::new(&cfg.feed_path), None, rx).await.unwrap();

        assert_eq!(stats.applied, 1);
        assert!(status.event_log().is_launched());
        assert!(matches!(
            status.event_log().launch(Arc::new(InMemoryOffsetStore::new())),
            Err(PluginError::AlreadyLaunched { .. })
        ));
    }

    #[test]
    fn test_event_log_path_error_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let mut cfg = config(dir.path(), PluginSet::ALL);
        cfg.event_log_path = PathBuf::from(&blocker).join("events");
        let err = Application::from_config(&cfg).err().unwrap();
        assert!(err.to_string().contains("Failed to open event log"));
    }

    #[test]
    fn test_launch_failure_does_not_stop_others() {
        let mut app = Application::new(Arc::new(InMemoryOffsetStore::new()));
        app.add_plugin(Arc::new(Failing));
        app.add_plugin(Arc::new(LagReportPlugin::new()));

        assert_eq!(app.launch_plugins(), 1);
        assert_eq!(app.launch_plugins(), 0);
    }
}
