//! Event log plugin.
//!
//! Writes one human-readable line per store event to a file and remembers
//! which topics and consumer groups it has seen.

use std::{
    collections::BTreeSet,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName};
use offwatch_plugin::{
    Handler, HookResult, OffsetStore, Plugin, PluginError, SubscriptionCategory,
    SubscriptionManager,
};
use tracing::{info, warn};

pub const NAME: &str = "event-log";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handler side of the plugin: the log file plus discovered entities.
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
    topics: Mutex<BTreeSet<TopicName>>,
    consumers: Mutex<BTreeSet<ConsumerGroupId>>,
}

impl EventLog {
    /// Open (and truncate) the log file, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            topics: Mutex::new(BTreeSet::new()),
            consumers: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Topics seen so far, sorted.
    pub fn topics(&self) -> Vec<TopicName> {
        lock(&self.topics).iter().cloned().collect()
    }

    /// Consumer groups seen so far, sorted.
    pub fn consumers(&self) -> Vec<ConsumerGroupId> {
        lock(&self.consumers).iter().cloned().collect()
    }

    fn write_line(&self, line: &str) -> HookResult {
        let mut file = lock(&self.file);
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

impl Handler for EventLog {
    fn on_consumer_discovered(&self, group_id: &ConsumerGroupId) -> HookResult {
        lock(&self.consumers).insert(group_id.clone());
        self.write_line(&format!("New consumer {group_id} found"))
    }

    fn on_topic_discovered(&self, topic: &TopicName) -> HookResult {
        lock(&self.topics).insert(topic.clone());
        self.write_line(&format!("Found topic {topic}"))
    }

    fn on_commit(
        &self,
        group_id: &ConsumerGroupId,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        self.write_line(&format!(
            "Consumer {group_id} committed to {topic}/{partition} offset {offset}"
        ))
    }

    fn on_message(&self, topic: &TopicName, partition: Partition, offset: Offset) -> HookResult {
        self.write_line(&format!(
            "New offset for topic {topic}/{partition} at offset {offset}"
        ))
    }
}

/// Order in which categories are enabled on launch.
const CATEGORIES: [SubscriptionCategory; 4] = [
    SubscriptionCategory::ConsumerDiscovery,
    SubscriptionCategory::CommitTracking,
    SubscriptionCategory::TopicDiscovery,
    SubscriptionCategory::MessageTracking,
];

/// Logs every event in all four categories.
///
/// A launch whose replay hits a hook error still enables every category and
/// returns the first error. The plugin then counts as not launched, and a
/// later launch reuses the same manager to deliver what the replay missed.
pub struct EventLogPlugin {
    log: Arc<EventLog>,
    manager: Mutex<Option<SubscriptionManager<EventLog>>>,
    launched: AtomicBool,
}

impl EventLogPlugin {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            log: Arc::new(EventLog::create(path)?),
            manager: Mutex::new(None),
            launched: AtomicBool::new(false),
        })
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// True once a launch has completed without a hook error.
    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::Acquire)
    }

    /// The subscription manager, once a launch has been attempted.
    pub fn manager(&self) -> Option<SubscriptionManager<EventLog>> {
        lock(&self.manager).clone()
    }
}

impl Plugin for EventLogPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn launch(&self, store: Arc<dyn OffsetStore>) -> Result<(), PluginError> {
        // Held for the whole launch so concurrent launches serialize. Hooks
        // never touch this lock.
        let mut slot = lock(&self.manager);
        if self.is_launched() {
            return Err(PluginError::AlreadyLaunched { plugin: NAME });
        }
        let manager = slot
            .get_or_insert_with(|| SubscriptionManager::new(store, Arc::clone(&self.log)))
            .clone();

        let mut first_error = None;
        for category in CATEGORIES {
            if let Err(e) = manager.enable(category) {
                warn!(plugin = NAME, category = %category, error = %e, "Hook failed during launch");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
        self.launched.store(true, Ordering::Release);

        info!(
            plugin = NAME,
            path = %self.log.path().display(),
            topics = self.log.topics().len(),
            consumers = self.log.consumers().len(),
            "Plugin launched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use offwatch_store::InMemoryOffsetStore;

    use super::*;

    fn read(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_writes_existing_and_new_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events");

        let store = Arc::new(InMemoryOffsetStore::new());
        store
            .store_consumer_offset(
                &ConsumerGroupId::new("billing"),
                &TopicName::new("orders"),
                Partition::new(0),
                Offset::new(4),
            )
            .unwrap();

        let plugin = EventLogPlugin::create(&path).unwrap();
        plugin.launch(store.clone()).unwrap();

        store
            .store_topic_offset(&TopicName::new("orders"), Partition::new(0), Offset::new(7))
            .unwrap();
        store
            .store_consumer_offset(
                &ConsumerGroupId::new("billing"),
                &TopicName::new("orders"),
                Partition::new(0),
                Offset::new(6),
            )
            .unwrap();

        assert_eq!(
            read(&path),
            vec![
                "New consumer billing found",
                "Found topic orders",
                "New offset for topic orders/0 at offset 7",
                "Consumer billing committed to orders/0 offset 6",
            ]
        );
        assert_eq!(plugin.log().topics(), vec![TopicName::new("orders")]);
        assert_eq!(plugin.log().consumers(), vec![ConsumerGroupId::new("billing")]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_launch_wires_everything_and_can_retry() {
        let store = Arc::new(InMemoryOffsetStore::new());
        for group in ["g1", "g2"] {
            store
                .store_consumer_offset(
                    &ConsumerGroupId::new(group),
                    &TopicName::new("orders"),
                    Partition::new(0),
                    Offset::new(1),
                )
                .unwrap();
        }

        // Every write to /dev/full fails with ENOSPC.
        let plugin = EventLogPlugin::create(Path::new("/dev/full")).unwrap();
        assert!(matches!(
            plugin.launch(store.clone()),
            Err(PluginError::Hook(_))
        ));
        assert!(!plugin.is_launched());

        let manager = plugin.manager().unwrap();
        for category in CATEGORIES {
            assert!(manager.is_enabled(category), "{category} not enabled");
        }

        // The retry reaches g2, which the first replay stopped short of.
        assert!(matches!(
            plugin.launch(store.clone()),
            Err(PluginError::Hook(_))
        ));
        assert_eq!(
            plugin.log().consumers(),
            vec![ConsumerGroupId::new("g1"), ConsumerGroupId::new("g2")]
        );

        // Nothing left to replay.
        plugin.launch(store.clone()).unwrap();
        assert!(plugin.is_launched());
        assert!(matches!(
            plugin.launch(store),
            Err(PluginError::AlreadyLaunched { .. })
        ));
    }

    #[test]
    fn test_second_launch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryOffsetStore::new());
        let plugin = EventLogPlugin::create(&dir.path().join("events")).unwrap();

        plugin.launch(store.clone()).unwrap();
        assert!(plugin.is_launched());
        assert!(matches!(
            plugin.launch(store),
            Err(PluginError::AlreadyLaunched { plugin: NAME })
        ));
    }
}
