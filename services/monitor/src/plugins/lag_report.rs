//! Lag report plugin.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};

use offwatch_id::{ConsumerGroupId, Partition, TopicName, TopicPartition};
use offwatch_plugin::{
    HookResult, LagEntry, LagHandler, LagTracker, OffsetStore, Plugin, PluginError,
    SubscriptionManager,
};
use tracing::info;

pub const NAME: &str = "lag-report";

type LagKey = (ConsumerGroupId, TopicPartition);

/// Reports lag changes as structured log events and keeps the latest value.
#[derive(Default)]
pub struct LagReport {
    latest: Mutex<BTreeMap<LagKey, u64>>,
    updates: AtomicU64,
}

impl LagReport {
    /// Most recently reported lag for a group on a partition.
    pub fn latest(&self, group_id: &ConsumerGroupId, tp: &TopicPartition) -> Option<u64> {
        self.lock().get(&(group_id.clone(), tp.clone())).copied()
    }

    /// Number of lag updates received.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<LagKey, u64>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LagHandler for LagReport {
    fn on_lag_update(
        &self,
        topic: &TopicName,
        partition: Partition,
        group_id: &ConsumerGroupId,
        lag: u64,
    ) -> HookResult {
        let tp = TopicPartition::new(topic.clone(), partition);
        info!(
            group_id = %group_id,
            topic = %topic,
            partition = %partition,
            lag,
            "Consumer {group_id} has {lag} lag on {tp}"
        );
        self.lock().insert((group_id.clone(), tp), lag);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Computes consumer lag through a [`LagTracker`].
///
/// The tracker is published only after it has attached cleanly. A failed
/// attach drops its manager, which turns its store callbacks into no-ops,
/// and the plugin can be launched again.
#[derive(Default)]
pub struct LagReportPlugin {
    report: Arc<LagReport>,
    launching: Mutex<()>,
    manager: OnceLock<SubscriptionManager<LagTracker<LagReport>>>,
}

impl LagReportPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &Arc<LagReport> {
        &self.report
    }

    pub fn is_launched(&self) -> bool {
        self.manager.get().is_some()
    }

    /// Current lag of every tracked consumer. Empty before launch.
    pub fn snapshot(&self) -> Vec<LagEntry> {
        self.manager
            .get()
            .map(|manager| manager.handler().lag_snapshot())
            .unwrap_or_default()
    }
}

impl Plugin for LagReportPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn launch(&self, store: Arc<dyn OffsetStore>) -> Result<(), PluginError> {
        let _launching = self.launching.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_launched() {
            return Err(PluginError::AlreadyLaunched { plugin: NAME });
        }

        let manager = LagTracker::attach(store, Arc::clone(&self.report))?;
        let tracked = manager.handler().lag_snapshot().len();
        if self.manager.set(manager).is_err() {
            return Err(PluginError::AlreadyLaunched { plugin: NAME });
        }

        info!(plugin = NAME, tracked, "Plugin launched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use offwatch_id::Offset;
    use offwatch_store::InMemoryOffsetStore;

    use super::*;

    #[test]
    fn test_reports_latest_lag() {
        let store = Arc::new(InMemoryOffsetStore::new());
        let orders = TopicName::new("orders");
        let billing = ConsumerGroupId::new("billing");

        store
            .store_topic_offset(&orders, Partition::new(2), Offset::new(100))
            .unwrap();
        store
            .store_consumer_offset(&billing, &orders, Partition::new(2), Offset::new(90))
            .unwrap();

        let plugin = LagReportPlugin::new();
        assert!(plugin.snapshot().is_empty());
        plugin.launch(store.clone()).unwrap();
        assert_eq!(plugin.snapshot()[0].lag, 10);

        store
            .store_topic_offset(&orders, Partition::new(2), Offset::new(120))
            .unwrap();

        let tp = TopicPartition::new(orders.clone(), Partition::new(2));
        assert_eq!(plugin.report().latest(&billing, &tp), Some(30));
        assert_eq!(plugin.report().updates(), 1);
        assert_eq!(plugin.snapshot()[0].lag, 30);
    }

    #[test]
    fn test_concurrent_launches_attach_once() {
        let store = Arc::new(InMemoryOffsetStore::new());
        let orders = TopicName::new("orders");
        store
            .store_consumer_offset(
                &ConsumerGroupId::new("billing"),
                &orders,
                Partition::new(0),
                Offset::new(1),
            )
            .unwrap();

        let plugin = Arc::new(LagReportPlugin::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let plugin = Arc::clone(&plugin);
                let store = store.clone();
                std::thread::spawn(move || plugin.launch(store).is_ok())
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(succeeded, 1);
        assert!(plugin.is_launched());

        // One tracker attached, so one lag update per head move.
        store
            .store_topic_offset(&orders, Partition::new(0), Offset::new(4))
            .unwrap();
        assert_eq!(plugin.report().updates(), 1);
    }

    #[test]
    fn test_second_launch_rejected() {
        let store = Arc::new(InMemoryOffsetStore::new());
        let plugin = LagReportPlugin::new();
        plugin.launch(store.clone()).unwrap();
        assert!(matches!(
            plugin.launch(store),
            Err(PluginError::AlreadyLaunched { .. })
        ));
    }
}
