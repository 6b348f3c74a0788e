//! Consumer lag tracking.
//!
//! Lag for a (group, topic, partition) is `max(0, head - committed)`. It is
//! reported whenever either side moves and the head is known.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName, TopicPartition};
use offwatch_store::{HookError, HookResult, OffsetStore};
use serde::Serialize;
use tracing::info;

use crate::{Handler, SubscriptionManager};

/// Receives lag updates computed by a [`LagTracker`].
pub trait LagHandler: Send + Sync + 'static {
    fn on_lag_update(
        &self,
        topic: &TopicName,
        partition: Partition,
        group_id: &ConsumerGroupId,
        lag: u64,
    ) -> HookResult;
}

/// Lag of one consumer group on one topic partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LagEntry {
    pub group_id: ConsumerGroupId,
    pub topic: TopicName,
    pub partition: Partition,
    pub committed: Offset,
    pub head: Offset,
    pub lag: u64,
}

#[derive(Debug, Default)]
struct PartitionLag {
    head: Option<Offset>,
    consumers: BTreeMap<ConsumerGroupId, Offset>,
}

/// Handler that maintains head and committed offsets per partition and
/// forwards lag changes to a [`LagHandler`].
pub struct LagTracker<L> {
    partitions: Mutex<BTreeMap<TopicPartition, PartitionLag>>,
    lag_handler: Arc<L>,
}

impl<L: LagHandler> LagTracker<L> {
    pub fn new(lag_handler: Arc<L>) -> Self {
        Self {
            partitions: Mutex::new(BTreeMap::new()),
            lag_handler,
        }
    }

    /// Build a tracker seeded from the store's current offsets and subscribe
    /// it to all four categories.
    pub fn attach(
        store: Arc<dyn OffsetStore>,
        lag_handler: Arc<L>,
    ) -> Result<SubscriptionManager<Self>, HookError> {
        let tracker = Arc::new(Self::new(lag_handler));
        tracker.seed(store.as_ref());

        let manager = SubscriptionManager::new(store, tracker);
        manager.enable_topic_discovery()?;
        manager.enable_message_tracking();
        manager.enable_consumer_discovery()?;
        manager.enable_commit_tracking();
        Ok(manager)
    }

    /// Load committed offsets and known head offsets without reporting lag.
    pub fn seed(&self, store: &dyn OffsetStore) {
        let mut partitions = self.lock();
        let mut seeded = 0usize;
        for group_id in store.consumers() {
            for consumer_offset in store.consumer_offsets(&group_id) {
                let tp = consumer_offset.topic_partition.clone();
                let entry = partitions.entry(tp).or_default();
                entry.consumers.insert(group_id.clone(), consumer_offset.offset);
                if entry.head.is_none() {
                    entry.head =
                        store.topic_offset(consumer_offset.topic(), consumer_offset.partition());
                }
                seeded += 1;
            }
        }
        info!(offsets = seeded, "Lag tracker seeded from store");
    }

    /// Current lag of every consumer on every partition with a known head.
    pub fn lag_snapshot(&self) -> Vec<LagEntry> {
        let partitions = self.lock();
        partitions
            .iter()
            .filter_map(|(tp, info)| info.head.map(|head| (tp, info, head)))
            .flat_map(|(tp, info, head)| {
                info.consumers.iter().map(move |(group_id, committed)| LagEntry {
                    group_id: group_id.clone(),
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    committed: *committed,
                    head,
                    lag: committed.lag_behind(head),
                })
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TopicPartition, PartitionLag>> {
        self.partitions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L: LagHandler> Handler for LagTracker<L> {
    fn on_commit(
        &self,
        group_id: &ConsumerGroupId,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        let head = {
            let mut partitions = self.lock();
            let entry = partitions
                .entry(TopicPartition::new(topic.clone(), partition))
                .or_default();
            entry.consumers.insert(group_id.clone(), offset);
            entry.head
        };

        match head {
            Some(head) => self
                .lag_handler
                .on_lag_update(topic, partition, group_id, offset.lag_behind(head)),
            None => Ok(()),
        }
    }

    fn on_message(&self, topic: &TopicName, partition: Partition, offset: Offset) -> HookResult {
        let updates: Vec<(ConsumerGroupId, u64)> = {
            let mut partitions = self.lock();
            let entry = partitions
                .entry(TopicPartition::new(topic.clone(), partition))
                .or_default();
            entry.head = Some(offset);
            entry
                .consumers
                .iter()
                .map(|(group_id, committed)| (group_id.clone(), committed.lag_behind(offset)))
                .collect()
        };

        let mut result = Ok(());
        for (group_id, lag) in updates {
            if let Err(e) = self.lag_handler.on_lag_update(topic, partition, &group_id, lag) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offwatch_events::SubscriptionCategory;
    use offwatch_store::InMemoryOffsetStore;

    #[derive(Default)]
    struct Updates(Mutex<Vec<(String, u32, String, u64)>>);

    impl LagHandler for Updates {
        fn on_lag_update(
            &self,
            topic: &TopicName,
            partition: Partition,
            group_id: &ConsumerGroupId,
            lag: u64,
        ) -> HookResult {
            self.0.lock().unwrap().push((
                topic.to_string(),
                partition.value(),
                group_id.to_string(),
                lag,
            ));
            Ok(())
        }
    }

    fn t() -> TopicName {
        TopicName::new("orders")
    }

    fn g(name: &str) -> ConsumerGroupId {
        ConsumerGroupId::new(name)
    }

    #[test]
    fn test_commit_without_head_reports_nothing() {
        let updates = Arc::new(Updates::default());
        let tracker = LagTracker::new(Arc::clone(&updates));
        tracker.on_commit(&g("g1"), &t(), Partition::new(0), Offset::new(5)).unwrap();
        assert!(updates.0.lock().unwrap().is_empty());
        assert!(tracker.lag_snapshot().is_empty());
    }

    #[test]
    fn test_message_reports_every_consumer() {
        let updates = Arc::new(Updates::default());
        let tracker = LagTracker::new(Arc::clone(&updates));
        tracker.on_commit(&g("g1"), &t(), Partition::new(0), Offset::new(5)).unwrap();
        tracker.on_commit(&g("g2"), &t(), Partition::new(0), Offset::new(8)).unwrap();
        tracker.on_message(&t(), Partition::new(0), Offset::new(10)).unwrap();

        let got = updates.0.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                ("orders".to_string(), 0, "g1".to_string(), 5),
                ("orders".to_string(), 0, "g2".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_commit_ahead_of_head_clamps_to_zero() {
        let updates = Arc::new(Updates::default());
        let tracker = LagTracker::new(Arc::clone(&updates));
        tracker.on_message(&t(), Partition::new(1), Offset::new(3)).unwrap();
        tracker.on_commit(&g("g1"), &t(), Partition::new(1), Offset::new(9)).unwrap();
        assert_eq!(updates.0.lock().unwrap().last().unwrap().3, 0);
    }

    #[test]
    fn test_attach_seeds_from_store_and_tracks() {
        let store = Arc::new(InMemoryOffsetStore::new());
        store
            .store_topic_offset(&t(), Partition::new(0), Offset::new(20))
            .unwrap();
        store
            .store_consumer_offset(&g("g1"), &t(), Partition::new(0), Offset::new(15))
            .unwrap();

        let updates = Arc::new(Updates::default());
        let manager = LagTracker::attach(store.clone(), Arc::clone(&updates)).unwrap();

        let snapshot = manager.handler().lag_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].lag, 5);
        assert!(updates.0.lock().unwrap().is_empty());

        store
            .store_topic_offset(&t(), Partition::new(0), Offset::new(30))
            .unwrap();
        store
            .store_consumer_offset(&g("g1"), &t(), Partition::new(0), Offset::new(28))
            .unwrap();

        let got = updates.0.lock().unwrap().clone();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].3, 15);
        assert_eq!(got[1].3, 2);
        for category in SubscriptionCategory::ALL {
            assert!(manager.is_enabled(category));
        }
    }
}
