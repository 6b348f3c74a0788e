//! In-memory offset store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use offwatch_events::StoreEvent;
use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName, TopicPartition};
use tracing::{debug, trace};

use crate::contract::{
    ConsumerCommitCallback, ConsumerOffset, HookResult, NewConsumerCallback, NewTopicCallback,
    OffsetStore, TopicMessageCallback,
};
use crate::observer::{deliver, lock, Listeners, Observer};

#[derive(Default)]
struct Offsets {
    consumers: HashMap<ConsumerGroupId, BTreeMap<TopicPartition, Offset>>,
    topics: BTreeMap<TopicName, BTreeMap<Partition, Offset>>,
}

/// Offset store backed by in-process maps.
///
/// Writers call [`store_consumer_offset`](Self::store_consumer_offset) and
/// [`store_topic_offset`](Self::store_topic_offset); notifications run on the
/// writer's thread after the store's locks have been released.
pub struct InMemoryOffsetStore {
    offsets: Mutex<Offsets>,
    new_consumer: Listeners<dyn Fn(&ConsumerGroupId) -> HookResult + Send + Sync>,
    new_topic: Listeners<dyn Fn(&TopicName) -> HookResult + Send + Sync>,
    commits: Observer<
        ConsumerGroupId,
        dyn Fn(&ConsumerGroupId, &TopicName, Partition, Offset) -> HookResult + Send + Sync,
    >,
    messages:
        Observer<TopicName, dyn Fn(&TopicName, Partition, Offset) -> HookResult + Send + Sync>,
}

impl InMemoryOffsetStore {
    /// Create an empty store that delivers every notification.
    pub fn new() -> Self {
        Self::with_cooldown(Duration::ZERO)
    }

    /// Create an empty store that drops commit and message notifications for
    /// an entity arriving within `cooldown` of the previous delivered one.
    ///
    /// Offsets are recorded either way.
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            offsets: Mutex::new(Offsets::default()),
            new_consumer: Listeners::new(),
            new_topic: Listeners::new(),
            commits: Observer::with_cooldown(cooldown),
            messages: Observer::with_cooldown(cooldown),
        }
    }

    /// Record a consumer group commit.
    ///
    /// Fires new-consumer callbacks first if the group was unknown, then the
    /// group's commit callbacks. Returns the first callback error, if any.
    pub fn store_consumer_offset(
        &self,
        group_id: &ConsumerGroupId,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        let is_new = {
            let mut offsets = lock(&self.offsets);
            let is_new = !offsets.consumers.contains_key(group_id);
            offsets
                .consumers
                .entry(group_id.clone())
                .or_default()
                .insert(TopicPartition::new(topic.clone(), partition), offset);
            is_new
        };

        let mut result = Ok(());
        if is_new {
            debug!(group_id = %group_id, "Discovered consumer group");
            result = deliver(self.new_consumer.snapshot(), |cb| cb(group_id));
        }

        // Snapshot after discovery so callbacks registered by it see this commit.
        let commit_result = deliver(self.commits.due(group_id), |cb| {
            cb(group_id, topic, partition, offset)
        });
        trace!(
            group_id = %group_id,
            topic = %topic,
            partition = %partition,
            offset = %offset,
            "Stored consumer offset"
        );

        result.and(commit_result)
    }

    /// Record a topic partition's head offset.
    ///
    /// Fires new-topic callbacks first if the topic was unknown, then the
    /// topic's message callbacks. Returns the first callback error, if any.
    pub fn store_topic_offset(
        &self,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        let is_new = {
            let mut offsets = lock(&self.offsets);
            let is_new = !offsets.topics.contains_key(topic);
            offsets
                .topics
                .entry(topic.clone())
                .or_default()
                .insert(partition, offset);
            is_new
        };

        let mut result = Ok(());
        if is_new {
            debug!(topic = %topic, "Discovered topic");
            result = deliver(self.new_topic.snapshot(), |cb| cb(topic));
        }

        let message_result = deliver(self.messages.due(topic), |cb| cb(topic, partition, offset));
        trace!(topic = %topic, partition = %partition, offset = %offset, "Stored topic offset");

        result.and(message_result)
    }

    /// Apply a store event record.
    pub fn apply(&self, event: &StoreEvent) -> HookResult {
        match event {
            StoreEvent::ConsumerCommit {
                group_id,
                topic,
                partition,
                offset,
            } => self.store_consumer_offset(group_id, topic, *partition, *offset),
            StoreEvent::TopicOffset {
                topic,
                partition,
                offset,
            } => self.store_topic_offset(topic, *partition, *offset),
        }
    }

    /// Number of commit callbacks registered for a group.
    pub fn commit_observer_count(&self, group_id: &ConsumerGroupId) -> usize {
        self.commits.observer_count(group_id)
    }

    /// Number of message callbacks registered for a topic.
    pub fn message_observer_count(&self, topic: &TopicName) -> usize {
        self.messages.observer_count(topic)
    }
}

impl Default for InMemoryOffsetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn consumers(&self) -> Vec<ConsumerGroupId> {
        let offsets = lock(&self.offsets);
        let sorted: BTreeSet<_> = offsets.consumers.keys().cloned().collect();
        sorted.into_iter().collect()
    }

    fn topics(&self) -> Vec<TopicName> {
        lock(&self.offsets).topics.keys().cloned().collect()
    }

    fn consumer_offsets(&self, group_id: &ConsumerGroupId) -> Vec<ConsumerOffset> {
        let offsets = lock(&self.offsets);
        let Some(partitions) = offsets.consumers.get(group_id) else {
            return Vec::new();
        };
        partitions
            .iter()
            .map(|(tp, offset)| ConsumerOffset::new(group_id.clone(), tp.clone(), *offset))
            .collect()
    }

    fn topic_offset(&self, topic: &TopicName, partition: Partition) -> Option<Offset> {
        lock(&self.offsets)
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied()
    }

    fn on_new_consumer(&self, callback: NewConsumerCallback) {
        self.new_consumer.add(callback);
    }

    fn on_new_topic(&self, callback: NewTopicCallback) {
        self.new_topic.add(callback);
    }

    fn on_consumer_commit(&self, group_id: &ConsumerGroupId, callback: ConsumerCommitCallback) {
        self.commits.observe(group_id.clone(), callback);
    }

    fn on_topic_message(&self, topic: &TopicName, callback: TopicMessageCallback) {
        self.messages.observe(topic.clone(), callback);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::HookError;

    fn group(s: &str) -> ConsumerGroupId {
        ConsumerGroupId::new(s)
    }

    fn topic(s: &str) -> TopicName {
        TopicName::new(s)
    }

    #[test]
    fn test_enumeration_and_point_queries() {
        let store = InMemoryOffsetStore::new();
        store
            .store_consumer_offset(
                &group("g2"),
                &topic("orders"),
                Partition::new(0),
                Offset::new(5),
            )
            .unwrap();
        store
            .store_consumer_offset(
                &group("g1"),
                &topic("orders"),
                Partition::new(1),
                Offset::new(7),
            )
            .unwrap();
        store
            .store_topic_offset(&topic("orders"), Partition::new(1), Offset::new(10))
            .unwrap();

        assert_eq!(store.consumers(), vec![group("g1"), group("g2")]);
        assert_eq!(store.topics(), vec![topic("orders")]);
        assert_eq!(
            store.topic_offset(&topic("orders"), Partition::new(1)),
            Some(Offset::new(10))
        );
        assert_eq!(store.topic_offset(&topic("orders"), Partition::new(0)), None);

        let offsets = store.consumer_offsets(&group("g1"));
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].partition(), Partition::new(1));
        assert_eq!(offsets[0].offset, Offset::new(7));
        assert!(store.consumer_offsets(&group("nope")).is_empty());
    }

    #[test]
    fn test_commit_overwrites_latest_offset() {
        let store = InMemoryOffsetStore::new();
        let g = group("g");
        let t = topic("t");
        store.store_consumer_offset(&g, &t, Partition::new(0), Offset::new(1)).unwrap();
        store.store_consumer_offset(&g, &t, Partition::new(0), Offset::new(4)).unwrap();
        let offsets = store.consumer_offsets(&g);
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].offset, Offset::new(4));
    }

    #[test]
    fn test_new_consumer_fires_once_and_group_is_enumerable() {
        let store = Arc::new(InMemoryOffsetStore::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let store_ref = Arc::clone(&store);
        let seen_ref = Arc::clone(&seen);
        store.on_new_consumer(Arc::new(move |g: &ConsumerGroupId| {
            assert!(store_ref.consumers().contains(g));
            seen_ref.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let g = group("g");
        store.store_consumer_offset(&g, &topic("t"), Partition::new(0), Offset::new(1)).unwrap();
        store.store_consumer_offset(&g, &topic("t"), Partition::new(0), Offset::new(2)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discovery_callback_registration_sees_triggering_commit() {
        let store = Arc::new(InMemoryOffsetStore::new());
        let commits = Arc::new(AtomicUsize::new(0));

        let store_ref = Arc::clone(&store);
        let commits_ref = Arc::clone(&commits);
        store.on_new_consumer(Arc::new(move |g: &ConsumerGroupId| {
            let commits = Arc::clone(&commits_ref);
            store_ref.on_consumer_commit(
                g,
                Arc::new(move |_, _, _, _| {
                    commits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
            Ok(())
        }));

        store
            .store_consumer_offset(&group("g"), &topic("t"), Partition::new(0), Offset::new(1))
            .unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_registrations_are_not_deduplicated() {
        let store = InMemoryOffsetStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let t = topic("t");
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            store.on_topic_message(
                &t,
                Arc::new(move |_, _, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        store.store_topic_offset(&t, Partition::new(0), Offset::new(3)).unwrap();
        assert_eq!(store.message_observer_count(&t), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_error_is_returned_and_offset_recorded() {
        let store = InMemoryOffsetStore::new();
        let t = topic("t");
        store.on_new_topic(Arc::new(|_| Err(HookError::handler("new_topic", "nope"))));
        let result = store.store_topic_offset(&t, Partition::new(0), Offset::new(3));
        assert!(matches!(result, Err(HookError::Handler { hook: "new_topic", .. })));
        assert_eq!(store.topic_offset(&t, Partition::new(0)), Some(Offset::new(3)));
    }

    #[test]
    fn test_cooldown_drops_notifications_but_keeps_offsets() {
        let store = InMemoryOffsetStore::with_cooldown(Duration::from_secs(3600));
        let calls = Arc::new(AtomicUsize::new(0));
        let g = group("g");
        let calls_ref = Arc::clone(&calls);
        store.on_consumer_commit(
            &g,
            Arc::new(move |_, _, _, _| {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        store.store_consumer_offset(&g, &topic("t"), Partition::new(0), Offset::new(1)).unwrap();
        store.store_consumer_offset(&g, &topic("t"), Partition::new(0), Offset::new(2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.consumer_offsets(&g)[0].offset, Offset::new(2));
    }

    #[test]
    fn test_apply_routes_events() {
        let store = InMemoryOffsetStore::new();
        store
            .apply(&StoreEvent::TopicOffset {
                topic: topic("t"),
                partition: Partition::new(2),
                offset: Offset::new(8),
            })
            .unwrap();
        store
            .apply(&StoreEvent::ConsumerCommit {
                group_id: group("g"),
                topic: topic("t"),
                partition: Partition::new(2),
                offset: Offset::new(6),
            })
            .unwrap();
        assert_eq!(store.topics(), vec![topic("t")]);
        assert_eq!(store.consumers(), vec![group("g")]);
    }
}
