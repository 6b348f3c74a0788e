//! Test doubles shared by the workspace's integration tests.
//!
//! - [`RecordingHandler`] records every hook invocation in arrival order.
//! - [`CountingStore`] wraps an [`InMemoryOffsetStore`] and counts callback
//!   registrations, so duplicate subscriptions can be asserted directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName};
use offwatch_plugin::Handler;
use offwatch_store::{
    ConsumerCommitCallback, ConsumerOffset, HookError, HookResult, InMemoryOffsetStore,
    NewConsumerCallback, NewTopicCallback, OffsetStore, TopicMessageCallback,
};

/// A single hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    ConsumerDiscovered(String),
    TopicDiscovered(String),
    Commit {
        group_id: String,
        topic: String,
        partition: u32,
        offset: i64,
    },
    Message {
        topic: String,
        partition: u32,
        offset: i64,
    },
}

/// Handler that records everything it receives.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    dispatches: Mutex<Vec<Dispatch>>,
    failing_groups: Mutex<HashSet<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `on_consumer_discovered` fail for `group_id` (after recording it).
    pub fn fail_discovery_of(&self, group_id: &str) {
        self.failing_groups.lock().unwrap().insert(group_id.to_string());
    }

    /// Stop failing for every group.
    pub fn clear_failures(&self) {
        self.failing_groups.lock().unwrap().clear();
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches.lock().unwrap().clone()
    }

    pub fn discovered_consumers(&self) -> Vec<String> {
        self.dispatches()
            .into_iter()
            .filter_map(|d| match d {
                Dispatch::ConsumerDiscovered(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub fn discovered_topics(&self) -> Vec<String> {
        self.dispatches()
            .into_iter()
            .filter_map(|d| match d {
                Dispatch::TopicDiscovered(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Offsets committed by `group_id`, in dispatch order.
    pub fn commits_for(&self, group_id: &str) -> Vec<i64> {
        self.dispatches()
            .into_iter()
            .filter_map(|d| match d {
                Dispatch::Commit {
                    group_id: g,
                    offset,
                    ..
                } if g == group_id => Some(offset),
                _ => None,
            })
            .collect()
    }

    /// Head offsets dispatched for `topic`, in dispatch order.
    pub fn messages_for(&self, topic: &str) -> Vec<i64> {
        self.dispatches()
            .into_iter()
            .filter_map(|d| match d {
                Dispatch::Message {
                    topic: t, offset, ..
                } if t == topic => Some(offset),
                _ => None,
            })
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.dispatches()
            .iter()
            .filter(|d| matches!(d, Dispatch::Commit { .. }))
            .count()
    }

    pub fn message_count(&self) -> usize {
        self.dispatches()
            .iter()
            .filter(|d| matches!(d, Dispatch::Message { .. }))
            .count()
    }

    fn record(&self, dispatch: Dispatch) {
        self.dispatches.lock().unwrap().push(dispatch);
    }
}

impl Handler for RecordingHandler {
    fn on_consumer_discovered(&self, group_id: &ConsumerGroupId) -> HookResult {
        self.record(Dispatch::ConsumerDiscovered(group_id.to_string()));
        if self.failing_groups.lock().unwrap().contains(group_id.as_str()) {
            return Err(HookError::handler("on_consumer_discovered", group_id.to_string()));
        }
        Ok(())
    }

    fn on_topic_discovered(&self, topic: &TopicName) -> HookResult {
        self.record(Dispatch::TopicDiscovered(topic.to_string()));
        Ok(())
    }

    fn on_commit(
        &self,
        group_id: &ConsumerGroupId,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        self.record(Dispatch::Commit {
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            partition: partition.value(),
            offset: offset.value(),
        });
        Ok(())
    }

    fn on_message(&self, topic: &TopicName, partition: Partition, offset: Offset) -> HookResult {
        self.record(Dispatch::Message {
            topic: topic.to_string(),
            partition: partition.value(),
            offset: offset.value(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Registrations {
    new_consumer: usize,
    new_topic: usize,
    commits: HashMap<String, usize>,
    messages: HashMap<String, usize>,
}

/// Store wrapper counting every callback registration.
pub struct CountingStore {
    inner: InMemoryOffsetStore,
    registrations: Mutex<Registrations>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryOffsetStore::new(),
            registrations: Mutex::new(Registrations::default()),
        })
    }

    /// The wrapped store, used to feed events.
    pub fn inner(&self) -> &InMemoryOffsetStore {
        &self.inner
    }

    /// Record a commit, panicking if a callback fails.
    pub fn commit(&self, group_id: &str, topic: &str, partition: u32, offset: i64) {
        self.inner
            .store_consumer_offset(
                &ConsumerGroupId::new(group_id),
                &TopicName::new(topic),
                Partition::new(partition),
                Offset::new(offset),
            )
            .unwrap();
    }

    /// Record a head offset, panicking if a callback fails.
    pub fn advance(&self, topic: &str, partition: u32, offset: i64) {
        self.inner
            .store_topic_offset(
                &TopicName::new(topic),
                Partition::new(partition),
                Offset::new(offset),
            )
            .unwrap();
    }

    pub fn new_consumer_registrations(&self) -> usize {
        self.registrations.lock().unwrap().new_consumer
    }

    pub fn new_topic_registrations(&self) -> usize {
        self.registrations.lock().unwrap().new_topic
    }

    pub fn commit_registrations(&self, group_id: &str) -> usize {
        self.registrations
            .lock()
            .unwrap()
            .commits
            .get(group_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn message_registrations(&self, topic: &str) -> usize {
        self.registrations
            .lock()
            .unwrap()
            .messages
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Largest number of registrations issued for any single entity.
    pub fn max_registrations_per_entity(&self) -> usize {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .commits
            .values()
            .chain(registrations.messages.values())
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl OffsetStore for CountingStore {
    fn consumers(&self) -> Vec<ConsumerGroupId> {
        self.inner.consumers()
    }

    fn topics(&self) -> Vec<TopicName> {
        self.inner.topics()
    }

    fn consumer_offsets(&self, group_id: &ConsumerGroupId) -> Vec<ConsumerOffset> {
        self.inner.consumer_offsets(group_id)
    }

    fn topic_offset(&self, topic: &TopicName, partition: Partition) -> Option<Offset> {
        self.inner.topic_offset(topic, partition)
    }

    fn on_new_consumer(&self, callback: NewConsumerCallback) {
        self.registrations.lock().unwrap().new_consumer += 1;
        self.inner.on_new_consumer(callback);
    }

    fn on_new_topic(&self, callback: NewTopicCallback) {
        self.registrations.lock().unwrap().new_topic += 1;
        self.inner.on_new_topic(callback);
    }

    fn on_consumer_commit(&self, group_id: &ConsumerGroupId, callback: ConsumerCommitCallback) {
        *self
            .registrations
            .lock()
            .unwrap()
            .commits
            .entry(group_id.to_string())
            .or_default() += 1;
        self.inner.on_consumer_commit(group_id, callback);
    }

    fn on_topic_message(&self, topic: &TopicName, callback: TopicMessageCallback) {
        *self
            .registrations
            .lock()
            .unwrap()
            .messages
            .entry(topic.to_string())
            .or_default() += 1;
        self.inner.on_topic_message(topic, callback);
    }
}
