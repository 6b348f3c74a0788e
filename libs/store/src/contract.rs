//! The capability set the subscription layer consumes from a store.

use std::sync::Arc;

use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName, TopicPartition};

use crate::HookError;

/// Result of a notification callback.
pub type HookResult = Result<(), HookError>;

/// Invoked once per newly discovered consumer group.
pub type NewConsumerCallback = Arc<dyn Fn(&ConsumerGroupId) -> HookResult + Send + Sync>;

/// Invoked once per newly discovered topic.
pub type NewTopicCallback = Arc<dyn Fn(&TopicName) -> HookResult + Send + Sync>;

/// Invoked for every commit of one consumer group: `(group_id, topic, partition, offset)`.
pub type ConsumerCommitCallback =
    Arc<dyn Fn(&ConsumerGroupId, &TopicName, Partition, Offset) -> HookResult + Send + Sync>;

/// Invoked for every head offset advance of one topic: `(topic, partition, offset)`.
pub type TopicMessageCallback =
    Arc<dyn Fn(&TopicName, Partition, Offset) -> HookResult + Send + Sync>;

/// Latest committed offset of a consumer group on a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOffset {
    pub group_id: ConsumerGroupId,
    pub topic_partition: TopicPartition,
    pub offset: Offset,
}

impl ConsumerOffset {
    pub fn new(group_id: ConsumerGroupId, topic_partition: TopicPartition, offset: Offset) -> Self {
        Self {
            group_id,
            topic_partition,
            offset,
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic_partition.topic
    }

    pub fn partition(&self) -> Partition {
        self.topic_partition.partition
    }
}

/// Source of consumer group and topic activity.
///
/// Implementations deliver notifications from whatever thread observes the
/// change. Every registration is kept for the lifetime of the store and
/// receives every matching event, so duplicate registrations mean duplicate
/// deliveries.
pub trait OffsetStore: Send + Sync {
    /// Snapshot of the consumer groups known right now.
    fn consumers(&self) -> Vec<ConsumerGroupId>;

    /// Snapshot of the topics known right now.
    fn topics(&self) -> Vec<TopicName>;

    /// Latest committed offsets of one consumer group.
    fn consumer_offsets(&self, group_id: &ConsumerGroupId) -> Vec<ConsumerOffset>;

    /// Latest head offset of a topic partition, if known.
    fn topic_offset(&self, topic: &TopicName, partition: Partition) -> Option<Offset>;

    /// Register for consumer groups discovered from now on.
    fn on_new_consumer(&self, callback: NewConsumerCallback);

    /// Register for topics discovered from now on.
    fn on_new_topic(&self, callback: NewTopicCallback);

    /// Register for commits of one consumer group.
    fn on_consumer_commit(&self, group_id: &ConsumerGroupId, callback: ConsumerCommitCallback);

    /// Register for head offset advances of one topic.
    fn on_topic_message(&self, topic: &TopicName, callback: TopicMessageCallback);
}

impl<S: OffsetStore + ?Sized> OffsetStore for Arc<S> {
    fn consumers(&self) -> Vec<ConsumerGroupId> {
        (**self).consumers()
    }

    fn topics(&self) -> Vec<TopicName> {
        (**self).topics()
    }

    fn consumer_offsets(&self, group_id: &ConsumerGroupId) -> Vec<ConsumerOffset> {
        (**self).consumer_offsets(group_id)
    }

    fn topic_offset(&self, topic: &TopicName, partition: Partition) -> Option<Offset> {
        (**self).topic_offset(topic, partition)
    }

    fn on_new_consumer(&self, callback: NewConsumerCallback) {
        (**self).on_new_consumer(callback)
    }

    fn on_new_topic(&self, callback: NewTopicCallback) {
        (**self).on_new_topic(callback)
    }

    fn on_consumer_commit(&self, group_id: &ConsumerGroupId, callback: ConsumerCommitCallback) {
        (**self).on_consumer_commit(group_id, callback)
    }

    fn on_topic_message(&self, topic: &TopicName, callback: TopicMessageCallback) {
        (**self).on_topic_message(topic, callback)
    }
}
