//! Plugin-facing hooks.

use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName};
use offwatch_store::HookResult;

/// Hooks a plugin implements to receive dispatched events.
///
/// Every hook defaults to a no-op, so a plugin only overrides the ones it
/// cares about. Hooks are called from whichever thread the store notifies
/// on, possibly concurrently; implementations use interior mutability.
pub trait Handler: Send + Sync + 'static {
    /// A consumer group was seen for the first time.
    fn on_consumer_discovered(&self, group_id: &ConsumerGroupId) -> HookResult {
        let _ = group_id;
        Ok(())
    }

    /// A topic was seen for the first time.
    fn on_topic_discovered(&self, topic: &TopicName) -> HookResult {
        let _ = topic;
        Ok(())
    }

    /// A consumer group committed `offset` on `topic`/`partition`.
    fn on_commit(
        &self,
        group_id: &ConsumerGroupId,
        topic: &TopicName,
        partition: Partition,
        offset: Offset,
    ) -> HookResult {
        let _ = (group_id, topic, partition, offset);
        Ok(())
    }

    /// `topic`/`partition` advanced to head `offset`.
    fn on_message(&self, topic: &TopicName, partition: Partition, offset: Offset) -> HookResult {
        let _ = (topic, partition, offset);
        Ok(())
    }
}
