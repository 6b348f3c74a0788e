//! Event record and subscription category definitions.

use chrono::{DateTime, Utc};
use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName, TopicPartition};
use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Subscription Categories
// =============================================================================

/// The four independent event streams a plugin can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionCategory {
    /// New consumer groups.
    ConsumerDiscovery,
    /// New topics.
    TopicDiscovery,
    /// Offset commits of every known consumer group.
    CommitTracking,
    /// Head offset advances of every known topic.
    MessageTracking,
}

impl SubscriptionCategory {
    /// Every category, in activation order used by full-featured plugins.
    pub const ALL: [SubscriptionCategory; 4] = [
        SubscriptionCategory::ConsumerDiscovery,
        SubscriptionCategory::CommitTracking,
        SubscriptionCategory::TopicDiscovery,
        SubscriptionCategory::MessageTracking,
    ];

    /// Returns true for the two discovery categories.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Self::ConsumerDiscovery | Self::TopicDiscovery)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsumerDiscovery => "consumer_discovery",
            Self::TopicDiscovery => "topic_discovery",
            Self::CommitTracking => "commit_tracking",
            Self::MessageTracking => "message_tracking",
        }
    }
}

impl std::fmt::Display for SubscriptionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionCategory {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer_discovery" => Ok(Self::ConsumerDiscovery),
            "topic_discovery" => Ok(Self::TopicDiscovery),
            "commit_tracking" => Ok(Self::CommitTracking),
            "message_tracking" => Ok(Self::MessageTracking),
            other => Err(EventError::UnknownCategory(other.to_string())),
        }
    }
}

// =============================================================================
// Store Events
// =============================================================================

/// Event type tag for consumer commits.
pub const CONSUMER_COMMIT: &str = "consumer_commit";

/// Event type tag for topic head offset updates.
pub const TOPIC_OFFSET: &str = "topic_offset";

/// A fact learned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A consumer group committed `offset` on `topic`/`partition`.
    ConsumerCommit {
        group_id: ConsumerGroupId,
        topic: TopicName,
        partition: Partition,
        offset: Offset,
    },

    /// `topic`/`partition` advanced to head `offset`.
    TopicOffset {
        topic: TopicName,
        partition: Partition,
        offset: Offset,
    },
}

impl StoreEvent {
    /// Returns the event type tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::ConsumerCommit { .. } => CONSUMER_COMMIT,
            StoreEvent::TopicOffset { .. } => TOPIC_OFFSET,
        }
    }

    /// Returns the topic partition this event refers to.
    pub fn topic_partition(&self) -> TopicPartition {
        match self {
            StoreEvent::ConsumerCommit {
                topic, partition, ..
            }
            | StoreEvent::TopicOffset {
                topic, partition, ..
            } => TopicPartition::new(topic.clone(), *partition),
        }
    }

    /// Returns the consumer group, for commit events.
    pub fn group_id(&self) -> Option<&ConsumerGroupId> {
        match self {
            StoreEvent::ConsumerCommit { group_id, .. } => Some(group_id),
            StoreEvent::TopicOffset { .. } => None,
        }
    }

    /// Returns the offset carried by the event.
    pub fn offset(&self) -> Offset {
        match self {
            StoreEvent::ConsumerCommit { offset, .. } | StoreEvent::TopicOffset { offset, .. } => {
                *offset
            }
        }
    }
}

// =============================================================================
// Feed Records
// =============================================================================

/// A single line of a JSON-lines event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// When the source observed the event, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub event: StoreEvent,
}

impl FeedRecord {
    /// Wraps an event without a timestamp.
    pub fn new(event: StoreEvent) -> Self {
        Self {
            occurred_at: None,
            event,
        }
    }

    /// Parses one feed line.
    ///
    /// Blank lines and lines starting with `#` yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, EventError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some(CONSUMER_COMMIT) | Some(TOPIC_OFFSET) => {}
            Some(other) => return Err(EventError::UnknownEventType(other.to_string())),
            None => return Err(EventError::UnknownEventType(String::new())),
        }

        Ok(Some(serde_json::from_value(value)?))
    }

    /// Serializes the record as a single feed line (without trailing newline).
    pub fn to_line(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}
