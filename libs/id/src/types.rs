//! Typed identifier definitions.
//!
//! Consumer groups and topics are string names chosen by whoever operates the
//! cluster. Partitions and offsets are plain integers wrapped so they can't be
//! mixed up with each other.

use crate::define_name;
use crate::IdError;

// =============================================================================
// Names
// =============================================================================

define_name!(ConsumerGroupId, "consumer group id");
define_name!(TopicName, "topic name");

// =============================================================================
// Partition
// =============================================================================

/// Partition index within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partition(u32);

impl Partition {
    /// Creates a new Partition from a u32.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Partition {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl From<Partition> for u32 {
    fn from(partition: Partition) -> Self {
        partition.0
    }
}

impl std::str::FromStr for Partition {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|e| IdError::InvalidNumber {
                kind: "partition",
                message: e.to_string(),
            })
    }
}

impl serde::Serialize for Partition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Partition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let index = u32::deserialize(deserializer)?;
        Ok(Self(index))
    }
}

// =============================================================================
// Offset
// =============================================================================

/// Position within a topic partition.
///
/// Offsets are expected to be non-decreasing per partition, but nothing here
/// enforces that; values are forwarded exactly as the store reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(i64);

impl Offset {
    /// The first offset of a partition.
    pub const ZERO: Self = Self(0);

    /// Creates a new Offset from an i64 without validation.
    #[must_use]
    pub const fn new(offset: i64) -> Self {
        Self(offset)
    }

    /// Creates a new Offset, rejecting negative values.
    pub fn try_new(offset: i64) -> Result<Self, IdError> {
        if offset < 0 {
            return Err(IdError::NegativeOffset(offset));
        }
        Ok(Self(offset))
    }

    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Number of messages between this offset and `head`, clamped at zero.
    #[must_use]
    pub fn lag_behind(&self, head: Offset) -> u64 {
        u64::try_from(head.0.saturating_sub(self.0)).unwrap_or(0)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl TryFrom<i64> for Offset {
    type Error = IdError;

    fn try_from(offset: i64) -> Result<Self, Self::Error> {
        Self::try_new(offset)
    }
}

impl std::str::FromStr for Offset {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.parse::<i64>().map_err(|e| IdError::InvalidNumber {
            kind: "offset",
            message: e.to_string(),
        })?;
        Self::try_new(raw)
    }
}

impl serde::Serialize for Offset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Offset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Self::try_new(raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Topic Partition
// =============================================================================

/// A (topic, partition) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TopicPartition {
    pub topic: TopicName,
    pub partition: Partition,
}

impl TopicPartition {
    /// Creates a new TopicPartition.
    #[must_use]
    pub fn new(topic: TopicName, partition: Partition) -> Self {
        Self { topic, partition }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}

// =============================================================================
// Tests
// =============================================================================
