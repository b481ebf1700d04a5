//! # Records flowing through the transport.

use std::time::SystemTime;

use bytes::Bytes;

/// Outbound record: immutable, caller-owned, no identity beyond its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: Bytes,
    pub value: Bytes,
}

impl Message {
    /// Creates a record for `topic`.
    pub fn new(topic: impl Into<String>, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Record delivered to a claim loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
    /// Broker append time.
    pub timestamp: SystemTime,
}

impl ConsumerMessage {
    /// Re-targets this record at another topic (dead-lettering keeps key and value).
    pub fn to_message(&self, topic: impl Into<String>) -> Message {
        Message {
            topic: topic.into(),
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}
