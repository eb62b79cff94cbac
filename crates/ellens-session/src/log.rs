//! Client-held conversation log
//!
//! Single source of truth for displayed message order. Append is the
//! only growth path and insertion order is the display order; inbound
//! messages are never re-sorted by timestamp. Locally originated
//! messages enter the log optimistically with a `Pending` delivery
//! status and are marked `Sent` or `Failed` by the wire outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::Mood;

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

/// Delivery status of a log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Appended optimistically, wire call not yet resolved
    Pending,
    /// The wire call succeeded
    Sent,
    /// The wire call failed; the entry stays in the log
    Failed,
    /// Arrived from the server
    Received,
}

/// One conversation message
///
/// Identity is `id`; immutable once created except for the delivery
/// status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    /// Chaos level 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    pub delivery: DeliveryStatus,
}

impl Message {
    /// A locally originated message, pending delivery
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            mood: None,
            intensity: None,
            delivery: DeliveryStatus::Pending,
        }
    }

    /// An agent message received over the wire
    pub fn agent(
        id: String,
        text: String,
        timestamp: DateTime<Utc>,
        mood: Mood,
        intensity: u8,
    ) -> Self {
        Self {
            id,
            text,
            sender: Sender::Agent,
            timestamp,
            mood: Some(mood),
            intensity: Some(intensity),
            delivery: DeliveryStatus::Received,
        }
    }

    /// A locally synthesized agent message (interruptions,
    /// conversation end) with a generated id
    pub fn synthesized_agent(text: impl Into<String>, intensity: Option<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::Agent,
            timestamp: Utc::now(),
            mood: None,
            intensity,
            delivery: DeliveryStatus::Received,
        }
    }
}

/// Append-only, time-ordered record of exchanged messages
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Ordering is call order, not timestamp order;
    /// duplicate ids are not deduplicated.
    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// Update the delivery status of a locally originated entry
    pub fn mark_delivery(&mut self, id: &str, status: DeliveryStatus) {
        if let Some(entry) = self.entries.iter_mut().find(|m| m.id == id) {
            entry.delivery = status;
        }
    }

    /// Snapshot in append order
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The only removal operation: drop the whole log
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
