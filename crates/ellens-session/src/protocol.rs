//! Wire Protocol Types
//!
//! Typed events for the single bidirectional channel between the chat
//! client and the Ellens server. Both directions use one JSON envelope
//! (`{"event": <name>, "data": {...}}`) so each side can exhaustively
//! match a closed enum instead of keeping ad hoc per-event callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;

/// Simulated mood of the Ellens persona
///
/// The catch-all keeps the decode alive when the server grows a mood
/// this client has not heard of yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Chill,
    Hyped,
    Contemplative,
    Happy,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mood::Chill => write!(f, "chill"),
            Mood::Hyped => write!(f, "hyped"),
            Mood::Contemplative => write!(f, "contemplative"),
            Mood::Happy => write!(f, "happy"),
            Mood::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ephemeral presence hint for the remote party - last value wins,
/// never persisted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PresenceSignal {
    pub is_typing: bool,
    pub mood: Mood,
}

/// Events emitted by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        message: String,
        conversation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping { is_typing: bool },
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    AddReaction { message_id: String, emoji: String },
}

/// Events pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A generated reply from the persona
    #[serde(rename = "ellens_response", rename_all = "camelCase")]
    Response {
        id: String,
        text: String,
        /// Always "ellens" in practice; kept loose so an unexpected
        /// value does not fail the decode
        sender: String,
        timestamp: DateTime<Utc>,
        mood: Mood,
        /// 0-100
        chaos_level: u8,
        conversation_id: String,
    },
    /// Presence hint - fire-and-forget, no history
    #[serde(rename = "ellens_typing", rename_all = "camelCase")]
    Typing { is_typing: bool, mood: Mood },
    /// The persona interrupts the user mid-conversation
    #[serde(rename = "ellens_interruption")]
    Interruption { message: String, reason: String },
    /// The server closed the conversation
    #[serde(rename = "conversation_ended")]
    ConversationEnded { reason: String, message: String },
    /// Non-fatal server-side error; never changes connection state
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientEvent {
    /// Encode this event to a wire frame
    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

impl ServerEvent {
    /// Decode a wire frame into a server event
    pub fn decode(frame: &str) -> Result<Self, SessionError> {
        serde_json::from_str(frame).map_err(|e| SessionError::Protocol(e.to_string()))
    }
}
