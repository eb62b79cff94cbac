//! Conversation Naming Module
//!
//! Generates unique conversation IDs and human-friendly display names
//! like "hyped-banger" or "chill-flow". The UUID is what goes over the
//! wire; the name only exists for humans reading logs and terminals.

use rand::seq::SliceRandom;
use uuid::Uuid;

/// Adjectives for conversation names - in the persona's register
const ADJECTIVES: &[&str] = &[
    "chill", "hyped", "vibey", "loud", "smooth", "wavy", "raw", "fresh",
    "wild", "hazy", "golden", "silver", "neon", "cosmic", "electric", "late",
    "deep", "lucid", "mellow", "restless", "glitchy", "moody", "manic", "dreamy",
];

/// Nouns for conversation names
const NOUNS: &[&str] = &[
    "banger", "flow", "verse", "hook", "beat", "drop", "echo", "loop",
    "riff", "track", "wave", "pulse", "static", "signal", "stream", "session",
    "freestyle", "interlude", "outro", "reverb", "tempo", "chorus", "bridge", "fade",
];

/// Conversation identifier with both wire UUID and display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationId {
    /// Wire identifier (UUID v4) - sent in `joinConversation`
    pub id: String,
    /// Human-friendly display name
    pub name: String,
}

impl ConversationId {
    /// Create a new conversation ID with an auto-generated name
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: generate_conversation_name(),
        }
    }

    /// Create a conversation ID with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }

    /// Rebuild from existing values (e.g., a server-assigned id)
    pub fn from_parts(id: String, name: String) -> Self {
        Self { id, name }
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Generate a conversation name like "hyped-banger" or "chill-flow"
pub fn generate_conversation_name() -> String {
    let mut rng = rand::thread_rng();

    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"chill");
    let noun = NOUNS.choose(&mut rng).unwrap_or(&"session");

    format!("{}-{}", adjective, noun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_conversation_name() {
        let name = generate_conversation_name();
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
    }

    #[test]
    fn test_conversation_id_new() {
        let conversation = ConversationId::new();
        assert!(!conversation.id.is_empty());
        assert!(conversation.name.contains('-'));
    }

    #[test]
    fn test_conversation_id_with_name() {
        let conversation = ConversationId::with_name("studio-a");
        assert!(!conversation.id.is_empty());
        assert_eq!(conversation.name, "studio-a");
    }

    #[test]
    fn test_uniqueness() {
        let mut ids: HashSet<String> = HashSet::new();
        for _ in 0..100 {
            ids.insert(ConversationId::new().id);
        }
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_display() {
        let conversation = ConversationId::with_name("late-freestyle");
        assert_eq!(format!("{}", conversation), "late-freestyle");
    }
}
