//! Per-message emoji tallies
//!
//! Local reacts apply optimistically and never decrement; the server
//! may re-send an authoritative count at any time, and the last
//! received value wins for that (message, emoji) pair. Repeated local
//! reacts each count - there is no per-actor dedupe.

use std::collections::HashMap;

/// Emoji counters keyed by message id
#[derive(Debug, Default)]
pub struct ReactionAggregator {
    counts: HashMap<String, HashMap<String, u64>>,
}

impl ReactionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistic local increment; returns the new count
    pub fn react(&mut self, message_id: &str, emoji: &str) -> u64 {
        let count = self
            .counts
            .entry(message_id.to_string())
            .or_default()
            .entry(emoji.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Authoritative server reconciliation: last received value wins
    pub fn apply_remote(&mut self, message_id: &str, emoji: &str, count: u64) {
        self.counts
            .entry(message_id.to_string())
            .or_default()
            .insert(emoji.to_string(), count);
    }

    /// Current count for one (message, emoji) pair
    pub fn count(&self, message_id: &str, emoji: &str) -> u64 {
        self.counts
            .get(message_id)
            .and_then(|emojis| emojis.get(emoji))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all counters for a message
    pub fn counts_for(&self, message_id: &str) -> HashMap<String, u64> {
        self.counts.get(message_id).cloned().unwrap_or_default()
    }
}
