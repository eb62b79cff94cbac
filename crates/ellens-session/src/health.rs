//! Generator health status
//!
//! Typed payload of the server's health endpoint: which text generator
//! is primary, which is the fallback, and whether each upstream is
//! reachable. The session never consults this - it exists for UIs that
//! want to show a badge next to the connection state.

use serde::{Deserialize, Serialize};

/// Aggregate health as reported by the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Down,
    #[serde(other)]
    Unknown,
}

impl OverallHealth {
    /// Single-glyph badge for terminal display
    pub fn badge(&self) -> &'static str {
        match self {
            OverallHealth::Healthy => "●",
            OverallHealth::Degraded => "◐",
            OverallHealth::Down => "○",
            OverallHealth::Unknown => "?",
        }
    }
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallHealth::Healthy => write!(f, "healthy"),
            OverallHealth::Degraded => write!(f, "degraded"),
            OverallHealth::Down => write!(f, "down"),
            OverallHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health endpoint payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Name of the generator currently serving responses
    pub primary: String,
    /// Name of the generator used when the primary is unavailable
    pub fallback: String,
    pub chatgpt_available: bool,
    pub claude_available: bool,
    pub overall_health: OverallHealth,
}

impl HealthStatus {
    /// Status to show when the health endpoint could not be reached
    pub fn unknown() -> Self {
        Self {
            primary: "unknown".to_string(),
            fallback: "unknown".to_string(),
            chatgpt_available: false,
            claude_available: false,
            overall_health: OverallHealth::Unknown,
        }
    }

    /// One-line summary for terminal display
    pub fn summary(&self) -> String {
        format!(
            "{} {} (primary: {}, fallback: {})",
            self.overall_health.badge(),
            self.overall_health,
            self.primary,
            self.fallback
        )
    }
}
