//! Ellens Session Library
//!
//! Client-side session transport for the Young Ellens chat server:
//! connection establishment, failure detection, automatic reconnection
//! with exponential backoff, and the multiplexed event protocol riding
//! on a single bidirectional channel.
//!
//! # Modules
//!
//! - [`protocol`] - Wire events exchanged with the server
//! - [`transport`] - Transport seam and implementations
//! - [`connection`] - Connection lifecycle and reconnection
//! - [`bus`] - Typed outbound operations on the channel
//! - [`log`] - Client-held conversation log
//! - [`reactions`] - Per-message emoji tallies
//! - [`session`] - Composition root exposed to consumers
//! - [`names`] - Conversation id and display-name generation
//! - [`health`] - Status payload of the external health endpoint
//! - [`error`] - Error types

pub mod bus;
pub mod connection;
pub mod error;
pub mod health;
pub mod log;
pub mod names;
pub mod protocol;
pub mod reactions;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use bus::SessionEventBus;
pub use connection::{ConnectConfig, ConnectionController, ConnectionState};
pub use error::{Result, SessionError};
pub use health::{HealthStatus, OverallHealth};
pub use log::{ConversationLog, DeliveryStatus, Message, Sender};
pub use names::ConversationId;
pub use protocol::{ClientEvent, Mood, PresenceSignal, ServerEvent};
pub use reactions::ReactionAggregator;
pub use session::{ChatSession, NoOpSessionEvents, SessionEvents};
pub use transport::{MemoryTransport, Transport, TransportEvent, TransportHandle};
