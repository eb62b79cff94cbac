//! Typed outbound operations on the session channel
//!
//! Translates the consumer-facing operations into wire events on the
//! single channel. Every operation requires a connected channel and
//! fails with `NotConnected` before anything is written otherwise.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::connection::ConnectionController;
use crate::error::SessionError;
use crate::protocol::{ClientEvent, ServerEvent};

/// Outbound half of the event multiplexer
///
/// Clone-able; clones share the active conversation id.
#[derive(Clone)]
pub struct SessionEventBus {
    controller: ConnectionController,
    /// Empty until a join associates one
    conversation_id: Arc<RwLock<String>>,
}

impl SessionEventBus {
    pub fn new(controller: ConnectionController) -> Self {
        Self {
            controller,
            conversation_id: Arc::new(RwLock::new(String::new())),
        }
    }

    /// The conversation id subsequent sends are associated with
    pub async fn conversation_id(&self) -> String {
        self.conversation_id.read().await.clone()
    }

    /// Send a chat message carrying the active conversation id
    pub async fn send_message(&self, text: &str) -> Result<(), SessionError> {
        let conversation_id = self.conversation_id().await;
        self.emit(ClientEvent::SendMessage {
            message: text.to_string(),
            conversation_id,
        })
        .await
    }

    /// Fire-and-forget presence hint; no acknowledgment expected
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), SessionError> {
        self.emit(ClientEvent::UserTyping { is_typing }).await
    }

    /// Associate subsequent sends with a conversation id
    ///
    /// Idempotent: re-joining the active conversation sends nothing.
    pub async fn join_conversation(&self, conversation_id: &str) -> Result<(), SessionError> {
        if *self.conversation_id.read().await == conversation_id {
            return Ok(());
        }
        self.emit(ClientEvent::JoinConversation {
            conversation_id: conversation_id.to_string(),
        })
        .await?;
        *self.conversation_id.write().await = conversation_id.to_string();
        Ok(())
    }

    /// Fire-and-forget reaction; the local optimistic tally does not
    /// wait for any acknowledgment
    pub async fn send_reaction(&self, message_id: &str, emoji: &str) -> Result<(), SessionError> {
        self.emit(ClientEvent::AddReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        })
        .await
    }

    /// Decode an inbound frame into a typed server event
    pub fn decode_frame(frame: &str) -> Result<ServerEvent, SessionError> {
        ServerEvent::decode(frame)
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), SessionError> {
        let frame = event.encode()?;
        self.controller.send_frame(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectConfig;
    use crate::transport::MemoryTransport;

    async fn connected_bus() -> (SessionEventBus, MemoryTransport) {
        let transport = MemoryTransport::new();
        let (controller, _frames) = ConnectionController::new(
            Arc::new(transport.clone()),
            ConnectConfig::new("mem://ellens"),
        );
        controller.connect().await.unwrap();
        (SessionEventBus::new(controller), transport)
    }

    #[tokio::test]
    async fn test_send_message_not_connected() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = ConnectionController::new(
            Arc::new(transport.clone()),
            ConnectConfig::new("mem://ellens"),
        );
        let bus = SessionEventBus::new(controller);

        let err = bus.send_message("yo").await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn test_join_then_send_carries_conversation_id() {
        let (bus, transport) = connected_bus().await;
        let mut peer = transport.accept().await;

        bus.join_conversation("c1").await.unwrap();
        bus.send_message("hi").await.unwrap();

        let join_frame = peer.next_outbound().await.unwrap();
        assert!(join_frame.contains("\"event\":\"join_conversation\""));

        let send_frame = peer.next_outbound().await.unwrap();
        assert!(send_frame.contains("\"event\":\"send_message\""));
        assert!(send_frame.contains("\"conversationId\":\"c1\""));
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let (bus, transport) = connected_bus().await;
        let mut peer = transport.accept().await;

        bus.join_conversation("c1").await.unwrap();
        bus.join_conversation("c1").await.unwrap();

        assert!(peer.next_outbound().await.is_some());
        assert!(peer.try_next_outbound().is_none());
        assert_eq!(bus.conversation_id().await, "c1");
    }

    #[tokio::test]
    async fn test_send_before_join_has_empty_conversation_id() {
        let (bus, transport) = connected_bus().await;
        let mut peer = transport.accept().await;

        bus.send_message("hi").await.unwrap();
        let frame = peer.next_outbound().await.unwrap();
        assert!(frame.contains("\"conversationId\":\"\""));
    }

    #[tokio::test]
    async fn test_typing_and_reaction_frames() {
        let (bus, transport) = connected_bus().await;
        let mut peer = transport.accept().await;

        bus.set_typing(true).await.unwrap();
        bus.send_reaction("m1", "🔥").await.unwrap();

        let typing = peer.next_outbound().await.unwrap();
        assert!(typing.contains("\"event\":\"user_typing\""));
        assert!(typing.contains("\"isTyping\":true"));

        let reaction = peer.next_outbound().await.unwrap();
        assert!(reaction.contains("\"event\":\"add_reaction\""));
        assert!(reaction.contains("\"messageId\":\"m1\""));
    }
}
