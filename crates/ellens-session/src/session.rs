//! Session orchestrator
//!
//! Composition root exposed to a UI layer: wires the connection
//! controller, the event bus, the conversation log, and the reaction
//! tallies together, and surfaces inbound events through a callback
//! trait. One `ChatSession` drives one active conversation; joining a
//! different conversation switches the active id rather than
//! multiplexing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::warn;

use crate::bus::SessionEventBus;
use crate::connection::{ConnectConfig, ConnectionController, ConnectionState};
use crate::error::SessionError;
use crate::log::{ConversationLog, DeliveryStatus, Message};
use crate::protocol::{PresenceSignal, ServerEvent};
use crate::reactions::ReactionAggregator;
use crate::transport::Transport;

/// Intensity attached to synthesized interruption messages
const INTERRUPTION_INTENSITY: u8 = 100;

/// Callbacks a consumer registers for inbound session events
///
/// One method per event, in the manner of an event sink; implement the
/// ones you care about and delegate the rest to no-ops via
/// [`NoOpSessionEvents`]-style stubs.
#[async_trait]
pub trait SessionEvents: Send + Sync {
    /// Every connection state transition, including those driven by
    /// automatic reconnection
    async fn on_connection_state(&self, state: ConnectionState);

    /// A message was appended to the log (agent replies, synthesized
    /// interruptions, and conversation-end notices)
    async fn on_message(&self, message: &Message);

    /// Remote presence changed (last value wins, no history)
    async fn on_typing(&self, presence: &PresenceSignal);

    /// The persona interrupted; the synthesized message is already in
    /// the log
    async fn on_interruption(&self, reason: &str, message: &Message);

    /// The server ended the conversation; the terminal message is
    /// already in the log
    async fn on_conversation_ended(&self, reason: &str, message: &Message);

    /// Non-fatal errors: server-pushed protocol errors and connection
    /// failures surfaced outside the start/retry completion
    async fn on_error(&self, error: &SessionError);
}

/// No-op event handler for tests or headless use
#[derive(Default, Clone)]
pub struct NoOpSessionEvents;

#[async_trait]
impl SessionEvents for NoOpSessionEvents {
    async fn on_connection_state(&self, _state: ConnectionState) {}
    async fn on_message(&self, _message: &Message) {}
    async fn on_typing(&self, _presence: &PresenceSignal) {}
    async fn on_interruption(&self, _reason: &str, _message: &Message) {}
    async fn on_conversation_ended(&self, _reason: &str, _message: &Message) {}
    async fn on_error(&self, _error: &SessionError) {}
}

struct SessionShared {
    log: Mutex<ConversationLog>,
    reactions: Mutex<ReactionAggregator>,
    presence: RwLock<PresenceSignal>,
    handler: RwLock<Option<Arc<dyn SessionEvents>>>,
    last_error: RwLock<Option<String>>,
}

impl SessionShared {
    async fn handler(&self) -> Option<Arc<dyn SessionEvents>> {
        self.handler.read().await.clone()
    }

    async fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::Response {
                id,
                text,
                sender: _,
                timestamp,
                mood,
                chaos_level,
                conversation_id: _,
            } => {
                let message = Message::agent(id, text, timestamp, mood, chaos_level);
                self.log.lock().await.append(message.clone());
                if let Some(handler) = self.handler().await {
                    handler.on_message(&message).await;
                }
            }
            ServerEvent::Typing { is_typing, mood } => {
                let presence = PresenceSignal { is_typing, mood };
                *self.presence.write().await = presence;
                if let Some(handler) = self.handler().await {
                    handler.on_typing(&presence).await;
                }
            }
            ServerEvent::Interruption { message, reason } => {
                let message =
                    Message::synthesized_agent(message, Some(INTERRUPTION_INTENSITY));
                self.log.lock().await.append(message.clone());
                if let Some(handler) = self.handler().await {
                    handler.on_interruption(&reason, &message).await;
                }
            }
            ServerEvent::ConversationEnded { reason, message } => {
                let message = Message::synthesized_agent(message, None);
                self.log.lock().await.append(message.clone());
                if let Some(handler) = self.handler().await {
                    handler.on_conversation_ended(&reason, &message).await;
                }
            }
            ServerEvent::Error { message } => {
                // Never changes connection state
                if let Some(handler) = self.handler().await {
                    handler.on_error(&SessionError::Protocol(message)).await;
                }
            }
        }
    }
}

/// The operations a UI/consumer calls, and the single owner of all
/// session state
pub struct ChatSession {
    controller: ConnectionController,
    bus: SessionEventBus,
    shared: Arc<SessionShared>,
    /// Taken by the first `start()`; the pump tasks live for the
    /// session's lifetime and end when the channels drain
    frames: Mutex<Option<mpsc::Receiver<String>>>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ConnectConfig,
        handler: Arc<dyn SessionEvents>,
    ) -> Self {
        let (controller, frames) = ConnectionController::new(transport, config);
        let bus = SessionEventBus::new(controller.clone());

        Self {
            controller,
            bus,
            shared: Arc::new(SessionShared {
                log: Mutex::new(ConversationLog::new()),
                reactions: Mutex::new(ReactionAggregator::new()),
                presence: RwLock::new(PresenceSignal::default()),
                handler: RwLock::new(Some(handler)),
                last_error: RwLock::new(None),
            }),
            frames: Mutex::new(Some(frames)),
        }
    }

    /// Spawn the event pumps and attempt the initial connect
    ///
    /// The returned result reflects this connect attempt only;
    /// subsequent automatic reconnects are observed through
    /// `on_connection_state`. A failure is also surfaced via
    /// `on_error` so UI code does not need to catch it twice.
    pub async fn start(&self) -> Result<(), SessionError> {
        if let Some(frames) = self.frames.lock().await.take() {
            self.spawn_state_forwarder();
            self.spawn_dispatch(frames);
        }

        match self.controller.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_connection_error(&e).await;
                Err(e)
            }
        }
    }

    /// Manually close the channel and drop the registered callbacks
    pub async fn stop(&self) {
        self.controller.disconnect().await;
        *self.shared.handler.write().await = None;
    }

    /// Clear the exhausted/disconnected condition and connect again
    pub async fn retry_connection(&self) -> Result<(), SessionError> {
        *self.shared.last_error.write().await = None;
        match self.controller.retry().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_connection_error(&e).await;
                Err(e)
            }
        }
    }

    /// Append the message optimistically, then send it
    ///
    /// The entry stays in the log either way; its delivery status
    /// records the outcome.
    pub async fn send_message(&self, text: &str) -> Result<Message, SessionError> {
        let mut message = Message::user(text);
        self.shared.log.lock().await.append(message.clone());

        match self.bus.send_message(text).await {
            Ok(()) => {
                self.shared
                    .log
                    .lock()
                    .await
                    .mark_delivery(&message.id, DeliveryStatus::Sent);
                message.delivery = DeliveryStatus::Sent;
                Ok(message)
            }
            Err(e) => {
                self.shared
                    .log
                    .lock()
                    .await
                    .mark_delivery(&message.id, DeliveryStatus::Failed);
                Err(e)
            }
        }
    }

    /// Fire-and-forget presence hint
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), SessionError> {
        self.bus.set_typing(is_typing).await
    }

    /// Associate subsequent sends with a conversation id
    pub async fn join_conversation(&self, conversation_id: &str) -> Result<(), SessionError> {
        self.bus.join_conversation(conversation_id).await
    }

    /// Optimistically bump the local tally, then emit the reaction
    ///
    /// The increment is kept even when the wire send fails.
    pub async fn react(&self, message_id: &str, emoji: &str) -> Result<u64, SessionError> {
        let count = self.shared.reactions.lock().await.react(message_id, emoji);
        self.bus.send_reaction(message_id, emoji).await?;
        Ok(count)
    }

    /// Authoritative server reconciliation for a reaction counter
    pub async fn apply_remote_reaction(&self, message_id: &str, emoji: &str, count: u64) {
        self.shared
            .reactions
            .lock()
            .await
            .apply_remote(message_id, emoji, count);
    }

    pub async fn state(&self) -> ConnectionState {
        self.controller.state().await
    }

    /// Subscribe to raw state transitions (UI binding)
    pub fn subscribe_states(&self) -> broadcast::Receiver<ConnectionState> {
        self.controller.subscribe()
    }

    pub async fn conversation_id(&self) -> String {
        self.bus.conversation_id().await
    }

    pub async fn log_snapshot(&self) -> Vec<Message> {
        self.shared.log.lock().await.snapshot()
    }

    pub async fn clear_log(&self) {
        self.shared.log.lock().await.clear();
    }

    pub async fn reaction_count(&self, message_id: &str, emoji: &str) -> u64 {
        self.shared.reactions.lock().await.count(message_id, emoji)
    }

    pub async fn reactions_for(
        &self,
        message_id: &str,
    ) -> std::collections::HashMap<String, u64> {
        self.shared.reactions.lock().await.counts_for(message_id)
    }

    /// Last presence signal received; `Mood::Chill` and not-typing
    /// before the first one arrives
    pub async fn presence(&self) -> PresenceSignal {
        *self.shared.presence.read().await
    }

    /// The connection error most recently surfaced by start/retry,
    /// cleared by `retry_connection`
    pub async fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().await.clone()
    }

    async fn record_connection_error(&self, error: &SessionError) {
        *self.shared.last_error.write().await = Some(error.to_string());
        if let Some(handler) = self.shared.handler().await {
            handler.on_error(error).await;
        }
    }

    fn spawn_state_forwarder(&self) {
        let mut rx = self.controller.subscribe();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => {
                        if let Some(handler) = shared.handler().await {
                            handler.on_connection_state(state).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "state forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn spawn_dispatch(&self, mut frames: mpsc::Receiver<String>) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                match ServerEvent::decode(&frame) {
                    Ok(event) => shared.dispatch(event).await,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable frame");
                    }
                }
            }
        });
    }
}
