//! Transport seam for the session channel
//!
//! The connection controller owns exactly one transport handle at a
//! time and never hands it out; everything above it talks in text
//! frames. The trait keeps the controller testable without a network:
//! [`WebSocketTransport`] is the production implementation (behind the
//! `websocket` feature), [`MemoryTransport`] is an in-process scripted
//! implementation for tests and demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::SessionError;

/// Channel capacity for frame buffering on both directions
const FRAME_BUFFER: usize = 100;

/// An inbound happening on an open channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Frame(String),
    /// The channel closed (remote close, socket error, or local drop)
    Closed { reason: Option<String> },
}

/// Live handle to one open channel
///
/// Dropping `outbound` closes the channel from our side.
#[derive(Debug)]
pub struct TransportHandle {
    /// Text frames written to the remote end
    pub outbound: mpsc::Sender<String>,
    /// Frames and lifecycle events from the remote end, in arrival order
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Factory for channel connections
///
/// One `connect` call corresponds to one transport-level connection
/// attempt; reconnection policy lives in the controller, not here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel to `url`
    async fn connect(&self, url: &str) -> Result<TransportHandle, SessionError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

/// WebSocket transport backed by tokio-tungstenite
#[cfg(feature = "websocket")]
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

#[cfg(feature = "websocket")]
#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportHandle, SessionError> {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        tracing::debug!(url, "websocket open");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(FRAME_BUFFER);

        // Outbound pump: handle -> socket. Ends when the handle's
        // sender is dropped, which closes the socket from our side.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        // Inbound pump: socket -> handle, preserving arrival order.
        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(TransportEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        // Some servers send JSON as binary frames
                        if let Ok(text) = String::from_utf8(data) {
                            if inbound_tx.send(TransportEvent::Frame(text)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed { reason }).await;
                        return;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                        // Handled by tungstenite / not our concern
                    }
                    Err(e) => {
                        tracing::warn!("websocket read error: {}", e);
                        let _ = inbound_tx
                            .send(TransportEvent::Closed {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        return;
                    }
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed { reason: None }).await;
        });

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Outcome of the next scripted connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScript {
    /// Accept and hand the test the server half of the channel
    Accept,
    /// Fail immediately with a transport error
    Refuse,
    /// Never complete (exercises the connect timeout)
    Hang,
}

/// In-process transport for tests and demos
///
/// Connect outcomes are scripted; an empty script accepts. Every
/// accepted connection yields a [`MemoryPeer`] on the accept queue so
/// a test can play the server side of the channel.
#[derive(Clone)]
pub struct MemoryTransport {
    script: Arc<Mutex<VecDeque<ConnectScript>>>,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: Arc<Mutex<mpsc::UnboundedReceiver<MemoryPeer>>>,
}

/// Server half of an accepted in-memory channel
pub struct MemoryPeer {
    to_client: mpsc::Sender<TransportEvent>,
    from_client: mpsc::Receiver<String>,
}

impl MemoryPeer {
    /// Push a frame to the client, as the server would
    pub async fn push_frame(&self, frame: impl Into<String>) {
        let _ = self
            .to_client
            .send(TransportEvent::Frame(frame.into()))
            .await;
    }

    /// Close the channel from the server side
    pub async fn close(&self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed {
                reason: reason.map(String::from),
            })
            .await;
    }

    /// Next frame the client wrote, if any
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Non-blocking check that the client wrote nothing
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            peers_tx,
            peers_rx: Arc::new(Mutex::new(peers_rx)),
        }
    }

    /// Queue outcomes for upcoming connect attempts
    pub async fn script(&self, outcomes: impl IntoIterator<Item = ConnectScript>) {
        self.script.lock().await.extend(outcomes);
    }

    /// Wait for the next accepted connection's server half
    pub async fn accept(&self) -> MemoryPeer {
        self.peers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("memory transport dropped")
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, _url: &str) -> Result<TransportHandle, SessionError> {
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ConnectScript::Accept);

        match outcome {
            ConnectScript::Refuse => {
                Err(SessionError::Transport("connection refused".to_string()))
            }
            ConnectScript::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            ConnectScript::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
                let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(FRAME_BUFFER);

                let peer = MemoryPeer {
                    to_client: inbound_tx,
                    from_client: outbound_rx,
                };
                let _ = self.peers_tx.send(peer);

                Ok(TransportHandle {
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_accepts_by_default() {
        let transport = MemoryTransport::new();
        let handle = transport.connect("mem://test").await.unwrap();

        let mut peer = transport.accept().await;
        handle.outbound.send("hello".to_string()).await.unwrap();
        assert_eq!(peer.next_outbound().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_memory_transport_refuse() {
        let transport = MemoryTransport::new();
        transport.script([ConnectScript::Refuse]).await;

        let err = transport.connect("mem://test").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));

        // Script consumed - next attempt accepts
        assert!(transport.connect("mem://test").await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_transport_frames_in_order() {
        let transport = MemoryTransport::new();
        let mut handle = transport.connect("mem://test").await.unwrap();
        let peer = transport.accept().await;

        peer.push_frame("one").await;
        peer.push_frame("two").await;
        peer.close(Some("done")).await;

        assert_eq!(
            handle.inbound.recv().await,
            Some(TransportEvent::Frame("one".to_string()))
        );
        assert_eq!(
            handle.inbound.recv().await,
            Some(TransportEvent::Frame("two".to_string()))
        );
        assert_eq!(
            handle.inbound.recv().await,
            Some(TransportEvent::Closed {
                reason: Some("done".to_string())
            })
        );
    }
}
