//! Connection lifecycle and reconnection
//!
//! Owns the single transport handle and drives it through a
//! deterministic four-state lifecycle. Unexpected closes trigger
//! exponential-backoff reconnection up to a retry limit; a manual
//! disconnect suppresses every pending and future reconnect until an
//! explicit retry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::transport::{Transport, TransportEvent};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Configuration for connection establishment and reconnection
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Channel endpoint (ws:// or wss:// for the websocket transport)
    pub url: String,
    /// How long a connect attempt may take before it is rejected
    pub connect_timeout: Duration,
    /// Maximum reconnect attempts before settling disconnected
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
}

impl ConnectConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }

    /// Backoff delay for the Nth attempt (1-based):
    /// `min(base * 2^(N-1), max)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exp);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as u64))
    }
}

/// Reconnect bookkeeping; reset only by an explicit retry
#[derive(Debug, Default)]
struct ReconnectState {
    attempts: u32,
    manual_disconnect: bool,
}

struct ControllerInner {
    config: ConnectConfig,
    transport: Arc<dyn Transport>,
    state: RwLock<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    reconnect: Mutex<ReconnectState>,
    /// Bumped on every manual disconnect or retry; pending backoff
    /// timers and stale readers compare against it and no-op
    epoch: AtomicU64,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    frames_tx: mpsc::Sender<String>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Maintains exactly one transport handle and its lifecycle
///
/// Clone-able: clones share the same connection through an Arc-backed
/// inner state.
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

impl ConnectionController {
    /// Create a controller. The returned receiver yields inbound text
    /// frames in arrival order, across reconnects.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ConnectConfig,
    ) -> (Self, mpsc::Receiver<String>) {
        let (frames_tx, frames_rx) = mpsc::channel(100);
        let (state_tx, _) = broadcast::channel(64);

        let inner = Arc::new(ControllerInner {
            config,
            transport,
            state: RwLock::new(ConnectionState::Disconnected),
            state_tx,
            reconnect: Mutex::new(ReconnectState::default()),
            epoch: AtomicU64::new(0),
            outbound: Mutex::new(None),
            frames_tx,
            reader: Mutex::new(None),
        });

        (Self { inner }, frames_rx)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Subscribe to state transitions (every transition is broadcast,
    /// independent of any pending connect future)
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnect attempts consumed since the last success or retry
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.lock().await.attempts
    }

    /// Establish the channel
    ///
    /// Only acts from `Disconnected`; while connecting, connected, or
    /// with a reconnect in flight this is a no-op `Ok`.
    pub async fn connect(&self) -> Result<(), SessionError> {
        match self.state().await {
            ConnectionState::Disconnected => self.inner.clone().do_connect().await,
            _ => Ok(()),
        }
    }

    /// Manually close the channel and block all future reconnects
    pub async fn disconnect(&self) {
        {
            let mut rs = self.inner.reconnect.lock().await;
            rs.manual_disconnect = true;
            rs.attempts = self.inner.config.max_attempts;
        }
        // Invalidates pending backoff timers and live readers
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(handle) = self.inner.reader.lock().await.take() {
            handle.abort();
        }
        // Dropping the sender closes the transport from our side
        *self.inner.outbound.lock().await = None;

        info!("manual disconnect");
        self.inner.set_state(ConnectionState::Disconnected).await;
    }

    /// Clear the exhausted / manually-disconnected condition and
    /// connect again
    pub async fn retry(&self) -> Result<(), SessionError> {
        {
            let mut rs = self.inner.reconnect.lock().await;
            rs.attempts = 0;
            rs.manual_disconnect = false;
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(handle) = self.inner.reader.lock().await.take() {
            handle.abort();
        }
        *self.inner.outbound.lock().await = None;

        info!("retrying connection");
        self.inner.clone().do_connect().await
    }

    /// Write a text frame to the channel
    ///
    /// Fails with `NotConnected` before anything is written when the
    /// state is not `Connected`.
    pub async fn send_frame(&self, frame: String) -> Result<(), SessionError> {
        if self.state().await != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let tx = self.inner.outbound.lock().await.clone();
        match tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| SessionError::NotConnected),
            None => Err(SessionError::NotConnected),
        }
    }
}

impl ControllerInner {
    async fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != next {
            debug!(from = %state, to = %next, "connection state");
            *state = next;
            let _ = self.state_tx.send(next);
        }
    }

    /// One connect attempt: `Connecting`, then `Connected` or back to
    /// `Disconnected`. Does not guard on the current state; callers do.
    async fn do_connect(self: Arc<Self>) -> Result<(), SessionError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting).await;

        let attempt = timeout(
            self.config.connect_timeout,
            self.transport.connect(&self.config.url),
        )
        .await;

        // A disconnect or retry issued while the attempt was in flight
        // owns the lifecycle now; whatever resolved here is dropped,
        // closing any channel the transport opened
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("superseded connect attempt; dropping");
            return Ok(());
        }

        match attempt {
            Err(_) => {
                warn!(url = %self.config.url, "connect timed out");
                self.set_state(ConnectionState::Disconnected).await;
                Err(SessionError::ConnectionTimeout(self.config.connect_timeout))
            }
            Ok(Err(e)) => {
                warn!(url = %self.config.url, error = %e, "connect failed");
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
            Ok(Ok(handle)) => {
                *self.outbound.lock().await = Some(handle.outbound);
                self.reconnect.lock().await.attempts = 0;

                let reader = self.clone().spawn_reader(handle.inbound, epoch);
                *self.reader.lock().await = Some(reader);

                info!(url = %self.config.url, "connected");
                self.set_state(ConnectionState::Connected).await;
                Ok(())
            }
        }
    }

    /// Forward inbound frames until the channel closes, then hand off
    /// to the reconnect policy
    fn spawn_reader(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<TransportEvent>,
        epoch: u64,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let reason = loop {
                match inbound.recv().await {
                    Some(TransportEvent::Frame(frame)) => {
                        if self.frames_tx.send(frame).await.is_err() {
                            break None;
                        }
                    }
                    Some(TransportEvent::Closed { reason }) => break reason,
                    None => break None,
                }
            };

            // A reader superseded by disconnect/retry must not drive
            // the lifecycle of the connection that replaced it
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }

            info!(reason = reason.as_deref().unwrap_or("-"), "channel closed");
            *self.outbound.lock().await = None;
            self.set_state(ConnectionState::Disconnected).await;
            self.schedule_reconnect();
        })
    }

    /// Reconnect loop: one attempt per backoff interval until success,
    /// exhaustion, or cancellation
    fn schedule_reconnect(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let delay = {
                    let mut rs = self.reconnect.lock().await;
                    if rs.manual_disconnect || rs.attempts >= self.config.max_attempts {
                        if rs.attempts >= self.config.max_attempts {
                            warn!(
                                attempts = rs.attempts,
                                "reconnect attempts exhausted; waiting for retry()"
                            );
                        }
                        return;
                    }
                    rs.attempts += 1;
                    let delay = self.config.backoff_delay(rs.attempts);
                    info!(
                        attempt = rs.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    delay
                };

                self.set_state(ConnectionState::Reconnecting).await;
                let epoch = self.epoch.load(Ordering::SeqCst);
                tokio::time::sleep(delay).await;

                // Guard-on-fire: a disconnect or retry while the timer
                // was pending invalidates this wakeup
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("stale backoff timer; dropping");
                    return;
                }
                if self.reconnect.lock().await.manual_disconnect {
                    debug!("manual disconnect while backoff pending; dropping");
                    return;
                }

                match self.clone().do_connect().await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(error = %e, "reconnect attempt failed");
                        // Loop; exhaustion is checked at the top
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectScript, MemoryTransport, TransportHandle};
    use async_trait::async_trait;

    /// Delays every connect attempt, opening a window for calls that
    /// race the attempt
    struct SlowTransport {
        inner: MemoryTransport,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn connect(&self, url: &str) -> Result<TransportHandle, SessionError> {
            tokio::time::sleep(self.delay).await;
            self.inner.connect(url).await
        }
    }

    fn controller(
        transport: &MemoryTransport,
    ) -> (ConnectionController, mpsc::Receiver<String>) {
        ConnectionController::new(
            Arc::new(transport.clone()),
            ConnectConfig::new("mem://ellens"),
        )
    }

    /// Collect every state transition seen so far without blocking
    fn drain(rx: &mut broadcast::Receiver<ConnectionState>) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Ok(state) = rx.try_recv() {
            states.push(state);
        }
        states
    }

    #[test]
    fn test_backoff_delays() {
        let config = ConnectConfig::new("mem://ellens");
        let delays: Vec<u64> = (1..=5)
            .map(|n| config.backoff_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000]);

        // Capped past the fifth attempt
        assert_eq!(config.backoff_delay(6).as_millis(), 10000);
        assert_eq!(config.backoff_delay(40).as_millis(), 10000);
    }

    #[tokio::test]
    async fn test_connect_success_state_sequence() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        assert_eq!(controller.state().await, ConnectionState::Disconnected);
        let mut rx = controller.subscribe();

        controller.connect().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connected);
        assert_eq!(controller.state().await, ConnectionState::Connected);
        assert_eq!(controller.reconnect_attempts().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let transport = MemoryTransport::new();
        transport.script([ConnectScript::Hang]).await;
        let (controller, _frames) = controller(&transport);

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionTimeout(_)));
        assert_eq!(controller.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = MemoryTransport::new();
        transport.script([ConnectScript::Refuse]).await;
        let (controller, _frames) = controller(&transport);

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(controller.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let mut rx = controller.subscribe();
        controller.connect().await.unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_send_frame_requires_connected() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        let err = controller.send_frame("x".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));

        controller.connect().await.unwrap();
        let mut peer = transport.accept().await;
        controller.send_frame("hello".to_string()).await.unwrap();
        assert_eq!(peer.next_outbound().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_inbound_frames_in_arrival_order() {
        let transport = MemoryTransport::new();
        let (controller, mut frames) = controller(&transport);

        controller.connect().await.unwrap();
        let peer = transport.accept().await;

        peer.push_frame("a").await;
        peer.push_frame("b").await;
        peer.push_frame("c").await;

        assert_eq!(frames.recv().await.unwrap(), "a");
        assert_eq!(frames.recv().await.unwrap(), "b");
        assert_eq!(frames.recv().await.unwrap(), "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_close_schedules_reconnect() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let mut rx = controller.subscribe();
        let peer = transport.accept().await;

        let before = tokio::time::Instant::now();
        peer.close(Some("server went away")).await;

        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Disconnected);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Reconnecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connected);

        // First reconnect fires after the 1000ms base delay
        assert_eq!(before.elapsed(), Duration::from_millis(1000));
        // A fresh channel was accepted
        let _peer2 = transport.accept().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exhaustion_settles_disconnected() {
        let transport = MemoryTransport::new();
        transport
            .script([
                ConnectScript::Accept,
                ConnectScript::Refuse,
                ConnectScript::Refuse,
                ConnectScript::Refuse,
                ConnectScript::Refuse,
                ConnectScript::Refuse,
            ])
            .await;
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let mut rx = controller.subscribe();
        let peer = transport.accept().await;
        peer.close(None).await;

        // Five cycles of reconnecting -> connecting -> disconnected
        let mut reconnecting = 0;
        let mut connecting = 0;
        loop {
            match timeout(Duration::from_secs(120), rx.recv()).await {
                Ok(Ok(ConnectionState::Reconnecting)) => reconnecting += 1,
                Ok(Ok(ConnectionState::Connecting)) => connecting += 1,
                Ok(Ok(_)) => {}
                _ => break,
            }
        }
        assert_eq!(reconnecting, 5);
        assert_eq!(connecting, 5);
        assert_eq!(controller.state().await, ConnectionState::Disconnected);
        assert_eq!(controller.reconnect_attempts().await, 5);

        // Settled: operations now fail until retry()
        let err = controller.send_frame("x".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_backoff_timer() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let peer = transport.accept().await;
        peer.close(None).await;

        // Wait until the backoff timer is pending
        let mut rx = controller.subscribe();
        loop {
            if controller.state().await == ConnectionState::Reconnecting {
                break;
            }
            let _ = rx.recv().await;
        }

        controller.disconnect().await;
        let mut rx = controller.subscribe();

        // Let the stale timer fire; it must not attempt to connect
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!drain(&mut rx).contains(&ConnectionState::Connecting));
        assert_eq!(controller.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_blocks_reconnect_on_close() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let _peer = transport.accept().await;

        controller.disconnect().await;
        assert_eq!(controller.state().await, ConnectionState::Disconnected);
        assert_eq!(
            controller.reconnect_attempts().await,
            ConnectConfig::new("mem://ellens").max_attempts
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_inflight_connect_stays_disconnected() {
        let transport = MemoryTransport::new();
        let slow = SlowTransport {
            inner: transport.clone(),
            delay: Duration::from_secs(2),
        };
        let (controller, _frames) = ConnectionController::new(
            Arc::new(slow),
            ConnectConfig::new("mem://ellens"),
        );

        let connect = tokio::spawn({
            let controller = controller.clone();
            async move { controller.connect().await }
        });

        // Disconnect while the attempt is still in flight
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.state().await, ConnectionState::Connecting);
        controller.disconnect().await;

        // The resolving attempt must not override the manual disconnect
        connect.await.unwrap().unwrap();
        assert_eq!(controller.state().await, ConnectionState::Disconnected);

        let err = controller.send_frame("x".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(controller.inner.reconnect.lock().await.manual_disconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resets_and_connects() {
        let transport = MemoryTransport::new();
        let (controller, _frames) = controller(&transport);

        controller.connect().await.unwrap();
        let _peer = transport.accept().await;
        controller.disconnect().await;

        controller.retry().await.unwrap();
        assert_eq!(controller.state().await, ConnectionState::Connected);
        assert_eq!(controller.reconnect_attempts().await, 0);
        assert!(!controller.inner.reconnect.lock().await.manual_disconnect);
    }
}
