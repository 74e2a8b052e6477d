//! Connected clients and the outbound side of the namespace transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use pagesync_core::{codec, ServerMessage, SessionId};
use pagesync_engine::Outbound;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::WS_SEND_DROPS_TOTAL;

/// A connected WebSocket client.
pub struct Client {
    pub id: SessionId,
    tx: mpsc::Sender<String>,
    pub connected_at: Instant,
    last_pong: AtomicU64,
}

impl Client {
    fn new(id: SessionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    /// Queue a text frame. Never blocks; a full queue drops the frame.
    fn try_send(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    session_id = %self.id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                counter!(WS_SEND_DROPS_TOTAL).increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all sessions connected to the namespace.
pub struct ClientRegistry {
    clients: DashMap<SessionId, Arc<Client>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new client and return its session id + outbound receiver.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let _ = self.clients.insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        (id, rx)
    }

    /// Remove a client. Dropping its sender ends the connection's writer.
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn record_pong(&self, id: &SessionId) {
        if let Some(client) = self.clients.get(id) {
            client.record_pong();
        }
    }

    /// Queue an already encoded frame for one client.
    pub fn send_text(&self, id: &SessionId, text: String) -> bool {
        // Clone the Arc so the shard lock is not held across the send.
        let client = self.clients.get(id).map(|entry| Arc::clone(entry.value()));
        client.is_some_and(|client| client.try_send(text))
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that haven't answered a ping within the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                tracing::info!(session_id = %id, "cleaned up dead client");
            }
        }
        removed
    }
}

impl Outbound for ClientRegistry {
    fn send_to(&self, session: &SessionId, message: &ServerMessage) -> bool {
        self.send_text(session, codec::encode(message))
    }

    fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = codec::encode(message);
        let clients: Vec<Arc<Client>> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        clients
            .into_iter()
            .filter(|client| client.try_send(text.clone()))
            .count()
    }
}

/// Start a background task that periodically removes dead clients.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.cleanup_dead_clients();
                    if removed > 0 {
                        tracing::info!(removed, "dead client cleanup");
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(queue: usize) -> ClientRegistry {
        ClientRegistry::new(queue, Duration::from_secs(90))
    }

    #[test]
    fn register_and_unregister() {
        let registry = registry(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_ne!(id1, id2);
        assert_eq!(registry.count(), 2);

        assert!(registry.unregister(&id1));
        assert!(!registry.unregister(&id1));
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&id2));
    }

    #[tokio::test]
    async fn send_to_encodes_frame() {
        let registry = registry(32);
        let (id, mut rx) = registry.register();

        assert!(registry.send_to(&id, &ServerMessage::commit("changeAge", json!(18))));
        let text = rx.recv().await.unwrap();
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, json!(["commit", "changeAge", 18]));
    }

    #[test]
    fn send_to_unknown_session_is_dropped() {
        let registry = registry(32);
        assert!(!registry.send_to(&SessionId::new(), &ServerMessage::Auth(true)));
    }

    #[test]
    fn full_queue_drops() {
        let registry = registry(2);
        let (id, _rx) = registry.register();
        assert!(registry.send_text(&id, "a".into()));
        assert!(registry.send_text(&id, "b".into()));
        assert!(!registry.send_text(&id, "c".into()));
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let registry = registry(8);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        assert_eq!(registry.broadcast(&ServerMessage::commit("tick", json!(1))), 2);
        assert_eq!(rx_a.try_recv().unwrap(), r#"["commit","tick",1]"#);
        assert_eq!(rx_b.try_recv().unwrap(), r#"["commit","tick",1]"#);
    }

    #[test]
    fn broadcast_skips_closed_receivers() {
        let registry = registry(8);
        let (_a, rx_a) = registry.register();
        let (_b, _rx_b) = registry.register();
        drop(rx_a);
        assert_eq!(registry.broadcast(&ServerMessage::Auth(true)), 1);
    }

    #[tokio::test]
    async fn unregister_closes_outbound_channel() {
        let registry = registry(8);
        let (id, mut rx) = registry.register();
        let _ = registry.unregister(&id);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn cleanup_removes_expired_clients() {
        let registry = registry(8);
        let (id, _rx) = registry.register();
        let (live, _rx2) = registry.register();

        if let Some(client) = registry.clients.get(&id) {
            client.last_pong.store(0, Ordering::Relaxed);
        }

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert!(!registry.contains(&id));
        assert!(registry.contains(&live));
    }

    #[test]
    fn pong_keeps_client_alive() {
        let registry = registry(8);
        let (id, _rx) = registry.register();
        if let Some(client) = registry.clients.get(&id) {
            client.last_pong.store(0, Ordering::Relaxed);
        }
        registry.record_pong(&id);
        assert_eq!(registry.cleanup_dead_clients(), 0);
    }

    #[tokio::test]
    async fn cleanup_task_stops_on_shutdown() {
        let registry = Arc::new(registry(8));
        let token = CancellationToken::new();
        let handle = start_cleanup_task(registry, Duration::from_millis(10), token.clone());
        token.cancel();
        handle.await.unwrap();
    }
}
