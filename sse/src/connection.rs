use crate::message::Payload;
use dashmap::DashMap;
use log::*;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving half of a registered client: its identity plus the queue
/// that the registry pushes payloads onto.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub queue: Receiver<Payload>,
}

/// Registry of live stream connections, each owning a bounded FIFO queue.
///
/// Registration, removal and broadcast are short, non-suspending critical
/// sections and may run concurrently from any task.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Sender<Payload>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection with a fresh queue - O(1)
    pub fn register(&self) -> ClientConnection {
        let id = ConnectionId::new();
        let (sender, queue) = mpsc::channel(self.queue_capacity);

        self.connections.insert(id.clone(), sender);

        ClientConnection { id, queue }
    }

    /// Unregister a connection - O(1). Returns whether it was still registered;
    /// removing an already removed connection is a no-op.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    /// Enqueue a payload onto a single connection.
    pub fn send_to(&self, connection_id: &ConnectionId, payload: Payload) -> bool {
        let delivered = match self.connections.get(connection_id) {
            Some(sender) => Self::try_enqueue(connection_id, &sender, payload),
            None => return false,
        };
        if !delivered {
            self.evict(connection_id);
        }
        delivered
    }

    /// Enqueue the payload onto every registered connection - O(n).
    ///
    /// Connections whose queue is full or whose receiver is gone are evicted
    /// once iteration completes. Returns the number of successful enqueues.
    pub fn broadcast(&self, payload: Payload) -> usize {
        let mut delivered = 0;
        let mut stalled = Vec::new();

        for entry in self.connections.iter() {
            if Self::try_enqueue(entry.key(), entry.value(), payload.clone()) {
                delivered += 1;
            } else {
                stalled.push(entry.key().clone());
            }
        }

        for connection_id in &stalled {
            self.evict(connection_id);
        }

        delivered
    }

    /// Drop every connection's sender so each stream drains and ends.
    pub fn clear(&self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    fn try_enqueue(connection_id: &ConnectionId, sender: &Sender<Payload>, payload: Payload) -> bool {
        match sender.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Queue full for connection {}. Connection will be dropped.",
                    connection_id.as_str()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Connection {} no longer receiving. Connection will be cleaned up.",
                    connection_id.as_str()
                );
                false
            }
        }
    }

    fn evict(&self, connection_id: &ConnectionId) {
        if self.unregister(connection_id) {
            info!("Evicted SSE connection {}", connection_id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(s: &str) -> Payload {
        Arc::from(s)
    }

    #[tokio::test]
    async fn broadcast_enqueues_once_per_registered_connection() {
        let registry = ConnectionRegistry::new(8);
        let mut clients: Vec<_> = (0..3).map(|_| registry.register()).collect();

        assert_eq!(registry.broadcast(payload("one")), 3);

        for client in clients.iter_mut() {
            assert_eq!(client.queue.recv().await.as_deref(), Some("one"));
            assert!(client.queue.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn broadcast_with_no_connections_delivers_nothing() {
        let registry = ConnectionRegistry::new(8);
        assert_eq!(registry.broadcast(payload("nobody")), 0);
    }

    #[tokio::test]
    async fn connection_registered_after_broadcast_misses_it() {
        let registry = ConnectionRegistry::new(8);
        let mut early = registry.register();

        registry.broadcast(payload("first"));
        let mut late = registry.register();
        registry.broadcast(payload("second"));

        assert_eq!(early.queue.recv().await.as_deref(), Some("first"));
        assert_eq!(early.queue.recv().await.as_deref(), Some("second"));
        assert_eq!(late.queue.recv().await.as_deref(), Some("second"));
        assert!(late.queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_connection_order_matches_broadcast_order() {
        let registry = ConnectionRegistry::new(16);
        let mut client = registry.register();

        for i in 0..10 {
            registry.broadcast(payload(&i.to_string()));
        }

        for i in 0..10 {
            assert_eq!(client.queue.recv().await.as_deref(), Some(i.to_string().as_str()));
        }
    }

    #[test]
    fn unregister_twice_is_harmless_and_leaves_others_alone() {
        let registry = ConnectionRegistry::new(8);
        let first = registry.register();
        let second = registry.register();

        assert!(registry.unregister(&first.id));
        assert!(!registry.unregister(&first.id));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&second.id));
    }

    #[tokio::test]
    async fn full_queue_evicts_only_the_stalled_connection() {
        let registry = ConnectionRegistry::new(2);
        let stalled = registry.register();
        let mut healthy = registry.register();

        registry.broadcast(payload("a"));
        registry.broadcast(payload("b"));
        healthy.queue.recv().await;
        healthy.queue.recv().await;

        assert_eq!(registry.broadcast(payload("c")), 1);
        assert!(!registry.contains(&stalled.id));
        assert!(registry.contains(&healthy.id));
        assert_eq!(healthy.queue.recv().await.as_deref(), Some("c"));
    }

    #[test]
    fn dropped_receiver_is_cleaned_up_on_next_broadcast() {
        let registry = ConnectionRegistry::new(8);
        let gone = registry.register();
        let _kept = registry.register();
        let gone_id = gone.id.clone();
        drop(gone);

        assert_eq!(registry.broadcast(payload("x")), 1);
        assert!(!registry.contains(&gone_id));
    }
}
