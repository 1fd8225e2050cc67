use crate::connection::{ClientConnection, ConnectionId, ConnectionRegistry};
use crate::message::Message;
use log::*;
use std::sync::Arc;

/// Default bound on a single client's undelivered payloads.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(queue_capacity)),
        }
    }

    /// Register a new connection and return its queue
    pub fn register_connection(&self) -> ClientConnection {
        let connection = self.registry.register();
        info!(
            "Registered new SSE connection {} ({} connected)",
            connection.id.as_str(),
            self.registry.len()
        );
        connection
    }

    /// Unregister a connection by ID. Safe to call more than once.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.registry.unregister(connection_id) {
            info!(
                "Unregistered SSE connection {} ({} remaining)",
                connection_id.as_str(),
                self.registry.len()
            );
        }
    }

    /// Encode the message once and push it onto a single connection's queue.
    pub fn send_to(&self, connection_id: &ConnectionId, message: Message) -> bool {
        match message.into_payload() {
            Ok(payload) => self.registry.send_to(connection_id, payload),
            Err(e) => {
                error!("Failed to serialize SSE message: {e}");
                false
            }
        }
    }

    /// Encode the message once and push it onto every registered connection's
    /// queue. Returns the number of connections it was enqueued for.
    pub fn send_message(&self, message: Message) -> usize {
        let payload = match message.into_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize SSE message: {e}");
                return 0;
            }
        };

        let delivered = self.registry.broadcast(payload);
        debug!("Broadcast SSE message to {delivered} connection(s)");
        delivered
    }

    /// Close every connection, e.g. on shutdown. Queued frames are still
    /// delivered before each stream ends.
    pub fn disconnect_all(&self) {
        let closed = self.registry.clear();
        info!("Closed {closed} SSE connection(s)");
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.contains(connection_id)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_message_reaches_every_connection() {
        let manager = Manager::default();
        let mut a = manager.register_connection();
        let mut b = manager.register_connection();

        let delivered = manager.send_message(Message::Injected("hello".to_string()));

        assert_eq!(delivered, 2);
        assert_eq!(a.queue.recv().await.as_deref(), Some("hello"));
        assert_eq!(b.queue.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn unregister_connection_is_idempotent() {
        let manager = Manager::default();
        let a = manager.register_connection();
        let b = manager.register_connection();

        manager.unregister_connection(&a.id);
        manager.unregister_connection(&a.id);

        assert_eq!(manager.connection_count(), 1);
        assert!(manager.is_registered(&b.id));
    }

    #[tokio::test]
    async fn disconnect_all_ends_every_queue_after_draining() {
        let manager = Manager::default();
        let mut a = manager.register_connection();
        manager.send_message(Message::Injected("last".to_string()));

        manager.disconnect_all();

        assert_eq!(manager.connection_count(), 0);
        assert_eq!(a.queue.recv().await.as_deref(), Some("last"));
        assert!(a.queue.recv().await.is_none());
    }

    #[test]
    fn send_to_unknown_connection_reports_failure() {
        let manager = Manager::default();
        assert!(!manager.send_to(&ConnectionId::new(), Message::ConnectionEstablished));
    }
}
