use crate::message::Message as SseMessage;
use crate::Manager;
use async_trait::async_trait;
use events::{ChangeEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles change events by broadcasting them to every connected stream client.
pub struct SseChangeEventHandler {
    sse_manager: Arc<Manager>,
}

impl SseChangeEventHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }
}

#[async_trait]
impl EventHandler for SseChangeEventHandler {
    async fn handle(&self, event: &ChangeEvent) {
        let delivered = self
            .sse_manager
            .send_message(SseMessage::Change(event.clone()));

        debug!(
            "Fanned out {} on {}.{} to {} client(s)",
            event.operation_type(),
            event.schema_name(),
            event.table_name(),
            delivered
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use events::{EventPublisher, OperationType};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn published_change_reaches_each_client_exactly_once() {
        let manager = Arc::new(Manager::default());
        let publisher =
            EventPublisher::new().with_handler(Arc::new(SseChangeEventHandler::new(manager.clone())));
        let mut first = manager.register_connection();
        let mut second = manager.register_connection();

        publisher
            .publish(ChangeEvent::new(
                OperationType::Insert,
                "users",
                "public",
                json!({"id": 1, "email": "a@b.com"}),
                Utc::now(),
            ))
            .await;

        for client in [&mut first, &mut second] {
            let frame = client.queue.recv().await.unwrap();
            let value: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "INSERT");
            assert_eq!(value["table"], "users");
            assert_eq!(value["record"], json!({"id": 1, "email": "a@b.com"}));
            assert!(client.queue.try_recv().is_err());
        }
    }
}
