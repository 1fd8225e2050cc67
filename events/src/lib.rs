//! Event system infrastructure for the realtime relay.
//!
//! This crate defines the normalized [`ChangeEvent`] that flows from the upstream
//! change feed to every connected stream client, and the small publish/handle
//! seam that decouples the producer (the upstream subscription) from the
//! consumers (the SSE fan-out).
//!
//! # Architecture
//!
//! - **ChangeEvent**: one row-level database change, immutable once built
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, so both the `realtime`
//! and `sse` crates can depend on it without cycles. Row data is carried as
//! serialized JSON values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The kind of row-level change that produced a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, PartialEq, Eq)]
pub struct OperationTypeParseError(pub String);

impl fmt::Display for OperationTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown operation type: {}", self.0)
    }
}

impl std::error::Error for OperationTypeParseError {}

impl FromStr for OperationType {
    type Err = OperationTypeParseError;

    fn from_str(s: &str) -> Result<OperationType, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(OperationType::Insert),
            "UPDATE" => Ok(OperationType::Update),
            "DELETE" => Ok(OperationType::Delete),
            _ => Err(OperationTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperationType::Insert => write!(f, "INSERT"),
            OperationType::Update => write!(f, "UPDATE"),
            OperationType::Delete => write!(f, "DELETE"),
        }
    }
}

/// A normalized, deduplicated row-level database change.
///
/// Serializes to the wire shape pushed to stream clients:
/// `{"type", "table", "schema", "record", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    operation_type: OperationType,
    #[serde(rename = "table")]
    table_name: String,
    #[serde(rename = "schema")]
    schema_name: String,
    record: Value,
    #[serde(rename = "timestamp")]
    committed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        operation_type: OperationType,
        table_name: impl Into<String>,
        schema_name: impl Into<String>,
        record: Value,
        committed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_type,
            table_name: table_name.into(),
            schema_name: schema_name.into(),
            record,
            committed_at,
        }
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn record(&self) -> &Value {
        &self.record
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }
}

/// Trait for handling change events.
/// Implementations can perform side effects like pushing to stream clients,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent);
}

/// Publishes change events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher wherever events are produced.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers, in registration order.
    pub async fn publish(&self, event: ChangeEvent) {
        log::trace!(
            "Publishing {} on {}.{} to {} handler(s)",
            event.operation_type(),
            event.schema_name(),
            event.table_name(),
            self.handlers.len()
        );
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
