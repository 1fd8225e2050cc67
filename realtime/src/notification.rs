use crate::dedup::EventId;
use crate::error::{notification_error, Error, NotificationErrorKind};
use chrono::{DateTime, Utc};
use events::{ChangeEvent, OperationType};
use serde::Deserialize;
use serde_json::Value;

/// A raw `postgres_changes` notification as pushed by the change feed:
/// `{data: {type, table, schema, record?, old_record?, commit_timestamp}, ids: [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNotification {
    pub data: RawChange,
    #[serde(default)]
    pub ids: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: String,
    pub table: String,
    pub schema: String,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    pub commit_timestamp: String,
}

impl RawNotification {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Notification(NotificationErrorKind::Malformed),
        })
    }

    /// The first upstream identifier, if any.
    pub fn event_id(&self) -> Option<EventId> {
        self.ids.first().and_then(EventId::from_value)
    }

    /// Normalize into a [`ChangeEvent`], taking `record` when it carries data
    /// and falling back to `old_record` (deletes only carry the pre-image).
    pub fn into_change_event(self) -> Result<ChangeEvent, Error> {
        let change = self.data;

        let operation_type: OperationType = change.kind.parse().map_err(|_| {
            notification_error(NotificationErrorKind::UnknownOperation, &change.kind)
        })?;

        let committed_at = DateTime::parse_from_rfc3339(&change.commit_timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| {
                notification_error(
                    NotificationErrorKind::InvalidTimestamp,
                    &change.commit_timestamp,
                )
            })?;

        let record = change
            .record
            .filter(is_populated)
            .or(change.old_record)
            .unwrap_or(Value::Null);

        Ok(ChangeEvent::new(
            operation_type,
            change.table,
            change.schema,
            record,
            committed_at,
        ))
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}
