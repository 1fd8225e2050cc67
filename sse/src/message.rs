use events::ChangeEvent;
use serde::Serialize;
use std::sync::Arc;

/// A serialized frame body, shared by every queue it is pushed onto.
pub type Payload = Arc<str>;

/// Body of the synthetic frame each client receives right after connecting.
#[derive(Debug, Clone, Serialize)]
struct ConnectionEstablished {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'static str,
}

const CONNECTION_ESTABLISHED: ConnectionEstablished = ConnectionEstablished {
    kind: "test",
    message: "SSE connection established",
};

/// Everything that can be pushed onto a client's queue.
#[derive(Debug, Clone)]
pub enum Message {
    /// A normalized database change, serialized as JSON.
    Change(ChangeEvent),
    /// Readiness acknowledgement sent once per connection.
    ConnectionEstablished,
    /// Out-of-band text injected by an operator, forwarded verbatim.
    Injected(String),
}

impl Message {
    /// Encode the message into the `data:` body of one SSE frame.
    pub fn into_payload(self) -> Result<Payload, serde_json::Error> {
        let body = match self {
            Message::Change(event) => serde_json::to_string(&event)?,
            Message::ConnectionEstablished => serde_json::to_string(&CONNECTION_ESTABLISHED)?,
            Message::Injected(text) => text,
        };
        Ok(Payload::from(body))
    }
}
