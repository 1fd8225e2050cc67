//! Per-connection lifecycle for a streaming client.
//!
//! A [`ClientStream`] is `Connecting` only inside [`ClientStream::open`]; it is
//! handed out already `Streaming` with the readiness acknowledgement queued.
//! It becomes `Closed` when the transport goes away (the stream is dropped),
//! when its queue is closed because the registry evicted it, or when
//! [`ClientStream::close`] is called. Deregistration happens exactly once on
//! every one of those paths.

use crate::connection::{ClientConnection, ConnectionId};
use crate::message::{Message, Payload};
use crate::Manager;
use async_stream::stream;
use axum::response::sse::Event;
use futures::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Closed,
}

pub struct ClientStream {
    manager: Arc<Manager>,
    connection: ClientConnection,
    state: StreamState,
}

impl ClientStream {
    /// Register with the manager and queue the "connection established" frame.
    pub fn open(manager: Arc<Manager>) -> Self {
        let connection = manager.register_connection();
        let mut client = Self {
            manager,
            connection,
            state: StreamState::Connecting,
        };

        if !client
            .manager
            .send_to(&client.connection.id, Message::ConnectionEstablished)
        {
            warn!(
                "Could not queue connection acknowledgement for {}",
                client.connection.id.as_str()
            );
        }

        client.state = StreamState::Streaming;
        client
    }

    pub fn id(&self) -> &ConnectionId {
        &self.connection.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Suspend until the next queued payload arrives.
    ///
    /// Returns `None` once the stream is closed; a closed stream never yields
    /// again, even if payloads were still buffered.
    pub async fn next_payload(&mut self) -> Option<Payload> {
        if self.state == StreamState::Closed {
            return None;
        }

        match self.connection.queue.recv().await {
            Some(payload) => Some(payload),
            None => {
                debug!(
                    "Queue closed for SSE connection {}",
                    self.connection.id.as_str()
                );
                self.close();
                None
            }
        }
    }

    /// Transition to `Closed` and deregister. Later calls do nothing.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.state = StreamState::Closed;
        self.connection.queue.close();
        self.manager.unregister_connection(&self.connection.id);
    }

    /// Adapt into the item stream an axum `Sse` response consumes, one
    /// `data:` frame per payload.
    pub fn into_event_stream(self) -> impl Stream<Item = Result<Event, Infallible>> + Send {
        let mut client = self;
        stream! {
            while let Some(payload) = client.next_payload().await {
                trace!("Writing frame to SSE connection {}", client.id().as_str());
                yield Ok(Event::default().data(payload));
            }
        }
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        if self.state != StreamState::Closed {
            debug!(
                "SSE connection {} dropped by transport, cleaning up",
                self.connection.id.as_str()
            );
        }
        self.close();
    }
}
