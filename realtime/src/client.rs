//! WebSocket client for the managed backend's realtime service.
//!
//! Speaks the Phoenix channel JSON protocol: one `phx_join` per subscription,
//! a `heartbeat` on the `phoenix` topic at a fixed interval, and
//! `postgres_changes` pushes carrying `{data, ids}` payloads.

use crate::error::{config_error, subscription_error, Error};
use crate::feed::{ChangeFeed, SubscriptionFilter};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CHANNEL: &str = "any_table_events";

const PROTOCOL_VERSION: &str = "1.0.0";
const JOIN_REF: &str = "1";
const NOTIFICATION_BUFFER: usize = 1024;
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub project_url: String,
    pub api_key: SecretString,
    pub channel: String,
    pub heartbeat_interval: Duration,
}

impl RealtimeConfig {
    pub fn new(project_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            project_url: project_url.into(),
            api_key,
            channel: DEFAULT_CHANNEL.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }
}

/// One frame of the channel protocol.
#[derive(Debug, Serialize, Deserialize)]
struct ChannelMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// Joined flag tagged with the session that set it, so a session that is
/// being replaced cannot overwrite its successor's state.
#[derive(Default)]
struct Presence {
    generation: AtomicU64,
    joined: AtomicBool,
}

impl Presence {
    fn begin_session(&self) -> u64 {
        self.joined.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn set_joined(&self, generation: u64, joined: bool) {
        if self.generation.load(Ordering::Acquire) == generation {
            self.joined.store(joined, Ordering::Release);
        }
    }

    fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    notifications: mpsc::Sender<Value>,
}

#[derive(Default)]
struct ClientState {
    pending_socket: Option<Socket>,
    subscription: Option<Subscription>,
    session: Option<JoinHandle<()>>,
}

pub struct RealtimeClient {
    endpoint: Url,
    api_key: SecretString,
    topic: String,
    heartbeat_interval: Duration,
    presence: Arc<Presence>,
    state: Mutex<ClientState>,
}

impl RealtimeClient {
    /// Authenticate against the realtime endpoint by opening the socket.
    ///
    /// Fails with a `Config` error for an empty or unusable URL or key and
    /// with an `Authentication` error when the upstream rejects the key.
    pub async fn connect(config: RealtimeConfig) -> Result<Self, Error> {
        let endpoint = websocket_endpoint(&config.project_url, &config.api_key)?;
        let socket = open_socket(&endpoint).await?;
        info!(
            "Connected to realtime service at {}",
            endpoint.host_str().unwrap_or_default()
        );

        Ok(Self {
            endpoint,
            api_key: config.api_key,
            topic: format!("realtime:{}", config.channel),
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            presence: Arc::new(Presence::default()),
            state: Mutex::new(ClientState {
                pending_socket: Some(socket),
                ..ClientState::default()
            }),
        })
    }

    /// Stop the active session, if any.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.take() {
            session.abort();
        }
        state.pending_socket = None;
        self.presence.begin_session();
    }

    fn spawn_session(&self, socket: Socket, subscription: &Subscription) -> JoinHandle<()> {
        let session = Session {
            topic: self.topic.clone(),
            join_payload: join_payload(&subscription.filter, &self.api_key),
            heartbeat_interval: self.heartbeat_interval,
            notifications: subscription.notifications.clone(),
            presence: self.presence.clone(),
            generation: self.presence.begin_session(),
        };
        tokio::spawn(session.run(socket))
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, filter: SubscriptionFilter) -> Result<mpsc::Receiver<Value>, Error> {
        let mut state = self.state.lock().await;
        if state.subscription.is_some() {
            return Err(subscription_error("channel is already subscribed"));
        }

        let socket = match state.pending_socket.take() {
            Some(socket) => socket,
            None => open_socket(&self.endpoint).await?,
        };

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let subscription = Subscription {
            filter,
            notifications: tx,
        };
        info!(
            "Subscribing to {} changes on {}.{}",
            subscription.filter.event, subscription.filter.schema, subscription.filter.table
        );
        state.session = Some(self.spawn_session(socket, &subscription));
        state.subscription = Some(subscription);

        Ok(rx)
    }

    async fn rejoin(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.subscription.is_none() {
            return Err(subscription_error("no subscription to rejoin"));
        }
        if let Some(session) = state.session.take() {
            session.abort();
        }

        let socket = open_socket(&self.endpoint).await?;
        let handle = match state.subscription.as_ref() {
            Some(subscription) => self.spawn_session(socket, subscription),
            None => return Err(subscription_error("no subscription to rejoin")),
        };
        state.session = Some(handle);
        info!("Rejoining realtime channel {}", self.topic);

        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.presence.is_joined()
    }
}

/// The task driving one socket: join, heartbeat, forward change pushes.
struct Session {
    topic: String,
    join_payload: Value,
    heartbeat_interval: Duration,
    notifications: mpsc::Sender<Value>,
    presence: Arc<Presence>,
    generation: u64,
}

impl Session {
    async fn run<S>(self, socket: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut write, mut read) = socket.split();

        let join = ChannelMessage {
            topic: self.topic.clone(),
            event: "phx_join".to_string(),
            payload: self.join_payload.clone(),
            reference: Some(JOIN_REF.to_string()),
        };
        if let Err(e) = send(&mut write, &join).await {
            warn!("Failed to send join for {}: {e}", self.topic);
            return;
        }
        debug!("Join sent for {}", self.topic);

        let mut heartbeat =
            tokio::time::interval(self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL));
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !self.handle_frame(text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        warn!("Realtime socket closed by server: {reason:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {e}");
                        break;
                    }
                    None => {
                        warn!("Realtime socket ended");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    let beat = ChannelMessage {
                        topic: "phoenix".to_string(),
                        event: "heartbeat".to_string(),
                        payload: json!({}),
                        reference: Some(next_ref.to_string()),
                    };
                    next_ref += 1;
                    if let Err(e) = send(&mut write, &beat).await {
                        warn!("Failed to send heartbeat: {e}");
                        break;
                    }
                    trace!("Heartbeat sent");
                }
            }
        }

        self.presence.set_joined(self.generation, false);
    }

    /// Returns `false` when the session should stop.
    async fn handle_frame(&self, text: &str) -> bool {
        let message: ChannelMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring unparseable realtime frame: {e}");
                return true;
            }
        };

        if message.topic != self.topic {
            trace!("Frame for topic {} ({})", message.topic, message.event);
            return true;
        }

        match message.event.as_str() {
            "phx_reply" if message.reference.as_deref() == Some(JOIN_REF) => {
                let status = message.payload.get("status").and_then(Value::as_str);
                if status == Some("ok") {
                    info!("Realtime channel {} joined", self.topic);
                    self.presence.set_joined(self.generation, true);
                } else {
                    warn!(
                        "Realtime channel {} join refused: {}",
                        self.topic, message.payload
                    );
                    self.presence.set_joined(self.generation, false);
                }
            }
            "postgres_changes" => {
                if self.notifications.send(message.payload).await.is_err() {
                    debug!("Notification receiver dropped, ending session");
                    return false;
                }
            }
            "phx_close" | "phx_error" => {
                warn!("Realtime channel {} left: {}", self.topic, message.event);
                self.presence.set_joined(self.generation, false);
            }
            other => {
                debug!("Unhandled realtime event {other} on {}", self.topic);
            }
        }

        true
    }
}

async fn send<S>(write: &mut S, message: &ChannelMessage) -> Result<(), Error>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: crate::error::ErrorKind::Protocol,
    })?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn open_socket(endpoint: &Url) -> Result<Socket, Error> {
    let (socket, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
    Ok(socket)
}

fn join_payload(filter: &SubscriptionFilter, api_key: &SecretString) -> Value {
    json!({
        "config": {
            "broadcast": {"ack": false, "self": false},
            "presence": {"key": ""},
            "postgres_changes": [{
                "event": filter.event,
                "schema": filter.schema,
                "table": filter.table,
            }],
        },
        "access_token": api_key.expose_secret(),
    })
}

/// Derive the realtime socket URL from the project URL.
fn websocket_endpoint(project_url: &str, api_key: &SecretString) -> Result<Url, Error> {
    if project_url.trim().is_empty() {
        return Err(config_error("project URL is empty"));
    }
    if api_key.expose_secret().trim().is_empty() {
        return Err(config_error("service role key is empty"));
    }

    let mut url = Url::parse(project_url.trim())?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(config_error(&format!("unsupported URL scheme: {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| config_error("cannot derive websocket URL"))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key.expose_secret())
        .append_pair("vsn", PROTOCOL_VERSION);

    Ok(url)
}
