use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use log::*;
use sse::ClientStream;
use std::convert::Infallible;
use std::time::Duration;

/// SSE handler that establishes a long-lived connection streaming every
/// database change. The first frame is always the connection acknowledgement.
///
/// When the peer goes away hyper drops the stream, which deregisters the
/// connection.
#[utoipa::path(
    get,
    path = "/stream",
    responses(
        (status = 200, description = "Event stream of `data: <json>` frames", content_type = "text/event-stream", body = String)
    )
)]
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client = ClientStream::open(app_state.sse_manager.clone());
    debug!("Establishing SSE connection {}", client.id().as_str());

    let keep_alive = KeepAlive::new().interval(Duration::from_secs(
        app_state.config.sse_keep_alive_secs.max(1),
    ));

    Sse::new(client.into_event_stream()).keep_alive(keep_alive)
}
