use crate::controller::StatusResponse;
use crate::params::message::CreateParams;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sse::message::Message as SseMessage;

use log::*;

/// POST a message to every connected stream client, bypassing deduplication.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = CreateParams,
    responses(
        (status = 200, description = "Message queued for every connected client", body = StatusResponse),
        (status = 400, description = "Malformed JSON body"),
        (status = 422, description = "Unprocessable Entity")
    )
)]
pub async fn create(
    State(app_state): State<AppState>,
    Json(params): Json<CreateParams>,
) -> impl IntoResponse {
    let delivered = app_state
        .sse_manager
        .send_message(SseMessage::Injected(params.message));

    debug!("Injected message queued for {delivered} client(s)");

    (StatusCode::OK, Json(StatusResponse::new("sent")))
}
