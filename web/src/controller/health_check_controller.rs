use crate::controller::StatusResponse;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// GET service liveness
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "API router is up and responding to requests", body = StatusResponse),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse::new("healthy").with_version(env!("CARGO_PKG_VERSION"))),
    )
}
