use crate::{controller::health_check_controller, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::controller::message_controller;
use crate::sse::handler as sse_handler;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI document. To be a part
// of the rendered document, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Realtime Relay API"
        ),
        paths(
            health_check_controller::health_check,
            message_controller::create,
            sse_handler::sse_handler,
        ),
        components(
            schemas(
                crate::controller::StatusResponse,
                crate::params::message::CreateParams,
            )
        ),
        tags(
            (name = "realtime_relay", description = "Database change stream relay")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(stream_routes(app_state.clone()))
        .merge(message_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(CorsLayer::permissive())
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/stream", get(sse_handler::sse_handler))
        .with_state(app_state)
}

fn message_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/messages", post(message_controller::create))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use service::config::Config;
    use sse::message::Message as SseMessage;
    use sse::Manager;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let config = Config::parse_from(["relay"]);
        AppState::new(config, &Arc::new(Manager::default()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_status_and_version() {
        let response = define_routes(app_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn posted_message_reaches_every_registered_queue() {
        let state = app_state();
        let mut a = state.sse_manager.register_connection();
        let mut b = state.sse_manager.register_connection();

        let response = define_routes(state.clone())
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"message": "ping"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "sent"}));
        assert_eq!(a.queue.recv().await.as_deref(), Some("ping"));
        assert_eq!(b.queue.recv().await.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn message_without_text_is_rejected() {
        let response = define_routes(app_state())
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"msg": 1}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn malformed_or_untyped_body_is_rejected_by_extractor() {
        let state = app_state();
        let mut client = state.sse_manager.register_connection();

        let malformed = define_routes(state.clone())
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"message\":"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let untyped = define_routes(state)
            .oneshot(
                Request::post("/messages")
                    .body(Body::from(json!({"message": "ping"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(untyped.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        assert!(client.queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn openapi_document_lists_relay_paths() {
        let response = define_routes(app_state())
            .oneshot(
                Request::get("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        for path in ["/health", "/messages", "/stream"] {
            assert!(body["paths"].get(path).is_some(), "{path} missing");
        }
    }

    /// Reads SSE frames off a live HTTP response, skipping keep-alive comments.
    struct FrameReader<S> {
        chunks: S,
        buffer: String,
    }

    impl<S> FrameReader<S>
    where
        S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    {
        async fn next_data(&mut self) -> anyhow::Result<String> {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let frame: String = self.buffer.drain(..end + 2).collect();
                    if let Some(data) = frame.trim_end().strip_prefix("data: ") {
                        return Ok(data.to_string());
                    }
                    continue;
                }
                let chunk = tokio::time::timeout(Duration::from_secs(5), self.chunks.next())
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("stream ended"))??;
                self.buffer.push_str(std::str::from_utf8(&chunk)?);
            }
        }
    }

    #[tokio::test]
    async fn stream_delivers_acknowledgement_then_events_and_cleans_up() -> anyhow::Result<()> {
        let state = app_state();
        let manager = state.sse_manager.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, define_routes(state)).await });

        let url = format!("http://{addr}/stream");
        let first = reqwest::get(&url).await?;
        let second = reqwest::get(&url).await?;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(
            first.headers()["content-type"].to_str()?,
            "text/event-stream"
        );
        assert_eq!(first.headers()["cache-control"].to_str()?, "no-cache");

        let mut first = FrameReader {
            chunks: first.bytes_stream(),
            buffer: String::new(),
        };
        let mut second = FrameReader {
            chunks: second.bytes_stream(),
            buffer: String::new(),
        };

        let ack: Value = serde_json::from_str(&first.next_data().await?)?;
        assert_eq!(ack["message"], "SSE connection established");
        second.next_data().await?;
        assert_eq!(manager.connection_count(), 2);

        manager.send_message(SseMessage::Injected("hello".to_string()));
        assert_eq!(first.next_data().await?, "hello");
        assert_eq!(second.next_data().await?, "hello");

        drop(second);

        // Writes to the closed socket eventually fail and drop its stream.
        for _ in 0..100 {
            if manager.connection_count() == 1 {
                break;
            }
            manager.send_message(SseMessage::Injected("tick".to_string()));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(
            manager.send_message(SseMessage::Injected("after".to_string())),
            1
        );

        Ok(())
    }
}
