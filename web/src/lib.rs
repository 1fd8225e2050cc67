use log::*;
use std::future::Future;
use tokio::net::TcpListener;

pub use service::AppState;

mod controller;
mod params;
pub mod router;
mod sse;

/// Bind the configured interface and serve until `shutdown` resolves.
pub async fn init_server<F>(app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listen_addr = app_state.config.listen_address();
    let listener = TcpListener::bind(&listen_addr).await?;

    info!("Server starting... listening for connections on http://{listen_addr}");

    axum::serve(listener, router::define_routes(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}
