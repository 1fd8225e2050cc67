use events::EventPublisher;
use log::*;
use realtime::{DedupCache, SubscriptionManager};
use service::{config::Config, logging::Logger, AppState};
use sse::{Manager, SseChangeEventHandler};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!("Starting realtime relay...");

    let sse_manager = Arc::new(Manager::new(config.client_queue_capacity));
    let publisher = EventPublisher::new()
        .with_handler(Arc::new(SseChangeEventHandler::new(sse_manager.clone())));

    let feed = match service::init_realtime(&config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to the realtime service: {e}");
            std::process::exit(1);
        }
    };

    let subscription = match SubscriptionManager::new(
        feed.clone(),
        Arc::new(DedupCache::new(config.dedup_capacity)),
        publisher,
        service::subscription_config(&config),
    )
    .start()
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to subscribe to database changes: {e}");
            std::process::exit(1);
        }
    };

    let app_state = AppState::new(config, &sse_manager);
    let shutdown_manager = sse_manager.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, closing stream connections");
        shutdown_manager.disconnect_all();
    };

    let served = web::init_server(app_state, shutdown).await;

    subscription.abort();
    feed.disconnect().await;

    if let Err(e) = served {
        error!("Server terminated with error: {e}");
        std::process::exit(1);
    }
    info!("Realtime relay stopped");
}
