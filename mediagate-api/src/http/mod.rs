// Module: http
// REST endpoints and the WebSocket progress channel

pub mod download;
pub mod error;
pub mod health;
pub mod media;
pub mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};
use mediagate_core::config::Config;
use mediagate_core::provider::MediaExtractor;
use mediagate_core::service::{DeliveryService, MetadataService};
use mediagate_session::{ChannelRegistry, ProgressSource, RetrievalRunner};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub metadata: MetadataService,
    pub delivery: DeliveryService,
    pub registry: ChannelRegistry,
    pub runner: RetrievalRunner,
    /// Largest inbound WebSocket message accepted
    pub max_message_size: usize,
}

impl AppState {
    /// Wire the services around one extraction engine
    #[must_use]
    pub fn new(extractor: Arc<dyn MediaExtractor>, config: &Config) -> Self {
        let metadata = MetadataService::new(Arc::clone(&extractor));
        let delivery = DeliveryService::new(extractor);
        let registry = ChannelRegistry::new(&config.channels);
        let runner = RetrievalRunner::new(
            registry.clone(),
            metadata.clone(),
            ProgressSource::from_config(&config.progress),
        );

        Self {
            metadata,
            delivery,
            registry,
            runner,
            max_message_size: config.channels.max_message_size,
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(health::create_health_router())
        .route("/api/info", get(media::get_info))
        .route("/api/download", get(download::download))
        .route("/ws/{client_id}", get(websocket::websocket_handler));

    // Every origin, method and header is allowed
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    router.with_state(state)
}
