pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::ServerConfig;
use crate::services::dispatcher::PostUploadDispatcher;
use crate::services::registry::UploadRegistry;
use crate::services::transform::JsonTransformer;
use crate::services::upload_service::UploadService;
use crate::utils::ids::{IdGenerator, UuidGenerator};
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload::upload_file,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::error::ErrorResponse,
            services::stream::UploadResponse,
        )
    ),
    tags(
        (name = "files", description = "File upload endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub upload_service: Arc<UploadService>,
    pub config: ServerConfig,
    /// Cancelled on shutdown; every upload runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires registry, transformer and dispatcher over the configured directories.
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        Self::with_ids(config, shutdown, Arc::new(UuidGenerator))
    }

    pub fn with_ids(
        config: ServerConfig,
        shutdown: CancellationToken,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let registry = Arc::new(UploadRegistry::new(&config.upload_dir));
        let transformer = Arc::new(JsonTransformer::new(
            &config.upload_dir,
            &config.processed_json_dir,
            ids.clone(),
        ));
        let dispatcher = PostUploadDispatcher::new(transformer);
        let upload_service = Arc::new(UploadService::new(
            registry,
            dispatcher,
            ids,
            config.max_file_size,
        ));

        Self {
            upload_service,
            config,
            shutdown,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/upload", post(api::handlers::upload::upload_file))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
