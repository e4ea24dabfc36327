//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpEvidenceAdapter, OpenAiCreatorAdapter},
    config::Config,
    error::ApiError,
    web::{
        access_handler,
        auth::{login_handler, logout_handler, signup_handler},
        create_term_ai_handler, create_term_handler, list_sources_handler, lookup_handler,
        require_auth, resolve_principal, rest::ApiDoc, run_monitoring_pass_handler,
        source_cache::SourceThresholdCache, state::AppState, track_term_handler, trends_handler,
        upsert_source_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use slanglab_core::ports::DirectoryService;
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let creator_adapter = Arc::new(OpenAiCreatorAdapter::new(
        openai_client,
        config.creator_model.clone(),
    ));

    let evidence_adapter = Arc::new(
        HttpEvidenceAdapter::new(
            config.evidence_api_url.clone(),
            config.evidence_api_key.clone(),
            config.backend_timeout,
        )
        .map_err(|e| ApiError::Internal(format!("Failed to build evidence client: {}", e)))?,
    );

    // --- 4. Load the Plan Catalog & Build the Shared AppState ---
    // The table was seeded by the migrations above; a missing plan row is
    // logged inside the loader and leaves that plan locked.
    let catalog = Arc::new(db_adapter.load_plan_catalog().await?);
    let thresholds = Arc::new(SourceThresholdCache::new(config.source_cache_ttl));

    let app_state = Arc::new(AppState {
        directory: db_adapter,
        evidence: evidence_adapter,
        creator: creator_adapter,
        config: config.clone(),
        catalog,
        thresholds,
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/internal/monitoring/run", post(run_monitoring_pass_handler));

    // Open routes (anonymous allowed, principal resolved when present)
    let open_routes = Router::new()
        .route("/lookup", get(lookup_handler))
        .route("/me/access", get(access_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            resolve_principal,
        ));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/terms", post(create_term_handler))
        .route("/terms/ai", post(create_term_ai_handler))
        .route("/terms/{term_id}/track", post(track_term_handler))
        .route("/terms/{term_id}/trends", get(trends_handler))
        .route("/admin/sources", get(list_sources_handler))
        .route("/admin/sources/{name}", put(upsert_source_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(open_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
