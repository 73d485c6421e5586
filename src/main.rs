mod auth;
mod clients;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod store;
mod ws;

use std::panic;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;
use state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "quiz_hub=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config.clone());

    // Token validation cache
    services::auth_service::init_claims_cache().await;
    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - all authenticated requests will be rejected");
    }

    // Connect to the score ledger if a URL is provided
    if let Some(db_url) = &config.score_db_url {
        match db::scoredb::init_db(db_url).await {
            Ok(_) => info!("Score ledger initialized successfully"),
            Err(e) => {
                error!("Failed to initialize score ledger: {}", e);
                warn!("Score heartbeats will not be available");
            }
        }
    } else {
        warn!("No score ledger URL configured - score heartbeats will not be available");
    }

    // Session service client for round metadata
    match (&config.session_service_url, &config.auth_jwt_secret) {
        (Some(url), Some(secret)) => {
            if let Err(e) = clients::session_service::init_session_service_client(
                url.clone(),
                secret.clone(),
                config.service_name.clone(),
            ) {
                error!("Failed to initialize session service client: {}", e);
            }
        }
        (Some(_), None) => {
            warn!("Session service URL configured without a JWT secret - round metadata disabled")
        }
        _ => warn!("No session service URL configured - round metadata will not be available"),
    }

    let state = AppState::new(&config);

    // Create API routes
    let api_routes = create_api_routes(Arc::clone(&state));

    // WebSocket endpoint
    let ws_routes = Router::new()
        .route("/ws/:session_id/:role", get(ws::handler::ws_upgrade))
        .with_state(Arc::clone(&state));

    // CORS
    let cors = match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> =
                origins.split(',').filter_map(|origin| origin.trim().parse().ok()).collect();
            CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        // Mount WebSocket routes
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
