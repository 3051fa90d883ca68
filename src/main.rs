use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clubpass::api::{self, AppState};
use clubpass::config::Config;
use clubpass::db;
use clubpass::services::credentials::StaticCredentials;
use clubpass::services::membership_id::IdScheme;
use clubpass::services::storage::CloudinaryStore;
use clubpass::services::token::TokenService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubpass=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting clubpass server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cors = cors_layer(&config)?;

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        file_store: Arc::new(CloudinaryStore::new(
            &config.storage_api_base_url,
            &config.storage_cloud_name,
            &config.storage_api_key,
            config.storage_api_secret.clone(),
        )),
        credentials: Arc::new(StaticCredentials::new(
            &config.admin_username,
            config.admin_password.clone(),
        )),
        tokens: Arc::new(TokenService::new(&config.jwt_secret)),
        id_scheme: IdScheme::new(&config.membership_id_prefix, config.membership_id_pad),
        config: config.clone(),
    };

    // Build router
    let app = Router::new()
        .merge(api::health::router())
        .merge(api::auth::router())
        .merge(api::applicants::router())
        .merge(api::admin::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if let Some(origins) = &config.cors_origins {
        let origins = origins
            .split(',')
            .map(|origin| origin.trim().parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        cors = cors.allow_origin(origins).allow_credentials(true);
    }

    Ok(cors)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
