use axum::Router;
use clinic_attribution::config::Config;
use clinic_attribution::handlers::AppState;
use clinic_attribution::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Sets up logging, loads configuration, builds the shared state and serves
/// the router. Third-party facing routes sit behind a per-IP rate limiter;
/// the health check and the marketing pages bypass it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_attribution=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let port = config.port;
    let app_state = Arc::new(AppState::new(config)?);

    match (
        app_state.forwarder.ga4_enabled(),
        app_state.forwarder.meta_enabled(),
    ) {
        (false, false) => {
            tracing::info!("Conversion forwarding disabled - conversions will only be logged")
        }
        (ga4, meta) => tracing::info!("Conversion forwarding enabled: ga4={}, meta={}", ga4, meta),
    }

    // Rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = routes::integration_routes().layer(GovernorLayer {
        config: governor_conf,
    });

    let app = Router::new()
        .merge(routes::public_routes())
        .merge(protected_routes)
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // The rate limiter falls back to the peer address when no proxy headers are present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
