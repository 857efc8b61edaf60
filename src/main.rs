use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use coursepay_backend::api::{self, ApiState};
use coursepay_backend::config::AppConfig;
use coursepay_backend::database::enrollment_repository::PgEnrollmentRepository;
use coursepay_backend::database::init_pool_from_config;
use coursepay_backend::database::order_repository::PgOrderRepository;
use coursepay_backend::gateway::client::{RazorpayConfig, RazorpayGateway};
use coursepay_backend::health::{HealthChecker, HealthState, HealthStatus};
use coursepay_backend::logging::init_tracing;
use coursepay_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use coursepay_backend::services::reconciliation::ReconciliationEngine;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[derive(Clone)]
struct ProbeState {
    health_checker: HealthChecker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting coursepay backend service"
    );

    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        anyhow::anyhow!("database initialization failed: {e}")
    })?;

    let gateway_config = RazorpayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("gateway configuration error: {}", e))?;
    let key_secret = gateway_config.key_secret.clone();
    let gateway = RazorpayGateway::new(gateway_config)
        .map_err(|e| anyhow::anyhow!("gateway client initialization failed: {}", e))?;
    info!("Payment gateway client initialized");

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(PgOrderRepository::new(db_pool.clone())),
        Arc::new(PgEnrollmentRepository::new(db_pool.clone())),
        Arc::new(gateway),
        key_secret,
    ));

    let health_checker = HealthChecker::new(db_pool.clone());

    let api_routes = Router::new()
        .route("/api/orders", post(api::orders::create_order))
        .route("/api/orders/{order_id}", get(api::orders::get_order))
        .route("/api/payments/verify", post(api::payments::verify_payment))
        .route(
            "/api/enrollments/{subject_id}",
            get(api::enrollments::list_enrollments),
        )
        .route(
            "/api/enrollments/{subject_id}/{resource_id}",
            get(api::enrollments::get_enrollment),
        )
        .with_state(ApiState { engine });

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(ProbeState { health_checker });

    let app = Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn health(
    State(state): State<ProbeState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    State(state): State<ProbeState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    health(State(state)).await
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> &'static str {
    "OK"
}
