use admission_gateway::handlers::router;
use admission_gateway::state::AppState;
use admission_gateway::{AdmissionController, Args, MemoryStore, TrustEvaluator};
use axum::{Json, Router, response::IntoResponse, routing::get};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("admission_gateway=info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();

    // misconfiguration is a startup failure, not a per-request one
    let (config, trust, retry) = match (args.limiter_config(), args.trust_policy(), args.retry_policy()) {
        (Ok(config), Ok(trust), Ok(retry)) => (config, trust, retry),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let admission = AdmissionController::new(store, config)
        .with_trust(TrustEvaluator::new(trust))
        .with_retry(retry);
    let state = Arc::new(AppState::new(Arc::new(admission)));

    let routes = Router::new().route("/api/ping", get(ping_handler));
    let app = router(state, routes);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(
        port = args.port,
        max = config.max(),
        window_ms = config.window().as_millis() as u64,
        enabled = config.enabled(),
        suspicious_ip_threshold = trust.threshold(),
        grace_hours = trust.grace().as_secs() / 3600,
        "admission gateway listening"
    );

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn ping_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "success": true }))
}
