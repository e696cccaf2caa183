mod guard;
mod health;
mod metrics;

pub use guard::{CallerIdentity, RATELIMIT_LIMIT, RATELIMIT_REMAINING, SUSPICIOUS_IP, admission_guard, client_ip};
pub use health::health_handler;
pub use metrics::metrics_handler;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;

use crate::state::AppState;

// Wrap the caller's routes with the admission guard. Health and metrics stay unguarded.
pub fn router(state: Arc<AppState>, routes: Router) -> Router {
    let guarded = routes.layer(middleware::from_fn_with_state(state, admission_guard));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(guarded)
}
