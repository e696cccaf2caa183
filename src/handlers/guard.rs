// Admission middleware: 429 when blocked, 500 when the check fails.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::models::{AdmissionResult, RequestIdentity, ip_key};
use crate::state::AppState;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const SUSPICIOUS_IP: HeaderName = HeaderName::from_static("x-suspicious-ip");

/// Authenticated caller, inserted as a request extension by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

pub async fn admission_guard(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.ip());
    let ip = client_ip(req.headers(), peer);
    let identity = req
        .extensions()
        .get::<CallerIdentity>()
        .map(|caller| RequestIdentity::new(caller.0.clone(), ip.clone()));

    let limit = state.admission.config().max();
    match state.admission.admit(&ip_key(&ip), Utc::now(), identity.as_ref()).await {
        Ok(AdmissionResult::Allowed { suspicious, remaining }) => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
            if suspicious {
                headers.insert(SUSPICIOUS_IP, HeaderValue::from_static("true"));
            }
            response
        }
        Ok(AdmissionResult::Blocked { retry_after_secs }) => too_many_requests(retry_after_secs),
        Err(err) => err.into_response(),
    }
}

fn too_many_requests(retry_after_secs: u64) -> Response {
    let body = Json(json!({
        "success": false,
        "error": "Too many requests, please try again later",
        "retryAfterSeconds": retry_after_secs,
    }));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

// First hop of x-forwarded-for, then x-real-ip, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
