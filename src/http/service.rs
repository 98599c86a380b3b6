//! Request pipeline: client resolution, admission gate, and counting handlers.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::error::ApiError;
use crate::clock::SharedClock;
use crate::config::CounterConfig;
use crate::counters::{Category, CounterKey, CounterStore, Snapshot};
use crate::ratelimit::RateLimiter;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub counters: Arc<CounterStore>,
    pub clock: SharedClock,
    bucket_granularity: Duration,
    click_probability: f64,
}

impl AppState {
    pub fn new(
        limiter: Arc<RateLimiter>,
        counters: Arc<CounterStore>,
        clock: SharedClock,
        config: &CounterConfig,
    ) -> Self {
        let click_probability = if config.click_probability.is_nan() {
            0.0
        } else {
            config.click_probability.clamp(0.0, 1.0)
        };

        Self {
            limiter,
            counters,
            clock,
            bucket_granularity: config.bucket_granularity(),
            click_probability,
        }
    }

    /// Key for a view of `category` happening now.
    pub fn key_for(&self, category: Category) -> CounterKey {
        CounterKey::at(category, self.clock.wall(), self.bucket_granularity)
    }
}

/// Build the application router with every route behind the rate limit gate.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome_handler))
        .route("/view", get(view_handler))
        .route("/view/", get(view_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_gate))
        .with_state(state)
}

/// The peer address the connection was accepted from.
fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Admit or reject a request before it reaches any handler.
async fn rate_limit_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(client) = client_ip(&request) else {
        warn!(uri = %request.uri(), "Could not resolve client address");
        return Err(ApiError::ClientResolution);
    };

    if !state.limiter.admit(client) {
        return Err(ApiError::RateLimited(client));
    }

    Ok(next.run(request).await)
}

async fn welcome_handler() -> &'static str {
    "Welcome to Viewmeter"
}

/// Query parameters for `GET /view`.
#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    /// Category to attribute the view to; random when absent
    pub category: Option<Category>,
}

/// Body returned for a counted view.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewResponse {
    pub key: String,
    pub views: u64,
    pub clicks: u64,
    pub clicked: bool,
}

async fn view_handler(
    State(state): State<AppState>,
    query: Result<Query<ViewParams>, QueryRejection>,
) -> Result<Json<ViewResponse>, ApiError> {
    let Query(params) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;

    let (category, wants_click) = {
        let mut rng = rand::thread_rng();
        let category = params.category.unwrap_or_else(|| Category::random(&mut rng));
        (category, rng.gen_bool(state.click_probability))
    };

    let key = state.key_for(category);
    let mut value = state.counters.record_view(key);

    let clicked = wants_click && state.counters.record_click(&key);
    if clicked {
        value = state.counters.get(&key).unwrap_or(value);
    }

    debug!(key = %key, views = value.views, clicks = value.clicks, "View counted");

    Ok(Json(ViewResponse {
        key: key.to_string(),
        views: value.views,
        clicks: value.clicks,
        clicked,
    }))
}

async fn stats_handler(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.counters.snapshot())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "tracked_clients": state.limiter.client_count(),
        "counter_keys": state.counters.len(),
    }))
}
