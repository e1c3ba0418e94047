// HTTP routes: ping history and per-container rollups

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::ping_repo::PingRepository;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) repo: Arc<dyn PingRepository>,
    pub(crate) config: AppConfig,
}

pub fn app(repo: Arc<dyn PingRepository>, config: AppConfig) -> Router {
    let state = AppState { repo, config };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/pings", get(http::get_pings).put(http::put_pings)) // GET+PUT /pings
        .route("/pings/aggregate", get(http::get_aggregate)) // GET /pings/aggregate
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
