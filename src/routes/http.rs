// Handlers: parse and validate raw query input into typed repository
// parameters, map repository errors to status codes, serialize results.

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::models::{ContainerInfo, ContainerSortProperty, Ping, SortOrder};
use crate::ping_repo::{PingAggregateParams, PingGetParams, RepoError};
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

pub(super) struct ApiError(RepoError);

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RepoError::Validation { .. } => StatusCode::BAD_REQUEST,
            RepoError::Storage { .. } | RepoError::Decode { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RepoError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Typed extraction failures (bad address, bad boolean, bad instant) are the
/// caller's fault; fold them into the validation arm so every error leaves
/// in the same JSON shape.
fn bad_query(what: &'static str) -> impl FnOnce(QueryRejection) -> ApiError {
    move |rejection| {
        ApiError(RepoError::Validation {
            what,
            detail: rejection.body_text(),
        })
    }
}

fn bad_body(what: &'static str) -> impl FnOnce(JsonRejection) -> ApiError {
    move |rejection| {
        ApiError(RepoError::Validation {
            what,
            detail: rejection.body_text(),
        })
    }
}

/// Enforce the configured query deadline: cancel the in-flight repository
/// call and answer 503 instead of blocking the client indefinitely.
async fn with_deadline<T>(
    timeout_ms: u64,
    token: &CancellationToken,
    op: &'static str,
    call: impl Future<Output = Result<T, RepoError>>,
) -> Result<T, RepoError> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Ok(result) => result,
        Err(_) => {
            token.cancel();
            Err(RepoError::Cancelled { op })
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GetPingsQuery {
    container_ip: Option<IpAddr>,
    success: Option<bool>,
    #[serde(default)]
    oldest_first: bool,
    #[serde(default)]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// GET /pings — filtered, ordered, paged probe history.
pub(super) async fn get_pings(
    State(state): State<AppState>,
    query: Result<Query<GetPingsQuery>, QueryRejection>,
) -> Result<Json<Vec<Ping>>, ApiError> {
    let Query(query) = query.map_err(bad_query("ping query parameters"))?;
    let params = PingGetParams {
        container_ip: query.container_ip,
        success: query.success,
        oldest_first: query.oldest_first,
        limit: query.limit,
        offset: query.offset,
    };
    let token = CancellationToken::new();
    let pings = with_deadline(
        state.config.database.query_timeout_ms,
        &token,
        "get",
        state.repo.get(&token, params),
    )
    .await?;
    Ok(Json(pings))
}

/// PUT /pings — append a batch of probes. Ids in the body are ignored.
pub(super) async fn put_pings(
    State(state): State<AppState>,
    body: Result<Json<Vec<Ping>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(pings) = body.map_err(bad_body("ping batch body"))?;
    let token = CancellationToken::new();
    with_deadline(
        state.config.database.query_timeout_ms,
        &token,
        "put",
        state.repo.put(&token, &pings),
    )
    .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub(super) struct AggregateQuery {
    #[serde(default)]
    sort_property: ContainerSortProperty,
    #[serde(default)]
    sort_order: SortOrder,
    ping_before: Option<DateTime<Utc>>,
    success_before: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// GET /pings/aggregate — one rollup row per distinct container address.
pub(super) async fn get_aggregate(
    State(state): State<AppState>,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> Result<Json<Vec<ContainerInfo>>, ApiError> {
    let Query(query) = query.map_err(bad_query("aggregate query parameters"))?;
    let params = PingAggregateParams {
        ping_before: query.ping_before,
        success_before: query.success_before,
        sort_property: query.sort_property,
        sort_order: query.sort_order,
        limit: query.limit,
        offset: query.offset,
    };
    let token = CancellationToken::new();
    let rollups = with_deadline(
        state.config.database.query_timeout_ms,
        &token,
        "aggregate",
        state.repo.aggregate(&token, params),
    )
    .await?;
    Ok(Json(rollups))
}
