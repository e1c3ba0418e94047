// Ping repository: one contract, two engines.
//
// The in-memory engine (memory.rs) defines the canonical semantics of
// filtering, ordering, pagination and aggregation; the SQLite engine
// (sqlite.rs) must match it row for row. tests/oracle_tests.rs enforces the
// agreement across the parameter space.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryPingRepo;
pub use sqlite::SqlitePingRepo;

use crate::models::{ContainerInfo, ContainerSortProperty, Ping, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::IpAddr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RepoError {
    /// Malformed or out-of-range input. The caller's fault; not retryable.
    #[error("invalid {what}: {detail}")]
    Validation { what: &'static str, detail: String },

    /// Query execution or connectivity failure against the store. The
    /// caller may retry with backoff; the repository never retries.
    #[error("storage failure during {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A stored value could not be parsed back into its typed form. Data
    /// integrity fault; surfaced immediately, never defaulted.
    #[error("could not decode stored {what} {value:?} during {op}: {detail}")]
    Decode {
        op: &'static str,
        what: &'static str,
        value: String,
        detail: String,
    },

    /// The caller withdrew the request before the operation finished.
    #[error("{op} was cancelled")]
    Cancelled { op: &'static str },
}

impl RepoError {
    pub(crate) fn storage(op: &'static str) -> impl FnOnce(sqlx::Error) -> RepoError {
        move |source| RepoError::Storage { op, source }
    }
}

/// Filter, order and page parameters for [`PingRepository::get`].
///
/// `limit == 0` means unbounded: everything from `offset` to the end.
/// Offsets beyond the available rows yield an empty result, never an error.
#[derive(Debug, Clone, Default)]
pub struct PingGetParams {
    /// Exact-match address filter.
    pub container_ip: Option<IpAddr>,
    /// Exact-match success filter.
    pub success: Option<bool>,
    /// Ascending by timestamp when true; newest first otherwise.
    pub oldest_first: bool,
    pub limit: u32,
    pub offset: u32,
}

/// Cutoff, order and page parameters for [`PingRepository::aggregate`].
///
/// Cutoffs are strict upper bounds and combine with AND: `ping_before`
/// filters on `last_ping`, `success_before` on `last_success`. A container
/// with no successful ping never passes a `success_before` cutoff.
#[derive(Debug, Clone, Default)]
pub struct PingAggregateParams {
    pub ping_before: Option<DateTime<Utc>>,
    pub success_before: Option<DateTime<Utc>>,
    pub sort_property: ContainerSortProperty,
    pub sort_order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

/// The repository facade the request layer consumes.
///
/// Ordering contract, identical in both engines:
/// - `get`: primary key `timestamp` (direction per `oldest_first`),
///   secondary key `id` ascending in both directions (insertion order).
/// - `aggregate`: primary key the chosen rollup property; an absent property
///   sorts before every present value in both directions. Secondary key is
///   the textual form of the IP, ascending.
///
/// Pagination contract: compute the full filtered + sorted sequence, then
/// take `[offset .. offset + limit)`, or `[offset ..]` when `limit == 0`.
#[async_trait]
pub trait PingRepository: Send + Sync {
    /// Filtered, ordered, paged probe history.
    async fn get(
        &self,
        ctx: &CancellationToken,
        params: PingGetParams,
    ) -> Result<Vec<Ping>, RepoError>;

    /// Append a batch of pings. Ids are assigned by storage; the whole batch
    /// becomes visible together or not at all. No dedup.
    async fn put(&self, ctx: &CancellationToken, pings: &[Ping]) -> Result<(), RepoError>;

    /// One rollup row per distinct `container_ip` in storage.
    async fn aggregate(
        &self,
        ctx: &CancellationToken,
        params: PingAggregateParams,
    ) -> Result<Vec<ContainerInfo>, RepoError>;
}

/// Race `work` against the caller's token. Every operation of both engines
/// goes through here so cancellation surfaces the same way everywhere.
pub(crate) async fn run_cancellable<T, F>(
    op: &'static str,
    ctx: &CancellationToken,
    work: F,
) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>> + Send,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(RepoError::Cancelled { op }),
        out = work => out,
    }
}
