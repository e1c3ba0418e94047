// SQLite engine over sqlx. Timestamps are stored as whole-second RFC 3339
// UTC text ("...Z"), so the column's text ordering is chronological ordering
// and MAX() picks the most recent instant.
//
// Every caller-supplied value is bound as a parameter; ORDER BY fragments
// come from closed enums matched to static SQL, never from caller text.

use super::{
    PingAggregateParams, PingGetParams, PingRepository, RepoError, run_cancellable,
};
use crate::models::{ContainerInfo, ContainerSortProperty, Ping, SortOrder, truncate_to_seconds};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub struct SqlitePingRepo {
    pool: SqlitePool,
}

impl SqlitePingRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                container_ip TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                success INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pings_timestamp ON pings(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Pool handle for tests that need to inspect or corrupt raw rows.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PingRepository for SqlitePingRepo {
    #[instrument(skip(self, ctx), fields(repo = "sqlite", operation = "get"))]
    async fn get(
        &self,
        ctx: &CancellationToken,
        params: PingGetParams,
    ) -> Result<Vec<Ping>, RepoError> {
        run_cancellable("get", ctx, async {
            let direction = if params.oldest_first { "ASC" } else { "DESC" };
            // Secondary key id ASC: ties break on insertion order in both
            // directions, matching the in-memory engine's stable sort.
            let sql = format!(
                "SELECT id, container_ip, timestamp, success FROM pings \
                 WHERE ($1 IS NULL OR container_ip = $1) AND ($2 IS NULL OR success = $2) \
                 ORDER BY timestamp {direction}, id ASC LIMIT $3 OFFSET $4",
            );

            let rows = sqlx::query(&sql)
                .bind(params.container_ip.map(|ip| ip.to_string()))
                .bind(params.success)
                .bind(sql_limit(params.limit))
                .bind(params.offset as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(RepoError::storage("get"))?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(decode_ping_row(&row)?);
            }
            Ok(out)
        })
        .await
    }

    #[instrument(skip(self, ctx, pings), fields(repo = "sqlite", operation = "put", count = pings.len()))]
    async fn put(&self, ctx: &CancellationToken, pings: &[Ping]) -> Result<(), RepoError> {
        run_cancellable("put", ctx, async {
            if pings.is_empty() {
                return Ok(());
            }
            // Single transaction: the batch becomes visible whole or not at all.
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(RepoError::storage("put"))?;
            for ping in pings {
                sqlx::query(
                    "INSERT INTO pings (container_ip, timestamp, success) VALUES ($1, $2, $3)",
                )
                .bind(ping.container_ip.to_string())
                .bind(format_instant(ping.timestamp))
                .bind(ping.success)
                .execute(&mut *tx)
                .await
                .map_err(RepoError::storage("put"))?;
            }
            tx.commit().await.map_err(RepoError::storage("put"))?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(repo = "sqlite", operation = "aggregate"))]
    async fn aggregate(
        &self,
        ctx: &CancellationToken,
        params: PingAggregateParams,
    ) -> Result<Vec<ContainerInfo>, RepoError> {
        run_cancellable("aggregate", ctx, async {
            let sort_column = match params.sort_property {
                ContainerSortProperty::LastPing => "last_ping",
                ContainerSortProperty::LastSuccess => "last_success",
            };
            let direction = match params.sort_order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            // NULLS FIRST in both directions: a container without a
            // successful ping leads the sort rather than erroring it.
            // Cutoff comparison on NULL last_success is NULL, so a
            // success_before cutoff excludes such containers.
            let sql = format!(
                "SELECT container_ip, \
                        MAX(timestamp) AS last_ping, \
                        MAX(CASE WHEN success = 1 THEN timestamp END) AS last_success \
                 FROM pings \
                 GROUP BY container_ip \
                 HAVING ($1 IS NULL OR MAX(timestamp) < $1) \
                    AND ($2 IS NULL OR MAX(CASE WHEN success = 1 THEN timestamp END) < $2) \
                 ORDER BY {sort_column} {direction} NULLS FIRST, container_ip ASC \
                 LIMIT $3 OFFSET $4",
            );

            let rows = sqlx::query(&sql)
                .bind(params.ping_before.map(cutoff_text))
                .bind(params.success_before.map(cutoff_text))
                .bind(sql_limit(params.limit))
                .bind(params.offset as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(RepoError::storage("aggregate"))?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(decode_rollup_row(&row)?);
            }
            Ok(out)
        })
        .await
    }
}

/// SQLite reads LIMIT -1 as unbounded, which keeps OFFSET applicable when
/// the caller asked for everything (limit == 0).
fn sql_limit(limit: u32) -> i64 {
    if limit == 0 { -1 } else { limit as i64 }
}

/// Whole-second RFC 3339 UTC, the only form ever written to the column.
fn format_instant(ts: DateTime<Utc>) -> String {
    truncate_to_seconds(ts).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Text form of a strict upper bound. Stored values are whole seconds, so
/// `t < cutoff` with a fractional cutoff equals `t < ceil(cutoff)`.
fn cutoff_text(cutoff: DateTime<Utc>) -> String {
    let whole = truncate_to_seconds(cutoff);
    let bound = if whole < cutoff {
        whole + chrono::Duration::seconds(1)
    } else {
        whole
    };
    bound.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_ping_row(row: &SqliteRow) -> Result<Ping, RepoError> {
    let id: i64 = row.try_get("id").map_err(RepoError::storage("get"))?;
    let raw_ip: String = row
        .try_get("container_ip")
        .map_err(RepoError::storage("get"))?;
    let raw_ts: String = row
        .try_get("timestamp")
        .map_err(RepoError::storage("get"))?;
    let success: bool = row.try_get("success").map_err(RepoError::storage("get"))?;

    Ok(Ping {
        id,
        container_ip: decode_ip("get", &raw_ip)?,
        timestamp: decode_instant("get", &raw_ts)?,
        success,
    })
}

fn decode_rollup_row(row: &SqliteRow) -> Result<ContainerInfo, RepoError> {
    let raw_ip: String = row
        .try_get("container_ip")
        .map_err(RepoError::storage("aggregate"))?;
    let raw_last_ping: Option<String> = row
        .try_get("last_ping")
        .map_err(RepoError::storage("aggregate"))?;
    let raw_last_success: Option<String> = row
        .try_get("last_success")
        .map_err(RepoError::storage("aggregate"))?;

    Ok(ContainerInfo {
        ip: decode_ip("aggregate", &raw_ip)?,
        last_ping: raw_last_ping
            .map(|raw| decode_instant("aggregate", &raw))
            .transpose()?,
        last_success: raw_last_success
            .map(|raw| decode_instant("aggregate", &raw))
            .transpose()?,
    })
}

fn decode_ip(op: &'static str, raw: &str) -> Result<IpAddr, RepoError> {
    raw.parse().map_err(|e: std::net::AddrParseError| RepoError::Decode {
        op,
        what: "IP address",
        value: raw.to_string(),
        detail: e.to_string(),
    })
}

fn decode_instant(op: &'static str, raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepoError::Decode {
            op,
            what: "timestamp",
            value: raw.to_string(),
            detail: e.to_string(),
        })
}
