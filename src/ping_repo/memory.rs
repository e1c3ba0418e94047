// In-memory reference engine. Plain filter -> sort -> slice pipelines over a
// locked Vec; no query text anywhere. This engine is the ground truth the
// SQLite engine is differentially tested against, and doubles as a
// production engine (engine = "memory") for installs without a database.

use super::{
    PingAggregateParams, PingGetParams, PingRepository, RepoError, run_cancellable,
};
use crate::models::{ContainerInfo, ContainerSortProperty, Ping, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Default)]
struct Store {
    pings: Vec<Ping>,
    next_id: i64,
}

pub struct MemoryPingRepo {
    // Single-writer/multi-reader: put takes the write lock, get/aggregate
    // read locks. There is no external store to delegate isolation to.
    store: RwLock<Store>,
}

impl MemoryPingRepo {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
        }
    }
}

impl Default for MemoryPingRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PingRepository for MemoryPingRepo {
    #[instrument(skip(self, ctx), fields(repo = "memory", operation = "get"))]
    async fn get(
        &self,
        ctx: &CancellationToken,
        params: PingGetParams,
    ) -> Result<Vec<Ping>, RepoError> {
        run_cancellable("get", ctx, async {
            let store = self.store.read().await;
            let mut rows: Vec<Ping> = store
                .pings
                .iter()
                .filter(|p| params.container_ip.is_none_or(|ip| p.container_ip == ip))
                .filter(|p| params.success.is_none_or(|s| p.success == s))
                .cloned()
                .collect();
            drop(store);

            rows.sort_by(|a, b| {
                let by_time = if params.oldest_first {
                    a.timestamp.cmp(&b.timestamp)
                } else {
                    b.timestamp.cmp(&a.timestamp)
                };
                // Ties break on insertion order in both directions.
                by_time.then(a.id.cmp(&b.id))
            });

            Ok(paginate(rows, params.limit, params.offset))
        })
        .await
    }

    #[instrument(skip(self, ctx, pings), fields(repo = "memory", operation = "put", count = pings.len()))]
    async fn put(&self, ctx: &CancellationToken, pings: &[Ping]) -> Result<(), RepoError> {
        run_cancellable("put", ctx, async {
            // One write-lock acquisition: the batch appears whole or not at all.
            let mut store = self.store.write().await;
            for ping in pings {
                store.next_id += 1;
                let mut stored = ping.truncated();
                stored.id = store.next_id;
                store.pings.push(stored);
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(repo = "memory", operation = "aggregate"))]
    async fn aggregate(
        &self,
        ctx: &CancellationToken,
        params: PingAggregateParams,
    ) -> Result<Vec<ContainerInfo>, RepoError> {
        run_cancellable("aggregate", ctx, async {
            let store = self.store.read().await;
            // Keyed by the textual IP so the secondary sort key is already
            // at hand (and matches the stored column's text ordering).
            let mut rollups: BTreeMap<String, RollupRow> = BTreeMap::new();
            for p in &store.pings {
                let row = rollups
                    .entry(p.container_ip.to_string())
                    .or_insert_with(|| RollupRow::new(p.container_ip));
                row.observe(p);
            }
            drop(store);

            let mut rows: Vec<(String, ContainerInfo)> = rollups
                .into_iter()
                .filter(|(_, row)| row.passes_cutoffs(&params))
                .map(|(key, row)| (key, row.info))
                .collect();

            rows.sort_by(|(a_key, a), (b_key, b)| {
                let (a_prop, b_prop) = match params.sort_property {
                    ContainerSortProperty::LastPing => (&a.last_ping, &b.last_ping),
                    ContainerSortProperty::LastSuccess => (&a.last_success, &b.last_success),
                };
                cmp_absent_first(a_prop, b_prop, params.sort_order).then(a_key.cmp(b_key))
            });

            Ok(paginate(
                rows.into_iter().map(|(_, info)| info).collect(),
                params.limit,
                params.offset,
            ))
        })
        .await
    }
}

struct RollupRow {
    info: ContainerInfo,
}

impl RollupRow {
    fn new(ip: IpAddr) -> Self {
        Self {
            info: ContainerInfo {
                ip,
                last_ping: None,
                last_success: None,
            },
        }
    }

    fn observe(&mut self, p: &Ping) {
        self.info.last_ping = max_instant(self.info.last_ping, p.timestamp);
        if p.success {
            self.info.last_success = max_instant(self.info.last_success, p.timestamp);
        }
    }

    fn passes_cutoffs(&self, params: &PingAggregateParams) -> bool {
        let ping_ok = match (params.ping_before, self.info.last_ping) {
            (Some(cutoff), Some(last)) => last < cutoff,
            (Some(_), None) => false,
            (None, _) => true,
        };
        // A container with no successful ping has nothing strictly before
        // the cutoff, so it is excluded.
        let success_ok = match (params.success_before, self.info.last_success) {
            (Some(cutoff), Some(last)) => last < cutoff,
            (Some(_), None) => false,
            (None, _) => true,
        };
        ping_ok && success_ok
    }
}

fn max_instant(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match current {
        Some(existing) if existing >= candidate => Some(existing),
        _ => Some(candidate),
    }
}

/// Absent values sort before every present value in both directions;
/// containers without a successful ping never error a sort, they lead it.
fn cmp_absent_first(
    a: &Option<DateTime<Utc>>,
    b: &Option<DateTime<Utc>>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match order {
            SortOrder::Asc => x.cmp(y),
            SortOrder::Desc => y.cmp(x),
        },
    }
}

/// `[offset .. offset + limit)` over the full sequence; `limit == 0` means
/// everything from `offset` on. Out-of-range offsets yield an empty Vec.
fn paginate<T>(rows: Vec<T>, limit: u32, offset: u32) -> Vec<T> {
    let take = if limit == 0 {
        usize::MAX
    } else {
        limit as usize
    };
    rows.into_iter().skip(offset as usize).take(take).collect()
}
