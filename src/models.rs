// Domain models: reachability probes and per-container rollups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One reachability probe result for a container address at an instant.
///
/// `id` is assigned by storage (zero until persisted) and stays out of the
/// JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(skip)]
    pub id: i64,
    pub container_ip: IpAddr,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl Ping {
    pub fn new(container_ip: IpAddr, timestamp: DateTime<Utc>, success: bool) -> Self {
        Self {
            id: 0,
            container_ip,
            timestamp,
            success,
        }
    }

    /// Copy with the timestamp truncated to whole seconds. Storage keeps
    /// second precision only, so both engines truncate on write.
    pub fn truncated(&self) -> Ping {
        Ping {
            timestamp: truncate_to_seconds(self.timestamp),
            ..self.clone()
        }
    }

    /// Identity across a storage round trip: `(ip, timestamp, success)` at
    /// whole-second precision. `id` and sub-second digits do not survive.
    pub fn key(&self) -> (IpAddr, i64, bool) {
        (self.container_ip, self.timestamp.timestamp(), self.success)
    }
}

/// Drop sub-second digits, keeping the instant otherwise unchanged.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - chrono::Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
}

/// Per-container rollup: most recent probe and most recent successful probe.
/// Never stored; recomputed from the ping set on every aggregate call.
/// `last_success` is absent when the container has no successful ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub ip: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

/// Rollup column an aggregate result is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerSortProperty {
    #[default]
    LastPing,
    LastSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}
