// Shared test helpers: deterministic ping corpora (no RNG; failures must
// reproduce byte for byte)
#![allow(dead_code)] // each test binary uses a different subset

use chrono::{DateTime, TimeZone, Utc};
use pingwatch::models::Ping;
use std::net::{IpAddr, Ipv4Addr};

/// All corpus timestamps hang off this instant so tests are stable.
pub const BASE_SECS: i64 = 1_700_000_000;

pub fn ip(last_octet: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE_SECS + secs, 0).unwrap()
}

pub fn ping(last_octet: u8, secs: i64, success: bool) -> Ping {
    Ping::new(ip(last_octet), at(secs), success)
}

/// 60 pings over 10 addresses with deliberate timestamp collisions (both
/// across addresses and within one address) and mixed success values.
pub fn mixed_corpus() -> Vec<Ping> {
    let mut out = Vec::with_capacity(60);
    for i in 0..60i64 {
        let octet = (i % 10) as u8 + 1;
        let secs = (i * 7) % 20; // collides for i and i + 20
        let success = i % 3 != 0;
        out.push(ping(octet, secs, success));
    }
    out
}

/// Round-trip identity triples, in result order.
pub fn keys(pings: &[Ping]) -> Vec<(IpAddr, i64, bool)> {
    pings.iter().map(|p| p.key()).collect()
}
