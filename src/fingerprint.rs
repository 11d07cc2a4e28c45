use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

// Anonymous per-day identity: hash of address + user agent + calendar day.
// Same client on the same day always yields the same token.
pub fn user_hash(addr: Option<IpAddr>, user_agent: Option<&str>, day: NaiveDate, now: DateTime<Utc>) -> String {
    match (addr, user_agent.map(str::trim).filter(|ua| !ua.is_empty())) {
        (Some(addr), Some(ua)) => {
            let mut hasher = Sha256::new();
            hasher.update(addr.to_string());
            hasher.update(b"|");
            hasher.update(ua);
            hasher.update(b"|");
            hasher.update(day.format("%Y-%m-%d").to_string());
            format!("{:x}", hasher.finalize())
        }
        // Unknown client: a token that will not match anything persisted
        _ => fallback_hash(now),
    }
}

pub fn fallback_hash(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    let mut hasher = Sha256::new();
    hasher.update(b"fallback|");
    hasher.update(nanos.to_le_bytes());
    format!("{:x}", hasher.finalize())
}
