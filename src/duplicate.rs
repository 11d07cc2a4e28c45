use chrono::{DateTime, Duration, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

use crate::models::SubmissionFilter;
use crate::store::SubmissionStore;

pub const DUPLICATE_WINDOW_HOURS: i64 = 24;

// Decides whether a client already answered within the trailing window
pub struct DuplicateGuard {
    store: Arc<dyn SubmissionStore>,
    trusted_operators: Vec<IpAddr>,
    window: Duration,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn SubmissionStore>, trusted_operators: Vec<IpAddr>) -> Self {
        Self {
            store,
            trusted_operators,
            window: Duration::hours(DUPLICATE_WINDOW_HOURS),
        }
    }

    pub fn is_trusted(&self, client: Option<IpAddr>) -> bool {
        client.is_some_and(|ip| self.trusted_operators.contains(&ip.to_canonical()))
    }

    // same user hash, or same browser fingerprint, stored within the window.
    // fails open when the store can't answer
    pub async fn is_duplicate(
        &self,
        client: Option<IpAddr>,
        user_hash: &str,
        browser_fingerprint: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_trusted(client) {
            return false;
        }

        let filter = SubmissionFilter::identity_since(user_hash, browser_fingerprint, now - self.window);
        match self.store.count_matching(&filter).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(error = %e, "duplicate check failed, allowing submission");
                false
            }
        }
    }
}
