use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use crate::cache::EphemeralCache;
use crate::config::Args;
use crate::duplicate::DuplicateGuard;
use crate::rate_limit::RateLimiter;
use crate::store::SubmissionStore;
// app's shared state

pub struct AppState {
    pub store: Arc<dyn SubmissionStore>,
    pub duplicates: DuplicateGuard,
    pub intake_lock: Mutex<()>,               // duplicate check + insert run as one step
    pub cache: EphemeralCache,                // aggregate reads, cleared on every insert
    pub submit_limiter: RateLimiter,
    pub submit_rate_limit: usize,             // max submissions per minute
    pub read_limiter: RateLimiter,
    pub read_rate_limit: usize,               // max reads per minute
    pub trust_forwarded_for: bool,
    pub target_responses: u64,
    pub count_ttl: Duration,
    pub progress_ttl: Duration,
    pub breakdown_ttl: Duration,
}

impl AppState {
    pub fn new(args: &Args, store: Arc<dyn SubmissionStore>) -> Self {
        let trusted_networks = args.trusted_networks();
        let allow_list = args.allow_list();

        Self {
            duplicates: DuplicateGuard::new(Arc::clone(&store), allow_list.clone()),
            store,
            intake_lock: Mutex::new(()),
            cache: EphemeralCache::new(),
            submit_limiter: RateLimiter::new(trusted_networks.clone(), allow_list.clone()),
            submit_rate_limit: args.submit_rate_limit,
            read_limiter: RateLimiter::new(trusted_networks, allow_list),
            read_rate_limit: args.read_rate_limit,
            trust_forwarded_for: args.trust_forwarded_for,
            target_responses: args.target_responses,
            count_ttl: args.count_ttl(),
            progress_ttl: args.progress_ttl(),
            breakdown_ttl: args.breakdown_ttl(),
        }
    }
}
