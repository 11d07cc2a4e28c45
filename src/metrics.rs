use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: Counter =
        register_counter!("survey_submissions_total", "Total accepted submissions").unwrap();
    pub static ref DUPLICATES_TOTAL: Counter =
        register_counter!("survey_duplicates_total", "Submissions rejected as duplicates").unwrap();
    pub static ref THROTTLED_TOTAL: Counter =
        register_counter!("survey_throttled_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("survey_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("survey_cache_misses_total", "Total cache misses").unwrap();
    pub static ref SUBMIT_LATENCY: Histogram = register_histogram!(
        "survey_submit_latency_seconds",
        "Submission processing latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("survey_cache_size", "Current number of items in cache").unwrap();
}
