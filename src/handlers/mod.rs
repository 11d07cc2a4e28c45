mod health;
mod metrics;
mod responses;
mod stats;
mod submit;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use responses::{get_response_handler, list_responses_handler, search_responses_handler};
pub use stats::{breakdown_handler, count_handler, progress_handler};
pub use submit::submit_handler;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::THROTTLED_TOTAL;
use crate::network::client_addr;
use crate::rate_limit::{Decision, RateLimiter};
use crate::state::AppState;

// Who is calling: resolved address and raw user agent
pub struct ClientContext {
    pub addr: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr);

        Ok(Self {
            addr: client_addr(&parts.headers, peer, state.trust_forwarded_for),
            // non-UTF-8 agents count as missing
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

// Rate limit check shared by all endpoints
fn check_rate_limit(limiter: &RateLimiter, limit: usize, client: &ClientContext) -> Result<(), AppError> {
    // Without an address there is nothing to key on
    let Some(addr) = client.addr else {
        return Ok(());
    };

    match limiter.check(addr, limit) {
        Decision::Limited => {
            THROTTLED_TOTAL.inc();
            tracing::info!(client = %addr, limit, "rate limited");
            Err(AppError::Throttled { limit })
        }
        Decision::Allowed | Decision::Exempt => Ok(()),
    }
}
