use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::{ClientContext, check_rate_limit};
use crate::error::AppError;
use crate::models::{CategoryCount, CategoryField, SubmissionFilter};
use crate::state::AppState;

const COUNT_KEY: &str = "count";
const PROGRESS_KEY: &str = "progress";
const BREAKDOWN_KEY: &str = "breakdown";

// Total stored submissions; None when the store is unreachable
async fn total(state: &AppState) -> Option<i64> {
    match state.store.count_matching(&SubmissionFilter::default()).await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "count unavailable, serving zero");
            None
        }
    }
}

pub fn progress_percentage(count: i64, target: u64) -> f64 {
    if target == 0 {
        return 100.0;
    }
    let pct = (count.max(0) as f64 * 100.0 / target as f64).min(100.0);
    (pct * 10.0).round() / 10.0
}

pub async fn count_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
) -> Result<Json<Value>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;

    if let Some(cached) = state.cache.get(COUNT_KEY) {
        return Ok(Json(cached));
    }
    let generation = state.cache.generation();

    let body = match total(&state).await {
        Some(count) => {
            let body = json!({ "count": count });
            state
                .cache
                .set_if_generation(COUNT_KEY, body.clone(), state.count_ttl, generation);
            body
        }
        // zeroed defaults are not cached
        None => json!({ "count": 0 }),
    };
    Ok(Json(body))
}

pub async fn progress_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
) -> Result<Json<Value>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;

    if let Some(cached) = state.cache.get(PROGRESS_KEY) {
        return Ok(Json(cached));
    }
    let generation = state.cache.generation();

    let count = total(&state).await;
    let shown = count.unwrap_or(0);
    let body = json!({
        "count": shown,
        "target": state.target_responses,
        "percentage": progress_percentage(shown, state.target_responses),
    });
    if count.is_some() {
        state
            .cache
            .set_if_generation(PROGRESS_KEY, body.clone(), state.progress_ttl, generation);
    }
    Ok(Json(body))
}

pub async fn breakdown_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
) -> Result<Json<Value>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;

    if let Some(cached) = state.cache.get(BREAKDOWN_KEY) {
        return Ok(Json(cached));
    }
    let generation = state.cache.generation();

    let mut complete = true;
    let mut fields: BTreeMap<&'static str, Vec<CategoryCount>> = BTreeMap::new();
    for field in CategoryField::ALL {
        let counts = match state.store.breakdown(field).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(%field, error = %e, "breakdown unavailable, serving empty");
                complete = false;
                Vec::new()
            }
        };
        fields.insert(field.column(), counts);
    }

    let count = total(&state).await;
    complete &= count.is_some();
    let body = json!({
        "total": count.unwrap_or(0),
        "fields": fields,
    });
    if complete {
        state
            .cache
            .set_if_generation(BREAKDOWN_KEY, body.clone(), state.breakdown_ttl, generation);
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_capped_and_rounded() {
        assert_eq!(progress_percentage(0, 100), 0.0);
        assert_eq!(progress_percentage(1, 3), 33.3);
        assert_eq!(progress_percentage(2, 3), 66.7);
        assert_eq!(progress_percentage(250, 100), 100.0);
        assert_eq!(progress_percentage(5, 0), 100.0);
    }
}
