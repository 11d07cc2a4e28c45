use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::{ClientContext, check_rate_limit};
use crate::error::AppError;
use crate::fingerprint::user_hash;
use crate::metrics::{DUPLICATES_TOTAL, SUBMISSIONS_TOTAL, SUBMIT_LATENCY};
use crate::models::{NewSubmission, SurveyForm};
use crate::state::AppState;
use crate::validation::validate;

pub const THANK_YOU_MESSAGE: &str = "Le questionnaire est désormais terminé. \
    Les résultats sont en cours de traitement et vous seront communiqués par projection à l'écran dans un court instant. \
    Nous vous remercions pour votre participation !";

#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: i64,
    pub message: &'static str,
    pub processing_time_ms: u64,
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    Json(form): Json<SurveyForm>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let start_time = Instant::now();

    check_rate_limit(&state.submit_limiter, state.submit_rate_limit, &client)?;

    let (answers, metadata) = validate(form).map_err(AppError::Validation)?;

    let now = Utc::now();
    let user_hash = user_hash(client.addr, client.user_agent.as_deref(), now.date_naive(), now);

    // held across both awaits so a double-submit can't pass the check twice
    let intake = state.intake_lock.lock().await;

    if state
        .duplicates
        .is_duplicate(client.addr, &user_hash, metadata.browser_fingerprint.as_deref(), now)
        .await
    {
        DUPLICATES_TOTAL.inc();
        info!(client = ?client.addr, "duplicate submission rejected");
        return Err(AppError::Conflict);
    }

    let submission = NewSubmission {
        answers,
        metadata,
        user_hash,
        created_at: now,
    };
    let id = state.store.insert(&submission).await.map_err(|e| {
        error!(error = %e, "failed to store submission");
        AppError::StorageUnavailable(e)
    })?;
    drop(intake);

    // Aggregates must reflect the new row right away
    state.cache.clear();

    SUBMISSIONS_TOTAL.inc();
    let elapsed = start_time.elapsed();
    SUBMIT_LATENCY.observe(elapsed.as_secs_f64());
    let processing_time_ms = elapsed.as_millis() as u64;
    info!(id, processing_time_ms, "submission stored");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            id,
            message: THANK_YOU_MESSAGE,
            processing_time_ms,
        }),
    ))
}
