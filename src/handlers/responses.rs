use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use super::{ClientContext, check_rate_limit};
use crate::error::{AppError, FieldErrors};
use crate::models::{CategoryField, Pagination, Submission, SubmissionFilter};
use crate::state::AppState;
use crate::store::StoreError;

#[derive(Serialize)]
pub struct ResponsePage {
    pub responses: Vec<Submission>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

fn storage_error(e: StoreError) -> AppError {
    error!(error = %e, "failed to read submissions");
    AppError::StorageUnavailable(e)
}

async fn page_of(
    state: &AppState,
    filter: &SubmissionFilter,
    pagination: Pagination,
) -> Result<ResponsePage, AppError> {
    let pagination = pagination.normalized();
    let total = state.store.count_matching(filter).await.map_err(storage_error)?;
    let responses = state
        .store
        .query(filter, pagination)
        .await
        .map_err(storage_error)?;

    Ok(ResponsePage {
        responses,
        page: pagination.page,
        per_page: pagination.per_page,
        total,
    })
}

pub async fn list_responses_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ResponsePage>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;
    let pagination = parse_listing(&params).map_err(AppError::Validation)?;
    let page = page_of(&state, &SubmissionFilter::default(), pagination).await?;
    Ok(Json(page))
}

pub async fn get_response_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    Path(id): Path<i64>,
) -> Result<Json<Submission>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;
    match state.store.find(id).await.map_err(storage_error)? {
        Some(submission) => Ok(Json(submission)),
        None => Err(AppError::NotFound),
    }
}

pub async fn search_responses_handler(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ResponsePage>, AppError> {
    check_rate_limit(&state.read_limiter, state.read_rate_limit, &client)?;
    let (filter, pagination) = parse_search(&params).map_err(AppError::Validation)?;
    let page = page_of(&state, &filter, pagination).await?;
    Ok(Json(page))
}

// page / per_page; false when `key` is not a paging parameter
fn parse_paging(key: &str, value: &str, pagination: &mut Pagination, errors: &mut FieldErrors) -> bool {
    let (name, slot) = match key {
        "page" => ("page", &mut pagination.page),
        "per_page" => ("per_page", &mut pagination.per_page),
        _ => return false,
    };
    match value.parse() {
        Ok(n) => *slot = n,
        Err(_) => {
            errors.insert(name, "Must be a positive integer".to_string());
        }
    }
    true
}

pub fn parse_listing(params: &HashMap<String, String>) -> Result<Pagination, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut pagination = Pagination::default();

    for (key, value) in params {
        if !parse_paging(key, value, &mut pagination, &mut errors) {
            errors.insert("query", format!("Unknown listing parameter '{key}'"));
        }
    }

    if errors.is_empty() {
        Ok(pagination)
    } else {
        Err(errors)
    }
}

// Query string -> filter. Unknown parameters are rejected so typos don't silently widen a search.
pub fn parse_search(
    params: &HashMap<String, String>,
) -> Result<(SubmissionFilter, Pagination), FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut filter = SubmissionFilter::default();
    let mut pagination = Pagination::default();

    for (key, value) in params {
        if parse_paging(key, value, &mut pagination, &mut errors) {
            continue;
        }
        match key.as_str() {
            "from" => match parse_bound(value, false) {
                Some(from) => filter.from = Some(from),
                None => {
                    errors.insert("from", "Expected an RFC 3339 timestamp or YYYY-MM-DD".to_string());
                }
            },
            "to" => match parse_bound(value, true) {
                Some(to) => filter.to = Some(to),
                None => {
                    errors.insert("to", "Expected an RFC 3339 timestamp or YYYY-MM-DD".to_string());
                }
            },
            other => match other.parse::<CategoryField>() {
                Ok(field) if !value.trim().is_empty() => {
                    filter.categories.push((field, value.trim().to_string()));
                }
                Ok(field) => {
                    errors.insert(field.column(), "Filter value cannot be empty".to_string());
                }
                Err(_) => {
                    errors.insert("query", format!("Unknown search parameter '{other}'"));
                }
            },
        }
    }

    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            errors.insert("to", "Must not be before 'from'".to_string());
        }
    }

    // deterministic SQL for identical searches
    filter.categories.sort();

    if errors.is_empty() {
        Ok((filter, pagination))
    } else {
        Err(errors)
    }
}

// A bare date covers the whole day: start of day for `from`, end of day for `to`
fn parse_bound(value: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(date.and_time(time).and_utc())
}
