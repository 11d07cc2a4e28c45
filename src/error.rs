use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::store::StoreError;

pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid submission")]
    Validation(FieldErrors),

    #[error("A submission from this client was already received in the last 24 hours")]
    Conflict,

    #[error("Too many requests, limit is {limit} per minute")]
    Throttled { limit: usize },

    #[error("Not found")]
    NotFound,

    #[error("Storage unavailable, please retry")]
    StorageUnavailable(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = match &self {
            AppError::Validation(fields) => serde_json::json!({
                "error": self.to_string(),
                "fields": fields,
            }),
            AppError::Throttled { limit } => serde_json::json!({
                "error": self.to_string(),
                "limit": limit,
            }),
            // Storage details go to the log, not the client
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::Throttled { .. }) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("60"));
        }
        response
    }
}
