//! The advise endpoint: one query in, one synthesized answer out.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Error;
use crate::synthesis::SynthesizedResult;
use crate::web::AppState;

/// Advise request body.
#[derive(Debug, Deserialize)]
pub struct AdviseRequest {
    pub query: String,
    /// Banking data, passed to the agents untouched.
    #[serde(default)]
    pub financial_data: Option<Value>,
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::NoAgentsAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidEnvelope(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Run the full advise pipeline for one query.
pub async fn advise(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdviseRequest>,
) -> Result<Json<SynthesizedResult>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "query must not be empty"));
    }

    tracing::info!(
        query_preview = %request.query.chars().take(50).collect::<String>(),
        has_financial_data = request.financial_data.is_some(),
        "Received advise request"
    );

    let result = state
        .advisor
        .advise(&request.query, request.financial_data)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Advise failed");
            ApiError::from(e)
        })?;

    Ok(Json(result))
}
