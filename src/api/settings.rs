//! Settings API endpoints (admin).

use std::collections::BTreeMap;

use axum::{extract::State, Json};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::AppState;

/// GET /api/admin/settings - Stored settings.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<BTreeMap<String, String>> {
    success(state.repo.raw_settings().await?)
}

/// PUT /api/admin/settings - Update some settings; body is a `{key: value}` object.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(changes): Json<serde_json::Value>,
) -> ApiResult<BTreeMap<String, String>> {
    let serde_json::Value::Object(changes) = changes else {
        return Err(AppError::Validation(
            "Settings must be a JSON object".to_string(),
        ));
    };
    success(state.repo.update_settings(&changes).await?)
}
