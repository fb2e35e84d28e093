//! Registration endpoint.

use axum::{extract::State, Json};

use super::{ApiResponse, ApiResult};
use crate::models::{Registration, RegistrationRequest};
use crate::AppState;

/// POST /api/register - Create a team or join one.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> ApiResult<Registration> {
    let registration = state.repo.register(&request).await?;
    Ok(ApiResponse::created(registration))
}
