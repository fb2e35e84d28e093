//! Member API endpoints (admin).

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResponse, ApiResult};
use crate::models::{CreateMemberRequest, Member, PaymentEvent, UpdateMemberRequest};
use crate::AppState;

/// GET /api/admin/members - List all members.
pub async fn list_members(State(state): State<AppState>) -> ApiResult<Vec<Member>> {
    success(state.repo.list_members().await?)
}

/// POST /api/admin/members - Add a member to an existing team.
pub async fn create_member(
    State(state): State<AppState>,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<Member> {
    Ok(ApiResponse::created(state.repo.create_member(&request).await?))
}

/// PUT /api/admin/members/{id} - Update a member.
pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemberRequest>,
) -> ApiResult<Member> {
    success(state.repo.update_member(&id, &request).await?)
}

/// DELETE /api/admin/members/{id} - Delete a member.
pub async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.repo.delete_member(&id).await?;
    success(())
}

/// GET /api/admin/payments/events - The payment ledger.
pub async fn list_payment_events(State(state): State<AppState>) -> ApiResult<Vec<PaymentEvent>> {
    success(state.repo.list_payment_events().await?)
}
