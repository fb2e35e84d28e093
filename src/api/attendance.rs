//! Attendance API endpoints (admin).

use axum::{
    extract::{Path, State},
    Json,
};

use super::{local_now, success, ApiResult};
use crate::models::{BatchCheckInRequest, BatchMembersRequest, CheckInRequest, Member};
use crate::AppState;

/// POST /api/admin/members/{id}/check-in - Check a member in, collecting payment.
///
/// An empty body means no options.
pub async fn check_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<CheckInRequest>>,
) -> ApiResult<Member> {
    let options = request.map(|Json(r)| r).unwrap_or_default();
    success(state.repo.check_in(&id, &options, local_now()).await?)
}

/// POST /api/admin/members/{id}/check-out - Clear the check-in flag.
pub async fn check_out(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Member> {
    success(state.repo.check_out(&id).await?)
}

/// POST /api/admin/members/{id}/pizza - Record a pizza handed out.
pub async fn give_pizza(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Member> {
    success(state.repo.set_pizza(&id, true).await?)
}

/// POST /api/admin/members/{id}/pizza/revoke - Undo a pizza record.
pub async fn revoke_pizza(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Member> {
    success(state.repo.set_pizza(&id, false).await?)
}

/// POST /api/admin/members/batch/check-in
pub async fn batch_check_in(
    State(state): State<AppState>,
    Json(request): Json<BatchCheckInRequest>,
) -> ApiResult<Vec<Member>> {
    success(state.repo.batch_check_in(&request.items, local_now()).await?)
}

/// POST /api/admin/members/batch/check-out
pub async fn batch_check_out(
    State(state): State<AppState>,
    Json(request): Json<BatchMembersRequest>,
) -> ApiResult<Vec<Member>> {
    success(state.repo.batch_check_out(&request.member_ids).await?)
}

/// POST /api/admin/members/batch/pizza
pub async fn batch_give_pizza(
    State(state): State<AppState>,
    Json(request): Json<BatchMembersRequest>,
) -> ApiResult<Vec<Member>> {
    success(state.repo.batch_set_pizza(&request.member_ids, true).await?)
}

/// POST /api/admin/members/batch/pizza/revoke
pub async fn batch_revoke_pizza(
    State(state): State<AppState>,
    Json(request): Json<BatchMembersRequest>,
) -> ApiResult<Vec<Member>> {
    success(state.repo.batch_set_pizza(&request.member_ids, false).await?)
}
