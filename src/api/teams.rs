//! Team API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResponse, ApiResult};
use crate::models::{
    CreateTeamRequest, Member, SetRoomRequest, Team, TeamPasswordRequest, TeamSummary,
    UpdateTeamRequest,
};
use crate::AppState;

/// GET /api/teams - List teams with their headcount.
pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Vec<TeamSummary>> {
    success(state.repo.list_teams().await?)
}

/// GET /api/teams/{id} - Get a single team.
pub async fn get_team(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TeamSummary> {
    success(state.repo.get_team(&id).await?)
}

/// POST /api/teams/{id}/members - List members of a team, password required.
pub async fn team_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TeamPasswordRequest>,
) -> ApiResult<Vec<Member>> {
    success(state.repo.team_members(&id, &request.password).await?)
}

/// POST /api/admin/teams - Create a team.
pub async fn create_team(
    State(state): State<AppState>,
    Json(request): Json<CreateTeamRequest>,
) -> ApiResult<Team> {
    Ok(ApiResponse::created(state.repo.create_team(&request).await?))
}

/// PUT /api/admin/teams/{id} - Update a team.
pub async fn update_team(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTeamRequest>,
) -> ApiResult<Team> {
    success(state.repo.update_team(&id, &request).await?)
}

/// PUT /api/admin/teams/{id}/room - Assign or clear a room.
pub async fn set_team_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetRoomRequest>,
) -> ApiResult<Team> {
    success(state.repo.set_room(&id, request.room.as_deref()).await?)
}

/// DELETE /api/admin/teams/{id} - Delete a team and its members.
pub async fn delete_team(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_team(&id).await?;
    success(())
}
