//! Archive and reset API endpoints (admin).

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{success, ApiResponse, ApiResult};
use crate::models::{
    ArchiveDetail, ArchiveExport, ArchiveSummary, CreateArchiveRequest, ExpirationReport,
    ResetCheck, ResetOutcome, ResetRequest,
};
use crate::AppState;

/// POST /api/admin/archives - Snapshot the live data for a year.
pub async fn create_archive(
    State(state): State<AppState>,
    Json(request): Json<CreateArchiveRequest>,
) -> ApiResult<ArchiveSummary> {
    let archive = state
        .repo
        .create_archive(request.event_year, Utc::now())
        .await?;
    Ok(ApiResponse::created(archive))
}

/// GET /api/admin/archives - List archives, newest year first.
pub async fn list_archives(State(state): State<AppState>) -> ApiResult<Vec<ArchiveSummary>> {
    success(state.repo.list_archives().await?)
}

/// GET /api/admin/archives/{year} - Archive content with an integrity check.
pub async fn get_archive(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> ApiResult<ArchiveDetail> {
    success(state.repo.get_archive(year).await?)
}

/// GET /api/admin/archives/{year}/export - Downloadable bundle.
pub async fn export_archive(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> ApiResult<ArchiveExport> {
    success(state.repo.export_archive(year).await?)
}

/// POST /api/admin/archives/check-expiration - Anonymize expired archives.
pub async fn check_expiration(State(state): State<AppState>) -> ApiResult<ExpirationReport> {
    success(state.repo.check_expiration(Utc::now()).await?)
}

/// GET /api/admin/reset/check - Whether a reset would lose unarchived data.
pub async fn reset_check(State(state): State<AppState>) -> ApiResult<ResetCheck> {
    success(state.repo.reset_check(Utc::now()).await?)
}

/// POST /api/admin/reset - Wipe live data for a new edition.
pub async fn reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> ApiResult<ResetOutcome> {
    success(
        state
            .repo
            .reset(&request.confirmation, request.force, Utc::now())
            .await?,
    )
}
