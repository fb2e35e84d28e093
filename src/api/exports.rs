//! Participant list downloads (admin).

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::export::{official_csv, participants_standard_csv};
use crate::AppState;

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// GET /api/admin/export/standard - Full participant list.
pub async fn export_standard(State(state): State<AppState>) -> Result<Response, AppError> {
    let teams = state.repo.all_teams().await?;
    let members = state.repo.list_members().await?;
    Ok(csv_response(
        "participants.csv",
        participants_standard_csv(&teams, &members),
    ))
}

/// GET /api/admin/export/official - The school administration format.
pub async fn export_official(State(state): State<AppState>) -> Result<Response, AppError> {
    let teams = state.repo.all_teams().await?;
    let members = state.repo.list_members().await?;
    Ok(csv_response(
        "participants_officiel.csv",
        official_csv(&teams, &members, &state.config.school_name),
    ))
}
