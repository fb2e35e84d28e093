//! Team model.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Name of the staff team. It is exempt from capacity counting and cannot be deleted.
pub const ORGANISATION_TEAM_NAME: &str = "Organisation";

pub const MAX_TEAM_NAME_LEN: usize = 100;
pub const MAX_ROOM_LEN: usize = 50;
pub const MIN_TEAM_PASSWORD_LEN: usize = 4;

/// A registered team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Never leaves the server
    #[serde(skip)]
    pub password_hash: String,
    pub room: Option<String>,
    pub created_at: String,
}

impl Team {
    pub fn is_organisation(&self) -> bool {
        self.name == ORGANISATION_TEAM_NAME
    }
}

/// Public listing entry for a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub room: Option<String>,
    pub member_count: i64,
    pub is_organisation: bool,
    pub is_full: bool,
    pub created_at: String,
}

/// Team returned by a successful registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTeam {
    #[serde(flatten)]
    pub team: Team,
    pub is_new: bool,
}

/// Request body for creating a team from the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub password: String,
    #[serde(default)]
    pub room: Option<String>,
}

/// Request body for updating a team from the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for assigning a room. `null` clears it.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRoomRequest {
    pub room: Option<String>,
}

/// Request body for viewing a team's members.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamPasswordRequest {
    pub password: String,
}

pub fn validate_team_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Team name is required".to_string()));
    }
    if trimmed.chars().count() > MAX_TEAM_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Team name must be at most {} characters",
            MAX_TEAM_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_team_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_TEAM_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Team password must be at least {} characters",
            MIN_TEAM_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Trimmed room name; empty means no room.
pub fn normalize_room(room: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(room) = room.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if room.chars().count() > MAX_ROOM_LEN {
        return Err(AppError::Validation(format!(
            "Room must be at most {} characters",
            MAX_ROOM_LEN
        )));
    }
    Ok(Some(room.to_string()))
}
