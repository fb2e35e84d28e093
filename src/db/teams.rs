//! Team directory: listing, admin CRUD and password-gated member views.

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::repository::*;
use crate::auth;
use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    normalize_room, validate_team_name, validate_team_password, CreateTeamRequest, Member, Team,
    TeamSummary, UpdateTeamRequest, ORGANISATION_TEAM_NAME,
};

/// Whether a team with this name exists (case-insensitive).
pub(super) async fn team_name_taken(
    conn: &mut SqliteConnection,
    name: &str,
    excluding_team: Option<&str>,
) -> Result<bool, AppError> {
    let taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE name = ? AND id <> ?)")
            .bind(name)
            .bind(excluding_team.unwrap_or(""))
            .fetch_one(&mut *conn)
            .await?;
    Ok(taken)
}

/// Insert a team row. The UNIQUE index on `name` backs the in-transaction check.
pub(super) async fn insert_team(
    conn: &mut SqliteConnection,
    name: &str,
    description: Option<&str>,
    password_hash: &str,
    room: Option<&str>,
) -> Result<Team, AppError> {
    let team = Team {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from),
        password_hash: password_hash.to_string(),
        room: room.map(String::from),
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO teams (id, name, description, password_hash, room, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&team.id)
    .bind(&team.name)
    .bind(&team.description)
    .bind(&team.password_hash)
    .bind(&team.room)
    .bind(&team.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            duplicate_team(name)
        } else {
            AppError::from(e)
        }
    })?;

    Ok(team)
}

pub(super) fn duplicate_team(name: &str) -> AppError {
    AppError::Duplicate(format!("A team named '{}' already exists", name))
}

impl Repository {
    /// Hash a team password with the configured work factor.
    pub(super) fn hash_team_password(&self, password: &str) -> Result<String, AppError> {
        auth::hash_password(password, self.password_cost)
    }

    // ========== Team Operations ==========

    /// All teams with their headcount, Organisation first then by name.
    pub async fn list_teams(&self) -> Result<Vec<TeamSummary>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let max_team_size = load_settings(&mut conn).await?.max_team_size;

        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.description, t.room, t.created_at,
                   (SELECT COUNT(*) FROM members m WHERE m.team_id = t.id) AS member_count
            FROM teams t
            ORDER BY (t.name = ?) DESC, t.name
            "#,
        )
        .bind(ORGANISATION_TEAM_NAME)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let member_count: i64 = row.get("member_count");
                let is_organisation = name == ORGANISATION_TEAM_NAME;
                TeamSummary {
                    id: row.get("id"),
                    name,
                    description: row.get("description"),
                    room: row.get("room"),
                    member_count,
                    is_organisation,
                    is_full: !is_organisation && member_count >= max_team_size,
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    /// One team with its headcount.
    pub async fn get_team(&self, id: &str) -> Result<TeamSummary, AppError> {
        let mut conn = self.pool.acquire().await?;
        let team = fetch_team(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))?;
        let member_count = count_team_members(&mut conn, id).await?;
        let max_team_size = load_settings(&mut conn).await?.max_team_size;
        let is_organisation = team.is_organisation();

        Ok(TeamSummary {
            id: team.id,
            name: team.name,
            description: team.description,
            room: team.room,
            member_count,
            is_organisation,
            is_full: !is_organisation && member_count >= max_team_size,
            created_at: team.created_at,
        })
    }

    /// Full team rows (hashes included) for exports and snapshots.
    pub async fn all_teams(&self) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams ORDER BY created_at, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(team_from_row).collect())
    }

    pub async fn create_team(&self, request: &CreateTeamRequest) -> Result<Team, AppError> {
        let name = validate_team_name(&request.name)?;
        validate_team_password(&request.password)?;
        let room = normalize_room(request.room.as_deref())?;
        let password_hash = self.hash_team_password(&request.password)?;

        let mut tx = self.pool.begin().await?;
        if team_name_taken(&mut tx, &name, None).await? {
            return Err(duplicate_team(&name));
        }
        let team = insert_team(
            &mut tx,
            &name,
            request.description.as_deref(),
            &password_hash,
            room.as_deref(),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(team_id = %team.id, name = %team.name, "Team created");
        Ok(team)
    }

    /// Constant-time password check. Unknown teams never verify.
    pub async fn verify_team_password(
        &self,
        team_id: &str,
        candidate: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(match fetch_team(&mut conn, team_id).await? {
            Some(team) => auth::verify_password(candidate, &team.password_hash),
            None => false,
        })
    }

    /// Members of a team, shown only to holders of its password.
    pub async fn team_members(&self, team_id: &str, password: &str) -> Result<Vec<Member>, AppError> {
        if !self.verify_team_password(team_id, password).await? {
            // Unknown teams report NotFound rather than a password failure
            self.get_team(team_id).await?;
            tracing::warn!(team_id = %team_id, "Rejected team password");
            return Err(AppError::Unauthorized("Invalid team password".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE team_id = ? ORDER BY is_leader DESC, created_at"
        ))
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn update_team(&self, id: &str, request: &UpdateTeamRequest) -> Result<Team, AppError> {
        let new_name = request.name.as_deref().map(validate_team_name).transpose()?;
        if let Some(password) = &request.password {
            validate_team_password(password)?;
        }
        let password_hash = request
            .password
            .as_deref()
            .map(|p| self.hash_team_password(p))
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        let mut team = fetch_team(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))?;

        if let Some(name) = new_name {
            if team.is_organisation() && name != team.name {
                return Err(AppError::Validation(
                    "The Organisation team cannot be renamed".to_string(),
                ));
            }
            if team_name_taken(&mut tx, &name, Some(id)).await? {
                return Err(duplicate_team(&name));
            }
            team.name = name;
        }
        if let Some(description) = &request.description {
            team.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(hash) = password_hash {
            team.password_hash = hash;
        }

        sqlx::query("UPDATE teams SET name = ?, description = ?, password_hash = ? WHERE id = ?")
            .bind(&team.name)
            .bind(&team.description)
            .bind(&team.password_hash)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    duplicate_team(&team.name)
                } else {
                    AppError::from(e)
                }
            })?;
        tx.commit().await?;

        tracing::info!(team_id = %id, "Team updated");
        Ok(team)
    }

    /// Assign or clear the team's room.
    pub async fn set_room(&self, id: &str, room: Option<&str>) -> Result<Team, AppError> {
        let room = normalize_room(room)?;
        let result = sqlx::query("UPDATE teams SET room = ? WHERE id = ?")
            .bind(&room)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {} not found", id)));
        }

        let mut conn = self.pool.acquire().await?;
        fetch_team(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))
    }

    /// Delete a team and, by cascade, its members.
    pub async fn delete_team(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let team = fetch_team(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))?;
        if team.is_organisation() {
            return Err(AppError::Validation(
                "The Organisation team cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM teams WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(team_id = %id, name = %team.name, "Team deleted");
        Ok(())
    }
}
