//! Member CRUD for the admin API, the payment ledger view and public statistics.

use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::SqliteConnection;

use super::repository::*;
use crate::capacity::{check_capacity, remaining, CapacitySnapshot};
use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    required_name, validate_bac_level, CreateMemberRequest, Member, NewMember, PaymentEvent,
    PaymentStatus, PublicStats, Team, UpdateMemberRequest, ORGANISATION_TEAM_NAME,
};

pub(super) fn duplicate_person(first_name: &str, last_name: &str) -> AppError {
    AppError::Duplicate(format!(
        "{} {} is already registered",
        first_name, last_name
    ))
}

/// Insert a validated member. The UNIQUE (first_name, last_name) index backs the
/// in-transaction duplicate check.
pub(super) async fn insert_member(
    conn: &mut SqliteConnection,
    team_id: &str,
    member: &NewMember,
) -> Result<Member, AppError> {
    let created = Member {
        id: uuid::Uuid::new_v4().to_string(),
        team_id: team_id.to_string(),
        first_name: member.first_name.clone(),
        last_name: member.last_name.clone(),
        email: member.email.clone(),
        bac_level: member.bac_level,
        is_leader: member.is_leader,
        food_diet: member.food_diet.clone(),
        checked_in: false,
        checked_in_at: None,
        pizza_received: false,
        pizza_received_at: None,
        payment_status: PaymentStatus::Unpaid,
        payment_method: None,
        checkout_id: None,
        transaction_id: None,
        registration_tier: None,
        payment_amount: None,
        payment_tier: None,
        payment_confirmed_at: None,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO members (id, team_id, first_name, last_name, email, bac_level, is_leader, food_diet, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&created.id)
    .bind(&created.team_id)
    .bind(&created.first_name)
    .bind(&created.last_name)
    .bind(&created.email)
    .bind(created.bac_level)
    .bind(created.is_leader as i32)
    .bind(&created.food_diet)
    .bind(&created.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            duplicate_person(&member.first_name, &member.last_name)
        } else {
            AppError::from(e)
        }
    })?;

    Ok(created)
}

/// Capacity state for adding people to `team`, read inside the caller's transaction.
pub(super) async fn capacity_snapshot(
    conn: &mut SqliteConnection,
    team: Option<&Team>,
) -> Result<CapacitySnapshot, AppError> {
    let settings = load_settings(conn).await?;
    let participants = count_participants(conn).await?;
    let is_organisation = team.map(Team::is_organisation).unwrap_or(false);
    let team_members = match team {
        Some(t) if !t.is_organisation() => Some(count_team_members(conn, &t.id).await?),
        _ => None,
    };

    Ok(CapacitySnapshot {
        participants,
        max_total_participants: settings.max_total_participants,
        team_members,
        max_team_size: settings.max_team_size,
        is_organisation,
    })
}

async fn require_team(conn: &mut SqliteConnection, id: &str) -> Result<Team, AppError> {
    fetch_team(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))
}

impl Repository {
    // ========== Member Operations ==========

    pub async fn list_members(&self) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY created_at, last_name, first_name"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn get_member(&self, id: &str) -> Result<Member, AppError> {
        let mut conn = self.pool.acquire().await?;
        require_member(&mut conn, id).await
    }

    /// Admin insert into an existing team, under the same duplicate and capacity rules
    /// as registration.
    pub async fn create_member(&self, request: &CreateMemberRequest) -> Result<Member, AppError> {
        let member = request.member.validated()?;

        let mut tx = self.pool.begin().await?;
        let team = require_team(&mut tx, &request.team_id).await?;

        if person_exists(&mut tx, &member.first_name, &member.last_name, None).await? {
            return Err(duplicate_person(&member.first_name, &member.last_name));
        }
        let snapshot = capacity_snapshot(&mut tx, Some(&team)).await?;
        check_capacity(&snapshot, 1)?;

        let created = insert_member(&mut tx, &team.id, &member).await?;
        tx.commit().await?;

        tracing::info!(member_id = %created.id, team_id = %team.id, "Member created");
        Ok(created)
    }

    /// Partial update. Moving a member to another team is admitted like a new arrival.
    pub async fn update_member(
        &self,
        id: &str,
        request: &UpdateMemberRequest,
    ) -> Result<Member, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut member = require_member(&mut tx, id).await?;

        if let Some(first_name) = &request.first_name {
            member.first_name = required_name(first_name, "First name")?;
        }
        if let Some(last_name) = &request.last_name {
            member.last_name = required_name(last_name, "Last name")?;
        }
        if let Some(email) = &request.email {
            let email = email.trim();
            if !crate::models::is_valid_email(email) {
                return Err(AppError::Validation("Invalid email address".to_string()));
            }
            member.email = email.to_string();
        }
        if let Some(level) = request.bac_level {
            validate_bac_level(level)?;
            member.bac_level = level;
        }
        if let Some(is_leader) = request.is_leader {
            member.is_leader = is_leader;
        }
        if let Some(diet) = &request.food_diet {
            member.food_diet = Some(diet.trim().to_string()).filter(|d| !d.is_empty());
        }

        if person_exists(&mut tx, &member.first_name, &member.last_name, Some(id)).await? {
            return Err(duplicate_person(&member.first_name, &member.last_name));
        }

        if let Some(team_id) = request.team_id.as_deref().filter(|t| *t != member.team_id) {
            let current = require_team(&mut tx, &member.team_id).await?;
            let target = require_team(&mut tx, team_id).await?;
            let mut snapshot = capacity_snapshot(&mut tx, Some(&target)).await?;
            if !current.is_organisation() {
                snapshot.participants -= 1;
            }
            check_capacity(&snapshot, 1)?;
            member.team_id = target.id;
        }

        sqlx::query(
            "UPDATE members SET team_id = ?, first_name = ?, last_name = ?, email = ?, bac_level = ?, is_leader = ?, food_diet = ? WHERE id = ?",
        )
        .bind(&member.team_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(member.bac_level)
        .bind(member.is_leader as i32)
        .bind(&member.food_diet)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_person(&member.first_name, &member.last_name)
            } else {
                AppError::from(e)
            }
        })?;
        tx.commit().await?;

        tracing::info!(member_id = %id, "Member updated");
        Ok(member)
    }

    pub async fn delete_member(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Member {} not found", id)));
        }

        tracing::info!(member_id = %id, "Member deleted");
        Ok(())
    }

    // ========== Ledger & Statistics ==========

    /// The payment event ledger, oldest first.
    pub async fn list_payment_events(&self) -> Result<Vec<PaymentEvent>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM payment_events ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    pub async fn public_stats(&self, now: NaiveDateTime) -> Result<PublicStats, AppError> {
        let mut conn = self.pool.acquire().await?;
        let settings = load_settings(&mut conn).await?;
        let total_participants = count_participants(&mut conn).await?;

        let total_teams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams WHERE name <> ?")
            .bind(ORGANISATION_TEAM_NAME)
            .fetch_one(&mut *conn)
            .await?;

        let (checked_in, paid): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(m.checked_in), 0),
                   COALESCE(SUM(CASE WHEN m.payment_status = 'paid' THEN 1 ELSE 0 END), 0)
            FROM members m JOIN teams t ON t.id = m.team_id
            WHERE t.name <> ?
            "#,
        )
        .bind(ORGANISATION_TEAM_NAME)
        .fetch_one(&mut *conn)
        .await?;

        let remaining_spots = remaining(total_participants, settings.max_total_participants);
        let before_deadline = settings
            .registration_deadline
            .map(|deadline| now.date() <= deadline)
            .unwrap_or(true);

        Ok(PublicStats {
            total_teams,
            total_participants,
            max_total_participants: settings.max_total_participants,
            remaining_spots,
            max_team_size: settings.max_team_size,
            min_team_size: settings.min_team_size,
            checked_in,
            paid,
            registration_open: remaining_spots > 0 && before_deadline,
        })
    }
}
