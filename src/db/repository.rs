//! Store handle and row conversion shared by the repository sections.
//!
//! Each section (`teams`, `members`, `registration`, `payments`, `attendance`,
//! `settings`, `archives`) adds an `impl Repository` block. Helpers taking a
//! `&mut SqliteConnection` run either on a pooled connection or inside a transaction.

use std::collections::BTreeMap;

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Archive, EventSettings, Member, OnsiteTier, PaymentEvent, PaymentMethod, PaymentStatus,
    RegistrationTier, Team, ORGANISATION_TEAM_NAME,
};

pub(super) const MEMBER_COLUMNS: &str = "id, team_id, first_name, last_name, email, bac_level, is_leader, food_diet, checked_in, checked_in_at, pizza_received, pizza_received_at, payment_status, payment_method, checkout_id, transaction_id, registration_tier, payment_amount, payment_tier, payment_confirmed_at, created_at";

pub(super) const TEAM_COLUMNS: &str = "id, name, description, password_hash, room, created_at";

pub(super) const EVENT_COLUMNS: &str =
    "id, member_id, checkout_id, event_type, amount, tier, metadata, created_at";

pub(super) const ARCHIVE_COLUMNS: &str = "id, event_year, archived_at, expiration_date, is_expired, teams_blob, members_blob, payment_events_blob, stats_blob, total_teams, total_participants, total_revenue, data_hash";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
    pub(super) password_cost: u32,
}

impl Repository {
    pub fn new(pool: SqlitePool, password_cost: u32) -> Self {
        Self {
            pool,
            password_cost,
        }
    }
}

// Helpers usable on a pooled connection or inside a transaction

pub(super) async fn fetch_team(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Team>, AppError> {
    let row = sqlx::query(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(team_from_row))
}

pub(super) async fn fetch_member(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Member>, AppError> {
    let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(member_from_row).transpose()
}

pub(super) async fn require_member(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Member, AppError> {
    fetch_member(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))
}

/// Members outside the Organisation team.
pub(super) async fn count_participants(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM members m JOIN teams t ON t.id = m.team_id WHERE t.name <> ?",
    )
    .bind(ORGANISATION_TEAM_NAME)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

pub(super) async fn count_team_members(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Whether a person with this name is already registered (case-insensitive).
pub(super) async fn person_exists(
    conn: &mut SqliteConnection,
    first_name: &str,
    last_name: &str,
    excluding_member: Option<&str>,
) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM members WHERE first_name = ? AND last_name = ? AND id <> ?)",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(excluding_member.unwrap_or(""))
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

pub(super) async fn load_settings(conn: &mut SqliteConnection) -> Result<EventSettings, AppError> {
    let rows = sqlx::query("SELECT key, value FROM settings")
        .fetch_all(&mut *conn)
        .await?;
    let pairs: BTreeMap<String, String> = rows
        .iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect();
    Ok(EventSettings::from_pairs(&pairs))
}

/// Append one ledger entry. Events are never updated.
pub(super) async fn insert_payment_event(
    conn: &mut SqliteConnection,
    member_id: &str,
    checkout_id: Option<&str>,
    event_type: &str,
    amount: i64,
    tier: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<PaymentEvent, AppError> {
    let event = PaymentEvent {
        id: uuid::Uuid::new_v4().to_string(),
        member_id: member_id.to_string(),
        checkout_id: checkout_id.map(String::from),
        event_type: event_type.to_string(),
        amount,
        tier: tier.map(String::from),
        metadata,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let metadata_json = event.metadata.as_ref().map(|m| m.to_string());

    sqlx::query(
        "INSERT INTO payment_events (id, member_id, checkout_id, event_type, amount, tier, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.member_id)
    .bind(&event.checkout_id)
    .bind(&event.event_type)
    .bind(event.amount)
    .bind(&event.tier)
    .bind(&metadata_json)
    .bind(&event.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(event)
}

// Helper functions for row conversion

pub(super) fn team_from_row(row: &SqliteRow) -> Team {
    Team {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        password_hash: row.get("password_hash"),
        room: row.get("room"),
        created_at: row.get("created_at"),
    }
}

/// A stored status outside the known set is a store error, never a default.
pub(super) fn parse_payment_status(member_id: &str, raw: &str) -> Result<PaymentStatus, AppError> {
    PaymentStatus::from_str(raw).ok_or_else(|| {
        tracing::error!(member_id = %member_id, status = %raw, "Unreadable payment status");
        AppError::Database(format!(
            "Member {} has an unreadable payment status '{}'",
            member_id, raw
        ))
    })
}

pub(super) fn member_from_row(row: &SqliteRow) -> Result<Member, AppError> {
    let is_leader: i64 = row.get("is_leader");
    let checked_in: i64 = row.get("checked_in");
    let pizza_received: i64 = row.get("pizza_received");
    let payment_status: String = row.get("payment_status");
    let payment_method: Option<String> = row.get("payment_method");
    let registration_tier: Option<String> = row.get("registration_tier");
    let payment_tier: Option<String> = row.get("payment_tier");
    let id: String = row.get("id");
    let payment_status = parse_payment_status(&id, &payment_status)?;

    Ok(Member {
        id,
        team_id: row.get("team_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        bac_level: row.get("bac_level"),
        is_leader: is_leader != 0,
        food_diet: row.get("food_diet"),
        checked_in: checked_in != 0,
        checked_in_at: row.get("checked_in_at"),
        pizza_received: pizza_received != 0,
        pizza_received_at: row.get("pizza_received_at"),
        payment_status,
        payment_method: payment_method.and_then(|s| PaymentMethod::from_str(&s)),
        checkout_id: row.get("checkout_id"),
        transaction_id: row.get("transaction_id"),
        registration_tier: registration_tier.and_then(|s| RegistrationTier::from_str(&s)),
        payment_amount: row.get("payment_amount"),
        payment_tier: payment_tier.and_then(|s| OnsiteTier::from_str(&s)),
        payment_confirmed_at: row.get("payment_confirmed_at"),
        created_at: row.get("created_at"),
    })
}

pub(super) fn event_from_row(row: &SqliteRow) -> PaymentEvent {
    let metadata: Option<String> = row.get("metadata");
    PaymentEvent {
        id: row.get("id"),
        member_id: row.get("member_id"),
        checkout_id: row.get("checkout_id"),
        event_type: row.get("event_type"),
        amount: row.get("amount"),
        tier: row.get("tier"),
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get("created_at"),
    }
}

pub(super) fn archive_from_row(row: &SqliteRow) -> Archive {
    let is_expired: i64 = row.get("is_expired");
    Archive {
        id: row.get("id"),
        event_year: row.get("event_year"),
        archived_at: row.get("archived_at"),
        expiration_date: row.get("expiration_date"),
        is_expired: is_expired != 0,
        teams_blob: row.get("teams_blob"),
        members_blob: row.get("members_blob"),
        payment_events_blob: row.get("payment_events_blob"),
        stats_blob: row.get("stats_blob"),
        total_teams: row.get("total_teams"),
        total_participants: row.get("total_participants"),
        total_revenue: row.get("total_revenue"),
        data_hash: row.get("data_hash"),
    }
}
