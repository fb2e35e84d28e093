//! Database module for SQLite persistence.
//!
//! SQLite is the single source of truth. Every operation runs as its own unit of work;
//! multi-row writes commit in one transaction.

mod archives;
mod attendance;
mod members;
mod payments;
mod registration;
mod repository;
mod settings;
mod teams;

pub use archives::RESET_CONFIRMATION_PHRASE;
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::models::{settings as event_settings, ORGANISATION_TEAM_NAME};

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL COLLATE NOCASE UNIQUE,
            description TEXT,
            password_hash TEXT NOT NULL,
            room TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // (first_name, last_name) is the anti-duplicate-registration guard
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            first_name TEXT NOT NULL COLLATE NOCASE,
            last_name TEXT NOT NULL COLLATE NOCASE,
            email TEXT NOT NULL,
            bac_level INTEGER NOT NULL CHECK (bac_level BETWEEN 0 AND 8),
            is_leader INTEGER NOT NULL DEFAULT 0,
            food_diet TEXT,
            checked_in INTEGER NOT NULL DEFAULT 0,
            checked_in_at TEXT,
            pizza_received INTEGER NOT NULL DEFAULT 0,
            pizza_received_at TEXT,
            payment_status TEXT NOT NULL DEFAULT 'unpaid'
                CHECK (payment_status IN ('unpaid', 'pending', 'paid', 'delayed')),
            payment_method TEXT CHECK (payment_method IN ('online', 'on_site')),
            checkout_id TEXT,
            transaction_id TEXT,
            registration_tier TEXT CHECK (registration_tier IN ('tier1', 'tier2')),
            payment_amount INTEGER,
            payment_tier TEXT,
            payment_confirmed_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (first_name, last_name)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_events (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            checkout_id TEXT,
            event_type TEXT NOT NULL,
            amount INTEGER NOT NULL DEFAULT 0,
            tier TEXT,
            metadata TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS payment_events_append_only
        BEFORE UPDATE ON payment_events
        BEGIN
            SELECT RAISE(ABORT, 'payment_events is append-only');
        END;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archives (
            id TEXT PRIMARY KEY,
            event_year INTEGER NOT NULL UNIQUE,
            archived_at TEXT NOT NULL,
            expiration_date TEXT NOT NULL,
            is_expired INTEGER NOT NULL DEFAULT 0,
            teams_blob TEXT NOT NULL,
            members_blob TEXT NOT NULL,
            payment_events_blob TEXT NOT NULL,
            stats_blob TEXT NOT NULL,
            total_teams INTEGER NOT NULL,
            total_participants INTEGER NOT NULL,
            total_revenue INTEGER NOT NULL,
            data_hash TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_members_team_id ON members(team_id);
        CREATE INDEX IF NOT EXISTS idx_members_checkout_id ON members(checkout_id);
        CREATE INDEX IF NOT EXISTS idx_payment_events_member_id ON payment_events(member_id);
        CREATE INDEX IF NOT EXISTS idx_payment_events_checkout_id ON payment_events(checkout_id);
        "#,
    )
    .execute(pool)
    .await?;

    // The staff team has no usable password until an admin sets one
    sqlx::query(
        "INSERT OR IGNORE INTO teams (id, name, description, password_hash, room, created_at) VALUES (?, ?, ?, '!', NULL, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(ORGANISATION_TEAM_NAME)
    .bind("Event staff")
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    for (key, value) in event_settings::defaults() {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}
