//! Yearly archives, retention sweeps and the gated reset.

use chrono::{DateTime, Datelike, Utc};
use sqlx::sqlite::SqliteConnection;

use super::repository::*;
use crate::archive::{self as snapshot, SnapshotBlobs};
use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    Archive, ArchiveDetail, ArchiveExport, ArchiveSummary, ExpirationReport, LiveCounts,
    ResetCheck, ResetOutcome, ORGANISATION_TEAM_NAME,
};

/// Exact phrase a reset request must carry.
pub const RESET_CONFIRMATION_PHRASE: &str = "DELETE ALL DATA";

async fn live_counts(conn: &mut SqliteConnection) -> Result<LiveCounts, AppError> {
    let teams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams WHERE name <> ?")
        .bind(ORGANISATION_TEAM_NAME)
        .fetch_one(&mut *conn)
        .await?;
    let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
        .fetch_one(&mut *conn)
        .await?;
    let payment_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_events")
        .fetch_one(&mut *conn)
        .await?;
    Ok(LiveCounts {
        teams,
        members,
        payment_events,
    })
}

async fn archive_exists(conn: &mut SqliteConnection, year: i32) -> Result<bool, AppError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM archives WHERE event_year = ?)")
            .bind(year)
            .fetch_one(&mut *conn)
            .await?;
    Ok(exists)
}

async fn fetch_archive(conn: &mut SqliteConnection, year: i32) -> Result<Archive, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {ARCHIVE_COLUMNS} FROM archives WHERE event_year = ?"
    ))
    .bind(year)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref()
        .map(archive_from_row)
        .ok_or_else(|| AppError::NotFound(format!("No archive for {}", year)))
}

fn duplicate_archive(year: i32) -> AppError {
    AppError::Duplicate(format!("An archive for {} already exists", year))
}

/// Stored timestamps are RFC 3339; an unreadable one never counts as expired.
fn is_past(expiration_date: &str, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(expiration_date)
        .map(|d| d.with_timezone(&Utc) <= now)
        .unwrap_or(false)
}

impl Repository {
    // ========== Archive Operations ==========

    /// Snapshot the live dataset for `year`.
    pub async fn create_archive(
        &self,
        year: i32,
        now: DateTime<Utc>,
    ) -> Result<ArchiveSummary, AppError> {
        let mut tx = self.pool.begin().await?;
        if archive_exists(&mut tx, year).await? {
            return Err(duplicate_archive(year));
        }

        let counts = live_counts(&mut tx).await?;
        if counts.teams == 0 && counts.members == 0 {
            return Err(AppError::NoData(
                "There is no registration data to archive".to_string(),
            ));
        }

        let teams = sqlx::query(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams ORDER BY created_at, name"
        ))
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(team_from_row)
        .collect::<Vec<_>>();
        let members = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY created_at, last_name, first_name"
        ))
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(member_from_row)
        .collect::<Result<Vec<_>, _>>()?;
        let events = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM payment_events ORDER BY created_at, rowid"
        ))
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(event_from_row)
        .collect::<Vec<_>>();

        let settings = load_settings(&mut tx).await?;
        let blobs = SnapshotBlobs::build(&teams, &members, &events)?;
        let archive = Archive {
            id: uuid::Uuid::new_v4().to_string(),
            event_year: year,
            archived_at: now.to_rfc3339(),
            expiration_date: snapshot::expiration_date(now, settings.gdpr_retention_years)
                .to_rfc3339(),
            is_expired: false,
            data_hash: blobs.data_hash(),
            stats_blob: serde_json::to_string(&blobs.stats)?,
            total_teams: blobs.stats.total_teams,
            total_participants: blobs.stats.participants,
            total_revenue: blobs.stats.total_revenue,
            teams_blob: blobs.teams,
            members_blob: blobs.members,
            payment_events_blob: blobs.payment_events,
        };

        sqlx::query(
            r#"
            INSERT INTO archives (id, event_year, archived_at, expiration_date, is_expired,
                teams_blob, members_blob, payment_events_blob, stats_blob,
                total_teams, total_participants, total_revenue, data_hash)
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&archive.id)
        .bind(archive.event_year)
        .bind(&archive.archived_at)
        .bind(&archive.expiration_date)
        .bind(&archive.teams_blob)
        .bind(&archive.members_blob)
        .bind(&archive.payment_events_blob)
        .bind(&archive.stats_blob)
        .bind(archive.total_teams)
        .bind(archive.total_participants)
        .bind(archive.total_revenue)
        .bind(&archive.data_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_archive(year)
            } else {
                AppError::from(e)
            }
        })?;
        tx.commit().await?;

        tracing::info!(
            year,
            teams = archive.total_teams,
            participants = archive.total_participants,
            revenue = archive.total_revenue,
            "Archive created"
        );
        Ok(ArchiveSummary::from(&archive))
    }

    pub async fn list_archives(&self) -> Result<Vec<ArchiveSummary>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives ORDER BY event_year DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| ArchiveSummary::from(&archive_from_row(row)))
            .collect())
    }

    /// Decoded archive with its digest recomputed.
    pub async fn get_archive(&self, year: i32) -> Result<ArchiveDetail, AppError> {
        let mut conn = self.pool.acquire().await?;
        let archive = fetch_archive(&mut conn, year).await?;
        let integrity_ok = snapshot::verify_integrity(&archive);
        if !integrity_ok {
            tracing::warn!(year, "Archive digest mismatch");
        }

        Ok(ArchiveDetail {
            summary: ArchiveSummary::from(&archive),
            integrity_ok,
            statistics: serde_json::from_str(&archive.stats_blob)?,
            teams: serde_json::from_str(&archive.teams_blob)?,
            members: serde_json::from_str(&archive.members_blob)?,
            payment_events: serde_json::from_str(&archive.payment_events_blob)?,
        })
    }

    pub async fn export_archive(&self, year: i32) -> Result<ArchiveExport, AppError> {
        let mut conn = self.pool.acquire().await?;
        let archive = fetch_archive(&mut conn, year).await?;
        snapshot::build_export(&archive)
    }

    /// Anonymize every archive past its expiration date that is not flagged yet.
    pub async fn check_expiration(&self, now: DateTime<Utc>) -> Result<ExpirationReport, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives ORDER BY event_year"
        ))
        .fetch_all(&self.pool)
        .await?;
        let archives: Vec<Archive> = rows.iter().map(archive_from_row).collect();

        let mut report = ExpirationReport {
            checked: archives.len() as i64,
            expired: 0,
            updated: 0,
        };

        for archive in archives
            .iter()
            .filter(|a| is_past(&a.expiration_date, now))
        {
            report.expired += 1;
            if archive.is_expired {
                continue;
            }

            let members_blob = snapshot::anonymize_members(&archive.members_blob)?;
            let data_hash = snapshot::data_hash(
                &archive.teams_blob,
                &members_blob,
                &archive.payment_events_blob,
            );
            let result = sqlx::query(
                "UPDATE archives SET members_blob = ?, data_hash = ?, is_expired = 1 WHERE id = ? AND is_expired = 0",
            )
            .bind(&members_blob)
            .bind(&data_hash)
            .bind(&archive.id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                report.updated += 1;
                tracing::info!(year = archive.event_year, "Archive anonymized after retention period");
            }
        }

        Ok(report)
    }

    // ========== Reset Operations ==========

    /// Whether wiping the live data now would lose anything not archived.
    pub async fn reset_check(&self, now: DateTime<Utc>) -> Result<ResetCheck, AppError> {
        let mut conn = self.pool.acquire().await?;
        let year = now.year();
        let counts = live_counts(&mut conn).await?;
        let archive_exists = archive_exists(&mut conn, year).await?;

        Ok(ResetCheck {
            year,
            archive_exists,
            safe: counts.is_empty() || archive_exists,
            counts,
        })
    }

    /// Delete all live registration data except the Organisation team row.
    pub async fn reset(
        &self,
        confirmation: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<ResetOutcome, AppError> {
        if confirmation != RESET_CONFIRMATION_PHRASE {
            return Err(AppError::Confirmation(format!(
                "Type '{}' to confirm the reset",
                RESET_CONFIRMATION_PHRASE
            )));
        }

        // The archive decision is made on the rows actually deleted, under the write lock.
        let mut tx = self.pool.begin().await?;
        let payment_events = sqlx::query("DELETE FROM payment_events")
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;
        let members = sqlx::query("DELETE FROM members")
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;
        let teams = sqlx::query("DELETE FROM teams WHERE name <> ?")
            .bind(ORGANISATION_TEAM_NAME)
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;
        let deleted = LiveCounts {
            teams,
            members,
            payment_events,
        };

        let year = now.year();
        let safe = deleted.is_empty() || archive_exists(&mut tx, year).await?;
        if !safe && !force {
            tx.rollback().await?;
            tracing::warn!(year, "Reset refused: no archive for the current year");
            return Ok(ResetOutcome::Warning {
                warning: "no_archive".to_string(),
                message: format!(
                    "No archive exists for {}. Create one first or force the reset.",
                    year
                ),
            });
        }
        tx.commit().await?;

        tracing::warn!(
            teams,
            members,
            payment_events,
            forced = !safe,
            "Live data reset"
        );
        Ok(ResetOutcome::Deleted { deleted })
    }
}
