//! Archive models: yearly snapshots, their statistics and the reset workflow shapes.

use serde::{Deserialize, Serialize};

/// Stored snapshot of one event edition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub id: String,
    pub event_year: i32,
    pub archived_at: String,
    pub expiration_date: String,
    pub is_expired: bool,
    pub teams_blob: String,
    pub members_blob: String,
    pub payment_events_blob: String,
    pub stats_blob: String,
    pub total_teams: i64,
    pub total_participants: i64,
    pub total_revenue: i64,
    pub data_hash: String,
}

/// Listing entry without the blobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub id: String,
    pub event_year: i32,
    pub archived_at: String,
    pub expiration_date: String,
    pub is_expired: bool,
    pub total_teams: i64,
    pub total_participants: i64,
    pub total_revenue: i64,
    pub data_hash: String,
}

impl From<&Archive> for ArchiveSummary {
    fn from(archive: &Archive) -> Self {
        Self {
            id: archive.id.clone(),
            event_year: archive.event_year,
            archived_at: archive.archived_at.clone(),
            expiration_date: archive.expiration_date.clone(),
            is_expired: archive.is_expired,
            total_teams: archive.total_teams,
            total_participants: archive.total_participants,
            total_revenue: archive.total_revenue,
            data_hash: archive.data_hash.clone(),
        }
    }
}

/// Archive detail with decoded content and an integrity check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDetail {
    #[serde(flatten)]
    pub summary: ArchiveSummary,
    pub integrity_ok: bool,
    pub statistics: ArchiveStats,
    pub teams: serde_json::Value,
    pub members: serde_json::Value,
    pub payment_events: serde_json::Value,
}

/// Aggregate statistics computed when a snapshot is taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub total_teams: i64,
    pub total_members: i64,
    pub organisation_members: i64,
    pub participants: i64,
    pub checked_in: i64,
    pub pizzas_given: i64,
    pub paid: i64,
    pub pending: i64,
    pub delayed: i64,
    pub unpaid: i64,
    pub total_revenue: i64,
    pub online_revenue: i64,
    pub onsite_revenue: i64,
    pub payment_events: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArchiveRequest {
    #[serde(alias = "year")]
    pub event_year: i32,
}

/// Outcome of an expiration sweep.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExpirationReport {
    pub checked: i64,
    pub expired: i64,
    pub updated: i64,
}

/// Counts of live rows that a reset would delete.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveCounts {
    pub teams: i64,
    pub members: i64,
    pub payment_events: i64,
}

impl LiveCounts {
    pub fn is_empty(&self) -> bool {
        self.teams == 0 && self.members == 0 && self.payment_events == 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetCheck {
    pub year: i32,
    pub archive_exists: bool,
    pub counts: LiveCounts,
    pub safe: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub confirmation: String,
    #[serde(default)]
    pub force: bool,
}

/// Result of a reset request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResetOutcome {
    Deleted { deleted: LiveCounts },
    Warning { warning: String, message: String },
}

/// Downloadable bundle for one archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveExport {
    pub metadata: ArchiveSummary,
    pub statistics: ArchiveStats,
    pub teams: Vec<serde_json::Value>,
    pub participants: Vec<serde_json::Value>,
    pub readme: String,
}
