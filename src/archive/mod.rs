//! Snapshot content for yearly archives: blobs, statistics, digests and redaction.

use chrono::{DateTime, Months, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::models::{
    Archive, ArchiveExport, ArchiveStats, ArchiveSummary, Member, PaymentEvent, PaymentMethod,
    PaymentStatus, Team,
};

/// Placeholder written over redacted first names.
pub const REDACTED_FIRST_NAME: &str = "Anonyme";

/// Serialized content of a snapshot, ready to store.
#[derive(Debug, Clone)]
pub struct SnapshotBlobs {
    pub teams: String,
    pub members: String,
    pub payment_events: String,
    pub stats: ArchiveStats,
}

impl SnapshotBlobs {
    pub fn build(
        teams: &[Team],
        members: &[Member],
        events: &[PaymentEvent],
    ) -> Result<Self, AppError> {
        Ok(Self {
            teams: serde_json::to_string(teams)?,
            members: serde_json::to_string(members)?,
            payment_events: serde_json::to_string(events)?,
            stats: compute_stats(teams, members, events),
        })
    }

    pub fn data_hash(&self) -> String {
        data_hash(&self.teams, &self.members, &self.payment_events)
    }
}

/// Hex SHA-256 over the three blobs in a fixed order.
pub fn data_hash(teams_blob: &str, members_blob: &str, events_blob: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(teams_blob.as_bytes());
    hasher.update(members_blob.as_bytes());
    hasher.update(events_blob.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the digest of a stored archive and compare it with the recorded one.
pub fn verify_integrity(archive: &Archive) -> bool {
    let recomputed = data_hash(
        &archive.teams_blob,
        &archive.members_blob,
        &archive.payment_events_blob,
    );
    crate::auth::constant_time_compare(&recomputed, &archive.data_hash)
}

/// Revenue is what was actually settled: the sum of recorded payment amounts.
pub fn compute_stats(teams: &[Team], members: &[Member], events: &[PaymentEvent]) -> ArchiveStats {
    let organisation_ids: Vec<&str> = teams
        .iter()
        .filter(|t| t.is_organisation())
        .map(|t| t.id.as_str())
        .collect();

    let mut stats = ArchiveStats {
        total_teams: teams.len() as i64,
        total_members: members.len() as i64,
        payment_events: events.len() as i64,
        ..ArchiveStats::default()
    };

    for member in members {
        if organisation_ids.contains(&member.team_id.as_str()) {
            stats.organisation_members += 1;
        } else {
            stats.participants += 1;
        }
        if member.checked_in {
            stats.checked_in += 1;
        }
        if member.pizza_received {
            stats.pizzas_given += 1;
        }
        match member.payment_status {
            PaymentStatus::Paid => stats.paid += 1,
            PaymentStatus::Pending => stats.pending += 1,
            PaymentStatus::Delayed => stats.delayed += 1,
            PaymentStatus::Unpaid => stats.unpaid += 1,
        }

        let amount = member.payment_amount.unwrap_or(0);
        stats.total_revenue += amount;
        match member.payment_method {
            Some(PaymentMethod::Online) => stats.online_revenue += amount,
            Some(PaymentMethod::OnSite) => stats.onsite_revenue += amount,
            None => {}
        }
    }

    stats
}

/// Legal expiration: the archive date shifted by whole years.
pub fn expiration_date(archived_at: DateTime<Utc>, retention_years: i64) -> DateTime<Utc> {
    let months = u32::try_from(retention_years.max(0) * 12).unwrap_or(u32::MAX);
    archived_at
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Irreversibly replace personal fields in a members blob.
///
/// Each entry keeps its keys, ids, team link, payment and attendance data so the
/// aggregate statistics stay reproducible.
pub fn anonymize_members(members_blob: &str) -> Result<String, AppError> {
    let mut members: Vec<Value> = serde_json::from_str(members_blob)?;

    for (index, member) in members.iter_mut().enumerate() {
        let Some(fields) = member.as_object_mut() else {
            continue;
        };
        fields.insert("firstName".into(), json!(REDACTED_FIRST_NAME));
        fields.insert("lastName".into(), json!(format!("Participant {}", index + 1)));
        fields.insert("email".into(), json!(""));
        if fields.contains_key("foodDiet") {
            fields.insert("foodDiet".into(), Value::Null);
        }
    }

    Ok(serde_json::to_string(&members)?)
}

/// Build the downloadable bundle: one team row per archived team, one participant row
/// per archived member.
pub fn build_export(archive: &Archive) -> Result<ArchiveExport, AppError> {
    let teams: Vec<Value> = serde_json::from_str(&archive.teams_blob)?;
    let members: Vec<Value> = serde_json::from_str(&archive.members_blob)?;
    let statistics: ArchiveStats = serde_json::from_str(&archive.stats_blob)?;

    let team_name = |team_id: &Value| -> Value {
        teams
            .iter()
            .find(|t| &t["id"] == team_id)
            .map(|t| t["name"].clone())
            .unwrap_or(Value::Null)
    };

    let team_rows = teams
        .iter()
        .map(|team| {
            let member_count = members
                .iter()
                .filter(|m| m["teamId"] == team["id"])
                .count();
            json!({
                "name": team["name"],
                "description": team.get("description").cloned().unwrap_or(Value::Null),
                "room": team["room"],
                "memberCount": member_count,
                "createdAt": team["createdAt"],
            })
        })
        .collect();

    let participant_rows = members
        .iter()
        .map(|m| {
            json!({
                "team": team_name(&m["teamId"]),
                "firstName": m["firstName"],
                "lastName": m["lastName"],
                "email": m["email"],
                "bacLevel": m["bacLevel"],
                "isLeader": m["isLeader"],
                "checkedIn": m["checkedIn"],
                "paymentStatus": m["paymentStatus"],
                "paymentMethod": m["paymentMethod"],
                "paymentAmount": m["paymentAmount"],
            })
        })
        .collect();

    Ok(ArchiveExport {
        metadata: ArchiveSummary::from(archive),
        statistics,
        teams: team_rows,
        participants: participant_rows,
        readme: readme(archive),
    })
}

fn readme(archive: &Archive) -> String {
    let status = if archive.is_expired {
        "Personal data in this archive has been anonymized after the retention period."
    } else {
        "This archive contains personal data. It must be anonymized or destroyed after the expiration date."
    };
    format!(
        "Event archive {year}\n\
         Archived at: {archived}\n\
         Expiration date: {expires}\n\
         Teams: {teams}\n\
         Participants: {participants}\n\
         Revenue (minor units): {revenue}\n\
         SHA-256 of teams, members and payment events blobs: {hash}\n\
         \n\
         {status}\n",
        year = archive.event_year,
        archived = archive.archived_at,
        expires = archive.expiration_date,
        teams = archive.total_teams,
        participants = archive.total_participants,
        revenue = archive.total_revenue,
        hash = archive.data_hash,
        status = status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn team(id: &str, name: &str) -> Team {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            description: Some("desc".to_string()),
            password_hash: "$2b$04$secret".to_string(),
            room: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn member(id: &str, team_id: &str, status: PaymentStatus, amount: Option<i64>) -> Member {
        Member {
            id: id.to_string(),
            team_id: team_id.to_string(),
            first_name: "Alice".to_string(),
            last_name: format!("Martin-{id}"),
            email: "alice@example.org".to_string(),
            bac_level: 2,
            is_leader: true,
            food_diet: Some("vegan".to_string()),
            checked_in: true,
            checked_in_at: None,
            pizza_received: false,
            pizza_received_at: None,
            payment_status: status,
            payment_method: amount.map(|_| PaymentMethod::Online),
            checkout_id: None,
            transaction_id: None,
            registration_tier: None,
            payment_amount: amount,
            payment_tier: None,
            payment_confirmed_at: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_team_blob_excludes_password_hash() {
        let blobs = SnapshotBlobs::build(&[team("t1", "A")], &[], &[]).unwrap();
        assert!(!blobs.teams.contains("secret"));
        assert!(!blobs.teams.contains("passwordHash"));
    }

    #[test]
    fn test_stats_exclude_organisation_from_participants() {
        let teams = vec![team("t1", "A"), team("org", "Organisation")];
        let members = vec![
            member("m1", "t1", PaymentStatus::Paid, Some(500)),
            member("m2", "t1", PaymentStatus::Unpaid, None),
            member("m3", "org", PaymentStatus::Unpaid, None),
        ];
        let stats = compute_stats(&teams, &members, &[]);
        assert_eq!(stats.total_teams, 2);
        assert_eq!(stats.participants, 2);
        assert_eq!(stats.organisation_members, 1);
        assert_eq!(stats.total_revenue, 500);
        assert_eq!(stats.online_revenue, 500);
        assert_eq!(stats.paid, 1);
        assert_eq!(stats.unpaid, 2);
    }

    #[test]
    fn test_hash_is_order_sensitive_and_stable() {
        let a = data_hash("[1]", "[2]", "[3]");
        assert_eq!(a, data_hash("[1]", "[2]", "[3]"));
        assert_ne!(a, data_hash("[2]", "[1]", "[3]"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_anonymize_preserves_shape() {
        let members = vec![member("m1", "t1", PaymentStatus::Paid, Some(800))];
        let blob = serde_json::to_string(&members).unwrap();
        let redacted = anonymize_members(&blob).unwrap();

        assert!(!redacted.contains("alice@example.org"));
        assert!(!redacted.contains("Martin"));
        assert!(!redacted.contains("vegan"));

        let before: Vec<Value> = serde_json::from_str(&blob).unwrap();
        let after: Vec<Value> = serde_json::from_str(&redacted).unwrap();
        let keys = |v: &Value| {
            let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
            k.sort();
            k
        };
        assert_eq!(keys(&before[0]), keys(&after[0]));
        assert_eq!(after[0]["paymentAmount"], 800);
        assert_eq!(after[0]["teamId"], "t1");
    }

    #[test]
    fn test_expiration_date_adds_years() {
        let archived = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        let expires = expiration_date(archived, 3);
        assert_eq!(expires, Utc.with_ymd_and_hms(2027, 2, 28, 12, 0, 0).unwrap());
    }
}
