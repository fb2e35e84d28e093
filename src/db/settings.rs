//! Event settings read and update.

use std::collections::BTreeMap;

use sqlx::Row;

use super::repository::*;
use crate::errors::AppError;
use crate::models::settings::{normalize, MAX_TEAM_SIZE, MIN_TEAM_SIZE};
use crate::models::EventSettings;

impl Repository {
    // ========== Settings Operations ==========

    pub async fn get_settings(&self) -> Result<EventSettings, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_settings(&mut conn).await
    }

    /// Raw stored pairs, as shown on the admin settings screen.
    pub async fn raw_settings(&self) -> Result<BTreeMap<String, String>, AppError> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    /// Validate every submitted key, then write them all or none.
    pub async fn update_settings(
        &self,
        changes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, String>, AppError> {
        if changes.is_empty() {
            return Err(AppError::Validation("No settings to update".to_string()));
        }

        let normalized = changes
            .iter()
            .map(|(key, value)| normalize(key, value).map(|v| (key.clone(), v)))
            .collect::<Result<BTreeMap<String, String>, AppError>>()?;

        let mut tx = self.pool.begin().await?;
        for (key, value) in &normalized {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        let merged = load_settings(&mut tx).await?;
        if merged.min_team_size > merged.max_team_size {
            return Err(AppError::Validation(format!(
                "'{}' ({}) cannot exceed '{}' ({})",
                MIN_TEAM_SIZE, merged.min_team_size, MAX_TEAM_SIZE, merged.max_team_size
            )));
        }
        tx.commit().await?;

        tracing::info!(keys = ?normalized.keys().collect::<Vec<_>>(), "Settings updated");
        self.raw_settings().await
    }
}
