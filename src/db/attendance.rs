//! Attendance: check-in with on-site collection, check-out, pizza distribution.
//!
//! Batch variants run every item inside one transaction; one failing item aborts the batch.

use chrono::{NaiveDateTime, Utc};
use serde_json::json;
use sqlx::sqlite::SqliteConnection;

use super::repository::*;
use crate::errors::AppError;
use crate::models::{
    BatchCheckInItem, CheckInRequest, EventSettings, Member, OnsiteTier, PaymentStatus,
};
use crate::payments::PaymentTransition;
use crate::pricing::{is_selectable_onsite_tier, onsite_price_for_name};

async fn check_in_on(
    conn: &mut SqliteConnection,
    member_id: &str,
    options: &CheckInRequest,
    settings: &EventSettings,
    now: NaiveDateTime,
) -> Result<Member, AppError> {
    let member = require_member(conn, member_id).await?;
    if member.checked_in {
        return Err(AppError::Validation(format!(
            "{} {} is already checked in",
            member.first_name, member.last_name
        )));
    }
    let stamp = Utc::now().to_rfc3339();

    if options.skip_payment {
        if member.payment_status != PaymentStatus::Paid {
            return Err(AppError::Validation(format!(
                "{} {} has not paid yet",
                member.first_name, member.last_name
            )));
        }
        sqlx::query("UPDATE members SET checked_in = 1, checked_in_at = ? WHERE id = ?")
            .bind(&stamp)
            .bind(member_id)
            .execute(&mut *conn)
            .await?;
        return require_member(conn, member_id).await;
    }

    if member.payment_status.is_terminal() {
        return Err(AppError::Validation(format!(
            "{} {} has already paid",
            member.first_name, member.last_name
        )));
    }
    let next = member.payment_status.apply(PaymentTransition::CollectOnSite)?;

    let tier_name = options
        .payment_tier
        .as_deref()
        .ok_or_else(|| AppError::Validation("A payment tier is required".to_string()))?;
    let tier = OnsiteTier::from_str(tier_name)
        .filter(|t| is_selectable_onsite_tier(*t, settings.late_cutoff_time, now))
        .ok_or_else(|| {
            AppError::Validation(format!("Payment tier '{}' is not available now", tier_name))
        })?;

    let amount = options
        .payment_amount
        .unwrap_or_else(|| onsite_price_for_name(tier_name, settings));
    if amount < 0 {
        return Err(AppError::Validation(
            "Payment amount cannot be negative".to_string(),
        ));
    }

    let result = sqlx::query(
        r#"
        UPDATE members
        SET payment_status = ?, payment_method = ?, payment_amount = ?, payment_tier = ?,
            payment_confirmed_at = ?, checked_in = 1, checked_in_at = ?
        WHERE id = ? AND payment_status = ?
        "#,
    )
    .bind(next.as_str())
    .bind(PaymentTransition::CollectOnSite.method().as_str())
    .bind(amount)
    .bind(tier.as_str())
    .bind(&stamp)
    .bind(&stamp)
    .bind(member_id)
    .bind(member.payment_status.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "Payment status of member {} changed concurrently, please retry",
            member_id
        )));
    }

    insert_payment_event(
        conn,
        member_id,
        None,
        PaymentTransition::CollectOnSite.event_type(),
        amount,
        Some(tier.as_str()),
        Some(json!({
            "previousStatus": member.payment_status.as_str(),
            "abandonedCheckoutId": member.checkout_id,
        })),
    )
    .await?;

    require_member(conn, member_id).await
}

async fn check_out_on(conn: &mut SqliteConnection, member_id: &str) -> Result<Member, AppError> {
    let result =
        sqlx::query("UPDATE members SET checked_in = 0, checked_in_at = NULL WHERE id = ?")
            .bind(member_id)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Member {} not found", member_id)));
    }
    require_member(conn, member_id).await
}

async fn set_pizza_on(
    conn: &mut SqliteConnection,
    member_id: &str,
    received: bool,
) -> Result<Member, AppError> {
    let stamp = received.then(|| Utc::now().to_rfc3339());
    let result =
        sqlx::query("UPDATE members SET pizza_received = ?, pizza_received_at = ? WHERE id = ?")
            .bind(received as i32)
            .bind(&stamp)
            .bind(member_id)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Member {} not found", member_id)));
    }
    require_member(conn, member_id).await
}

impl Repository {
    // ========== Attendance Operations ==========

    pub async fn check_in(
        &self,
        member_id: &str,
        options: &CheckInRequest,
        now: NaiveDateTime,
    ) -> Result<Member, AppError> {
        let mut tx = self.pool.begin().await?;
        let settings = load_settings(&mut tx).await?;
        let member = check_in_on(&mut tx, member_id, options, &settings, now).await?;
        tx.commit().await?;

        tracing::info!(
            member_id = %member_id,
            amount = ?member.payment_amount,
            "Member checked in"
        );
        Ok(member)
    }

    pub async fn batch_check_in(
        &self,
        items: &[BatchCheckInItem],
        now: NaiveDateTime,
    ) -> Result<Vec<Member>, AppError> {
        let mut tx = self.pool.begin().await?;
        let settings = load_settings(&mut tx).await?;
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(check_in_on(&mut tx, &item.member_id, &item.options, &settings, now).await?);
        }
        tx.commit().await?;

        tracing::info!(count = members.len(), "Batch check-in committed");
        Ok(members)
    }

    /// Leaves payment state untouched.
    pub async fn check_out(&self, member_id: &str) -> Result<Member, AppError> {
        let mut conn = self.pool.acquire().await?;
        let member = check_out_on(&mut conn, member_id).await?;
        tracing::info!(member_id = %member_id, "Member checked out");
        Ok(member)
    }

    pub async fn batch_check_out(&self, member_ids: &[String]) -> Result<Vec<Member>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut members = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            members.push(check_out_on(&mut tx, id).await?);
        }
        tx.commit().await?;
        tracing::info!(count = members.len(), "Batch check-out committed");
        Ok(members)
    }

    pub async fn set_pizza(&self, member_id: &str, received: bool) -> Result<Member, AppError> {
        let mut conn = self.pool.acquire().await?;
        let member = set_pizza_on(&mut conn, member_id, received).await?;
        tracing::info!(member_id = %member_id, received, "Pizza status updated");
        Ok(member)
    }

    pub async fn batch_set_pizza(
        &self,
        member_ids: &[String],
        received: bool,
    ) -> Result<Vec<Member>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut members = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            members.push(set_pizza_on(&mut tx, id, received).await?);
        }
        tx.commit().await?;
        tracing::info!(count = members.len(), received, "Batch pizza update committed");
        Ok(members)
    }
}
