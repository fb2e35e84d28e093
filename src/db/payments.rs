//! Payment lifecycle persistence: online checkout, verification, callbacks and
//! deferred on-site payment.
//!
//! Status writes are compare-and-swap updates guarded by the status the transition
//! started from, committed together with their ledger event.

use chrono::{NaiveDateTime, Utc};
use serde_json::json;
use sqlx::sqlite::SqliteConnection;

use super::repository::*;
use crate::errors::AppError;
use crate::models::{
    CallbackAck, CheckoutSession, Member, PaymentStatus, PaymentVerification,
};
use crate::payments::{parse_callback, CheckoutIntent, CheckoutState, PaymentGateway, PaymentTransition};
use crate::pricing::{calculate_tier, online_price};

fn lost_race(member_id: &str) -> AppError {
    AppError::Conflict(format!(
        "Payment status of member {} changed concurrently, please retry",
        member_id
    ))
}

fn verification(member: &Member, checkout_id: &str) -> PaymentVerification {
    PaymentVerification {
        member_id: member.id.clone(),
        checkout_id: checkout_id.to_string(),
        payment_status: member.payment_status,
        payment_amount: member.payment_amount,
    }
}

async fn member_by_checkout(
    conn: &mut SqliteConnection,
    checkout_id: &str,
) -> Result<Option<Member>, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {MEMBER_COLUMNS} FROM members WHERE checkout_id = ?"
    ))
    .bind(checkout_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(member_from_row).transpose()
}

/// Amount quoted when the checkout was opened.
async fn quoted_amount(
    conn: &mut SqliteConnection,
    checkout_id: &str,
) -> Result<Option<i64>, AppError> {
    let amount: Option<i64> = sqlx::query_scalar(
        "SELECT amount FROM payment_events WHERE checkout_id = ? AND event_type = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .bind(checkout_id)
    .bind(PaymentTransition::InitiateCheckout.event_type())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(amount)
}

impl Repository {
    /// Start an online payment for an unpaid member.
    pub async fn initiate_checkout(
        &self,
        gateway: &PaymentGateway,
        member_id: &str,
        public_url: &str,
        now: NaiveDateTime,
    ) -> Result<CheckoutSession, AppError> {
        let mut conn = self.pool.acquire().await?;
        let settings = load_settings(&mut conn).await?;
        if !settings.payment_enabled {
            return Err(AppError::Validation(
                "Online payment is disabled".to_string(),
            ));
        }

        let member = require_member(&mut conn, member_id).await?;
        let next = member
            .payment_status
            .apply(PaymentTransition::InitiateCheckout)?;
        gateway.ensure_configured()?;
        drop(conn);

        let tier = member.registration_tier.unwrap_or_else(|| {
            calculate_tier(
                settings.registration_deadline,
                settings.tier1_cutoff_days,
                now,
            )
        });
        let amount = online_price(tier, &settings);

        let intent = CheckoutIntent {
            member_id: member.id.clone(),
            amount,
            item_name: format!("Inscription {} {}", member.first_name, member.last_name),
            payer_first_name: member.first_name.clone(),
            payer_last_name: member.last_name.clone(),
            payer_email: member.email.clone(),
            return_url: format!("{}/payment/return?member={}", public_url, member.id),
            back_url: format!("{}/payment/cancel?member={}", public_url, member.id),
            error_url: format!("{}/payment/error?member={}", public_url, member.id),
        };
        let created = gateway.create_checkout(&intent).await?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE members SET payment_status = ?, payment_method = ?, checkout_id = ?, registration_tier = COALESCE(registration_tier, ?) WHERE id = ? AND payment_status = ?",
        )
        .bind(next.as_str())
        .bind(PaymentTransition::InitiateCheckout.method().as_str())
        .bind(&created.checkout_id)
        .bind(tier.as_str())
        .bind(member_id)
        .bind(member.payment_status.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(lost_race(member_id));
        }

        insert_payment_event(
            &mut tx,
            member_id,
            Some(&created.checkout_id),
            PaymentTransition::InitiateCheckout.event_type(),
            amount,
            Some(tier.as_str()),
            Some(json!({ "redirectUrl": created.redirect_url })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            member_id = %member_id,
            checkout_id = %created.checkout_id,
            amount,
            tier = tier.as_str(),
            "Checkout initiated"
        );

        Ok(CheckoutSession {
            member_id: member_id.to_string(),
            checkout_id: created.checkout_id,
            redirect_url: created.redirect_url,
            amount,
            tier,
        })
    }

    /// Ask the gateway whether a checkout settled and record it if so.
    pub async fn verify_payment(
        &self,
        gateway: &PaymentGateway,
        checkout_id: &str,
    ) -> Result<PaymentVerification, AppError> {
        let mut conn = self.pool.acquire().await?;
        let member = member_by_checkout(&mut conn, checkout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Checkout {} not found", checkout_id)))?;
        drop(conn);

        if member.payment_status != PaymentStatus::Pending {
            return Ok(verification(&member, checkout_id));
        }

        let state = gateway.checkout_state(checkout_id).await?;
        if !state.paid {
            return Ok(verification(&member, checkout_id));
        }

        let confirmed = self.confirm_online(&member, checkout_id, &state, "verify").await?;
        Ok(verification(&confirmed, checkout_id))
    }

    /// Gateway notification. Never fails toward the gateway.
    ///
    /// The body only says which checkout to look at; settlement is read back from the
    /// gateway before anything is recorded.
    pub async fn payment_callback(
        &self,
        gateway: &PaymentGateway,
        payload: &serde_json::Value,
    ) -> CallbackAck {
        let ack = CallbackAck { received: true };

        let Some(notice) = parse_callback(payload) else {
            tracing::warn!("Payment callback without a checkout id ignored");
            return ack;
        };

        let member = match self.pool.acquire().await {
            Ok(mut conn) => member_by_checkout(&mut conn, &notice.checkout_id).await,
            Err(e) => Err(AppError::from(e)),
        };
        let member = match member {
            Ok(Some(member)) => member,
            Ok(None) => {
                tracing::warn!(checkout_id = %notice.checkout_id, "Payment callback for unknown checkout");
                return ack;
            }
            Err(e) => {
                tracing::error!(checkout_id = %notice.checkout_id, "Payment callback lookup failed: {}", e);
                return ack;
            }
        };

        if !notice.state.paid {
            tracing::info!(checkout_id = %notice.checkout_id, "Payment callback without settlement");
            return ack;
        }
        if member.payment_status != PaymentStatus::Pending {
            tracing::info!(
                checkout_id = %notice.checkout_id,
                status = member.payment_status.as_str(),
                "Payment callback ignored for member not awaiting confirmation"
            );
            return ack;
        }

        let state = match gateway.checkout_state(&notice.checkout_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(checkout_id = %notice.checkout_id, "Payment callback could not be checked: {}", e);
                return ack;
            }
        };
        if !state.paid {
            tracing::warn!(
                checkout_id = %notice.checkout_id,
                claimed_paid = notice.state.paid,
                "Payment callback not backed by the gateway"
            );
            return ack;
        }

        if let Err(e) = self
            .confirm_online(&member, &notice.checkout_id, &state, "callback")
            .await
        {
            tracing::error!(checkout_id = %notice.checkout_id, "Payment callback not recorded: {}", e);
        }
        ack
    }

    /// pending -> paid. A concurrent confirmation that got there first is not an error.
    async fn confirm_online(
        &self,
        member: &Member,
        checkout_id: &str,
        state: &CheckoutState,
        source: &str,
    ) -> Result<Member, AppError> {
        let next = member.payment_status.apply(PaymentTransition::ConfirmOnline)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let amount = quoted_amount(&mut tx, checkout_id)
            .await?
            .or(state.amount)
            .unwrap_or(0);

        let result = sqlx::query(
            "UPDATE members SET payment_status = ?, payment_method = ?, payment_amount = ?, transaction_id = ?, payment_confirmed_at = ? WHERE id = ? AND payment_status = ?",
        )
        .bind(next.as_str())
        .bind(PaymentTransition::ConfirmOnline.method().as_str())
        .bind(amount)
        .bind(&state.transaction_id)
        .bind(&now)
        .bind(&member.id)
        .bind(member.payment_status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            tracing::info!(member_id = %member.id, "Payment already confirmed concurrently");
            return self.get_member(&member.id).await;
        }

        insert_payment_event(
            &mut tx,
            &member.id,
            Some(checkout_id),
            PaymentTransition::ConfirmOnline.event_type(),
            amount,
            member.registration_tier.map(|t| t.as_str()),
            Some(json!({ "source": source, "transactionId": state.transaction_id })),
        )
        .await?;
        let confirmed = require_member(&mut tx, &member.id).await?;
        tx.commit().await?;

        tracing::info!(member_id = %member.id, checkout_id = %checkout_id, amount, "Payment confirmed");
        Ok(confirmed)
    }

    /// The member will pay at the venue.
    pub async fn mark_delayed(&self, member_id: &str, now: NaiveDateTime) -> Result<Member, AppError> {
        let mut tx = self.pool.begin().await?;
        let member = require_member(&mut tx, member_id).await?;
        let next = member.payment_status.apply(PaymentTransition::MarkDelayed)?;

        let settings = load_settings(&mut tx).await?;
        let tier = member.registration_tier.unwrap_or_else(|| {
            calculate_tier(
                settings.registration_deadline,
                settings.tier1_cutoff_days,
                now,
            )
        });

        let result = sqlx::query(
            "UPDATE members SET payment_status = ?, payment_method = ?, registration_tier = COALESCE(registration_tier, ?) WHERE id = ? AND payment_status = ?",
        )
        .bind(next.as_str())
        .bind(PaymentTransition::MarkDelayed.method().as_str())
        .bind(tier.as_str())
        .bind(member_id)
        .bind(member.payment_status.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(lost_race(member_id));
        }

        insert_payment_event(
            &mut tx,
            member_id,
            None,
            PaymentTransition::MarkDelayed.event_type(),
            0,
            Some(tier.as_str()),
            None,
        )
        .await?;
        let updated = require_member(&mut tx, member_id).await?;
        tx.commit().await?;

        tracing::info!(member_id = %member_id, tier = tier.as_str(), "Payment deferred to on-site");
        Ok(updated)
    }
}
