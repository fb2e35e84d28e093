//! Payment API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

use super::{local_now, success, ApiResult};
use crate::models::{
    CallbackAck, CheckoutSession, Member, MemberPaymentRequest, PaymentVerification,
};
use crate::AppState;

/// POST /api/payments/checkout - Open an online checkout for a member.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    Json(request): Json<MemberPaymentRequest>,
) -> ApiResult<CheckoutSession> {
    let session = state
        .repo
        .initiate_checkout(
            &state.gateway,
            &request.member_id,
            &state.config.public_url,
            local_now(),
        )
        .await?;
    success(session)
}

/// GET /api/payments/verify/{checkoutId} - Reconcile a checkout with the gateway.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
) -> ApiResult<PaymentVerification> {
    success(
        state
            .repo
            .verify_payment(&state.gateway, &checkout_id)
            .await?,
    )
}

/// POST /api/payments/callback - Gateway notification.
///
/// Always answers `{"received": true}`, even for bodies that are not JSON.
pub async fn payment_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let payload = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::warn!("Unreadable payment callback body: {}", e);
        serde_json::Value::Null
    });
    Json(state.repo.payment_callback(&state.gateway, &payload).await)
}

/// POST /api/payments/delayed - Defer payment to the venue.
pub async fn mark_delayed(
    State(state): State<AppState>,
    Json(request): Json<MemberPaymentRequest>,
) -> ApiResult<Member> {
    success(state.repo.mark_delayed(&request.member_id, local_now()).await?)
}
