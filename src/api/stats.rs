//! Public statistics and pricing.

use axum::extract::State;

use super::{local_now, success, ApiResult};
use crate::models::{PricingOverview, PublicStats};
use crate::pricing::pricing_overview;
use crate::AppState;

/// GET /api/stats - Headcount and remaining spots.
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<PublicStats> {
    success(state.repo.public_stats(local_now()).await?)
}

/// GET /api/pricing - Current online price and on-site tiers.
pub async fn get_pricing(State(state): State<AppState>) -> ApiResult<PricingOverview> {
    let settings = state.repo.get_settings().await?;
    success(pricing_overview(&settings, local_now()))
}
