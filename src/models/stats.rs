//! Public statistics and pricing views.

use serde::Serialize;

use super::{OnsiteTier, RegistrationTier};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStats {
    pub total_teams: i64,
    pub total_participants: i64,
    pub max_total_participants: i64,
    pub remaining_spots: i64,
    pub max_team_size: i64,
    pub min_team_size: i64,
    pub checked_in: i64,
    pub paid: i64,
    pub registration_open: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingOverview {
    pub payment_enabled: bool,
    pub current_tier: RegistrationTier,
    pub current_price: i64,
    pub price_tier1: i64,
    pub price_tier2: i64,
    pub registration_deadline: Option<String>,
    /// Last instant (exclusive) of the early-bird price
    pub tier1_cutoff: Option<String>,
    pub onsite: OnsitePricing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnsitePricing {
    pub late_cutoff_time: String,
    pub after_late_cutoff: bool,
    pub available_tiers: Vec<OnsiteTierPrice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnsiteTierPrice {
    pub tier: OnsiteTier,
    pub price: i64,
}
