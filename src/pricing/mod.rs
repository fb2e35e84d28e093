//! Price tiers for online prepayment and on-site collection.
//!
//! All functions take `now` explicitly so callers decide which clock applies.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{
    EventSettings, OnsitePricing, OnsiteTier, OnsiteTierPrice, PricingOverview, RegistrationTier,
};

/// Instant at which the early-bird price ends, if a deadline is configured.
pub fn tier1_cutoff(deadline: Option<NaiveDate>, cutoff_days: i64) -> Option<NaiveDateTime> {
    deadline.map(|d| d.and_time(NaiveTime::MIN) - Duration::days(cutoff_days))
}

/// No deadline means standard pricing; otherwise tier1 strictly before the cutoff.
pub fn calculate_tier(
    deadline: Option<NaiveDate>,
    cutoff_days: i64,
    now: NaiveDateTime,
) -> RegistrationTier {
    match tier1_cutoff(deadline, cutoff_days) {
        Some(cutoff) if now < cutoff => RegistrationTier::Tier1,
        _ => RegistrationTier::Tier2,
    }
}

pub fn online_price(tier: RegistrationTier, settings: &EventSettings) -> i64 {
    match tier {
        RegistrationTier::Tier1 => settings.price_tier1,
        RegistrationTier::Tier2 => settings.price_tier2,
    }
}

pub fn onsite_price(tier: OnsiteTier, settings: &EventSettings) -> i64 {
    match tier {
        OnsiteTier::Organisation => 0,
        OnsiteTier::AssoMember => settings.price_asso_member,
        OnsiteTier::NonMember => settings.price_non_member,
        OnsiteTier::Late => settings.price_late,
    }
}

/// Price for a tier name as submitted. Unknown names cost the member price.
pub fn onsite_price_for_name(tier: &str, settings: &EventSettings) -> i64 {
    OnsiteTier::from_str(tier)
        .map(|t| onsite_price(t, settings))
        .unwrap_or(settings.price_asso_member)
}

/// Whether `now` is at or past today's late cutoff.
pub fn is_after_late_cutoff(late_cutoff: NaiveTime, now: NaiveDateTime) -> bool {
    now >= now.date().and_time(late_cutoff)
}

/// Tiers a cashier may choose from at this moment.
pub fn available_onsite_tiers(late_cutoff: NaiveTime, now: NaiveDateTime) -> [OnsiteTier; 2] {
    if is_after_late_cutoff(late_cutoff, now) {
        [OnsiteTier::AssoMember, OnsiteTier::Late]
    } else {
        [OnsiteTier::AssoMember, OnsiteTier::NonMember]
    }
}

/// Organisation is always accepted; the others must be currently available.
pub fn is_selectable_onsite_tier(tier: OnsiteTier, late_cutoff: NaiveTime, now: NaiveDateTime) -> bool {
    tier == OnsiteTier::Organisation || available_onsite_tiers(late_cutoff, now).contains(&tier)
}

pub fn pricing_overview(settings: &EventSettings, now: NaiveDateTime) -> PricingOverview {
    let current_tier = calculate_tier(
        settings.registration_deadline,
        settings.tier1_cutoff_days,
        now,
    );
    let cutoff = tier1_cutoff(settings.registration_deadline, settings.tier1_cutoff_days);

    PricingOverview {
        payment_enabled: settings.payment_enabled,
        current_tier,
        current_price: online_price(current_tier, settings),
        price_tier1: settings.price_tier1,
        price_tier2: settings.price_tier2,
        registration_deadline: settings
            .registration_deadline
            .map(|d| d.format("%Y-%m-%d").to_string()),
        tier1_cutoff: cutoff.map(|c| c.format("%Y-%m-%dT%H:%M:%S").to_string()),
        onsite: OnsitePricing {
            late_cutoff_time: settings.late_cutoff_time.format("%H:%M").to_string(),
            after_late_cutoff: is_after_late_cutoff(settings.late_cutoff_time, now),
            available_tiers: available_onsite_tiers(settings.late_cutoff_time, now)
                .iter()
                .map(|tier| OnsiteTierPrice {
                    tier: *tier,
                    price: onsite_price(*tier, settings),
                })
                .collect(),
        },
    }
}
