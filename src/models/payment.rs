//! Payment enums and the payment event ledger entry.

use serde::{Deserialize, Serialize};

/// Where a member stands in the payment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Delayed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Delayed => "delayed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "delayed" => Some(PaymentStatus::Delayed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    OnSite,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::OnSite => "on_site",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(PaymentMethod::Online),
            "on_site" => Some(PaymentMethod::OnSite),
            _ => None,
        }
    }
}

/// Early-bird (tier1) or standard (tier2) online price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationTier {
    Tier1,
    Tier2,
}

impl RegistrationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationTier::Tier1 => "tier1",
            RegistrationTier::Tier2 => "tier2",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tier1" => Some(RegistrationTier::Tier1),
            "tier2" => Some(RegistrationTier::Tier2),
            _ => None,
        }
    }
}

/// Price category chosen at physical check-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnsiteTier {
    AssoMember,
    NonMember,
    Late,
    Organisation,
}

impl OnsiteTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnsiteTier::AssoMember => "asso_member",
            OnsiteTier::NonMember => "non_member",
            OnsiteTier::Late => "late",
            OnsiteTier::Organisation => "organisation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "asso_member" => Some(OnsiteTier::AssoMember),
            "non_member" => Some(OnsiteTier::NonMember),
            "late" => Some(OnsiteTier::Late),
            "organisation" => Some(OnsiteTier::Organisation),
            _ => None,
        }
    }
}

/// Append-only ledger entry written by every payment transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub id: String,
    pub member_id: String,
    pub checkout_id: Option<String>,
    pub event_type: String,
    pub amount: i64,
    pub tier: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// Request body naming a member (checkout initiation, delayed payment).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPaymentRequest {
    pub member_id: String,
}

/// Response to a successful checkout initiation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub member_id: String,
    pub checkout_id: String,
    pub redirect_url: String,
    pub amount: i64,
    pub tier: RegistrationTier,
}

/// Payment status as seen after a verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub member_id: String,
    pub checkout_id: String,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<i64>,
}

/// Acknowledgement returned to the gateway for every callback.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    pub received: bool,
}
