//! Member model and the registration request shapes.

use serde::{Deserialize, Serialize};

use super::{OnsiteTier, PaymentMethod, PaymentStatus, RegistrationTier};
use crate::errors::AppError;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_BAC_LEVEL: i64 = 8;

/// A registered participant (or staff member of the Organisation team).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub team_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bac_level: i64,
    pub is_leader: bool,
    pub food_diet: Option<String>,
    pub checked_in: bool,
    pub checked_in_at: Option<String>,
    pub pizza_received: bool,
    pub pizza_received_at: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub checkout_id: Option<String>,
    pub transaction_id: Option<String>,
    pub registration_tier: Option<RegistrationTier>,
    pub payment_amount: Option<i64>,
    pub payment_tier: Option<OnsiteTier>,
    pub payment_confirmed_at: Option<String>,
    pub created_at: String,
}

/// Person data submitted at registration or by an admin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bac_level: i64,
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default)]
    pub food_diet: Option<String>,
}

/// Registration request: create a new team or join an existing one.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RegistrationRequest {
    #[serde(rename_all = "camelCase")]
    Create {
        team_name: String,
        #[serde(default)]
        team_description: Option<String>,
        team_password: String,
        members: Vec<NewMember>,
    },
    #[serde(rename_all = "camelCase")]
    Join {
        team_id: String,
        team_password: String,
        members: Vec<NewMember>,
    },
}

impl RegistrationRequest {
    pub fn members(&self) -> &[NewMember] {
        match self {
            RegistrationRequest::Create { members, .. } => members,
            RegistrationRequest::Join { members, .. } => members,
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub team: super::RegisteredTeam,
    pub members: Vec<Member>,
}

/// Request body for creating a member from the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub team_id: String,
    #[serde(flatten)]
    pub member: NewMember,
}

/// Request body for updating a member from the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bac_level: Option<i64>,
    #[serde(default)]
    pub is_leader: Option<bool>,
    #[serde(default)]
    pub food_diet: Option<String>,
}

/// Options for recording a check-in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    #[serde(default)]
    pub payment_tier: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<i64>,
    #[serde(default)]
    pub skip_payment: bool,
}

/// One entry of a batch check-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckInItem {
    pub member_id: String,
    #[serde(flatten)]
    pub options: CheckInRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCheckInRequest {
    pub items: Vec<BatchCheckInItem>,
}

/// Member ids for batch check-out and pizza operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMembersRequest {
    pub member_ids: Vec<String>,
}

impl NewMember {
    /// Structural checks. Returns a copy with surrounding whitespace trimmed.
    pub fn validated(&self) -> Result<NewMember, AppError> {
        let first_name = required_name(&self.first_name, "First name")?;
        let last_name = required_name(&self.last_name, "Last name")?;
        let email = self.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(AppError::Validation(format!(
                "Invalid email address for {} {}",
                first_name, last_name
            )));
        }
        validate_bac_level(self.bac_level)?;

        Ok(NewMember {
            first_name,
            last_name,
            email,
            bac_level: self.bac_level,
            is_leader: self.is_leader,
            food_diet: self
                .food_diet
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        })
    }
}

pub fn required_name(value: &str, label: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            label, MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_bac_level(level: i64) -> Result<(), AppError> {
    if (0..=MAX_BAC_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Bac level must be between 0 and {}",
            MAX_BAC_LEVEL
        )))
    }
}

/// One `@`, a non-empty local part and a dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
