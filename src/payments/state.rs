//! Payment lifecycle state machine.
//!
//! Online checkout, payment verification/callbacks and on-site collection all feed the
//! same `payment_status`. Every write goes through [`PaymentStatus::apply`]; a pair not
//! listed there is rejected.

use crate::errors::AppError;
use crate::models::{PaymentMethod, PaymentStatus};

/// Something that happened to a member's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// A gateway checkout was opened
    InitiateCheckout,
    /// The gateway reported the checkout as paid (verify or callback)
    ConfirmOnline,
    /// The member will pay at the venue
    MarkDelayed,
    /// Money (or an exemption) was taken at check-in
    CollectOnSite,
}

impl PaymentTransition {
    /// Ledger `event_type` written alongside the transition.
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentTransition::InitiateCheckout => "checkout_initiated",
            PaymentTransition::ConfirmOnline => "payment_confirmed",
            PaymentTransition::MarkDelayed => "payment_delayed",
            PaymentTransition::CollectOnSite => "payment_collected",
        }
    }

    /// Payment method recorded on the member after the transition.
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentTransition::InitiateCheckout | PaymentTransition::ConfirmOnline => {
                PaymentMethod::Online
            }
            PaymentTransition::MarkDelayed | PaymentTransition::CollectOnSite => {
                PaymentMethod::OnSite
            }
        }
    }
}

impl PaymentStatus {
    /// The single transition function: `(current, event) -> next`.
    pub fn apply(self, transition: PaymentTransition) -> Result<PaymentStatus, AppError> {
        use PaymentStatus::*;
        use PaymentTransition::*;

        match (self, transition) {
            (Unpaid, InitiateCheckout) => Ok(Pending),
            (Pending, ConfirmOnline) => Ok(Paid),
            (Unpaid, MarkDelayed) => Ok(Delayed),
            (Unpaid | Pending | Delayed, CollectOnSite) => Ok(Paid),
            (from, transition) => Err(AppError::Validation(format!(
                "Payment cannot go through '{}' while status is '{}'",
                transition.event_type(),
                from.as_str()
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}
