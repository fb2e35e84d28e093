//! Online payment gateway client.
//!
//! Talks to a checkout-intent REST API over `reqwest`: an OAuth2 client-credentials
//! token is fetched per operation, then checkout intents are created or read back.
//! Callback payloads are parsed here too so every gateway wire shape lives in one place.

use serde_json::{json, Value};

use crate::config::PaymentConfig;
use crate::errors::AppError;

/// Payment states the gateway reports for settled money.
const PAID_STATES: &[&str] = &["authorized", "paid", "processed"];

/// What we ask the gateway to charge.
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    pub member_id: String,
    pub amount: i64,
    pub item_name: String,
    pub payer_first_name: String,
    pub payer_last_name: String,
    pub payer_email: String,
    pub return_url: String,
    pub back_url: String,
    pub error_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatedCheckout {
    pub checkout_id: String,
    pub redirect_url: String,
}

/// Settlement state of a checkout as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutState {
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
}

/// Lightweight client wrapping raw HTTP calls.
#[derive(Clone)]
pub struct PaymentGateway {
    config: PaymentConfig,
    client: reqwest::Client,
}

impl PaymentGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            config: config.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Fails with a configuration error when the client credential is absent.
    pub fn ensure_configured(&self) -> Result<(), AppError> {
        if self.config.has_credentials() {
            Ok(())
        } else {
            Err(AppError::Configuration(
                "Online payment is not configured: missing gateway client credentials"
                    .to_string(),
            ))
        }
    }

    async fn access_token(&self) -> Result<String, AppError> {
        self.ensure_configured()?;
        let client_id = self.config.client_id.as_deref().unwrap_or_default();
        let client_secret = self.config.client_secret.as_deref().unwrap_or_default();

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(AppError::PaymentGateway(format!(
                "Gateway authentication failed with status {}",
                status
            )));
        }

        body["access_token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::PaymentGateway("Gateway returned no access token".into()))
    }

    fn intents_url(&self) -> String {
        format!(
            "{}/organizations/{}/checkout-intents",
            self.config.api_url, self.config.organization_slug
        )
    }

    pub async fn create_checkout(&self, intent: &CheckoutIntent) -> Result<CreatedCheckout, AppError> {
        let token = self.access_token().await?;

        let payload = json!({
            "totalAmount": intent.amount,
            "initialAmount": intent.amount,
            "itemName": intent.item_name,
            "backUrl": intent.back_url,
            "errorUrl": intent.error_url,
            "returnUrl": intent.return_url,
            "containsDonation": false,
            "payer": {
                "firstName": intent.payer_first_name,
                "lastName": intent.payer_last_name,
                "email": intent.payer_email,
            },
            "metadata": { "memberId": intent.member_id },
        });

        let resp = self
            .client
            .post(self.intents_url())
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            let msg = body["message"].as_str().unwrap_or("Unknown gateway error");
            return Err(AppError::PaymentGateway(format!(
                "Checkout creation failed: {}",
                msg
            )));
        }

        let checkout_id = json_id(&body["id"])
            .ok_or_else(|| AppError::PaymentGateway("Gateway returned no checkout id".into()))?;
        let redirect_url = body["redirectUrl"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::PaymentGateway("Gateway returned no redirect URL".into()))?;

        Ok(CreatedCheckout {
            checkout_id,
            redirect_url,
        })
    }

    pub async fn checkout_state(&self, checkout_id: &str) -> Result<CheckoutState, AppError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .get(format!("{}/{}", self.intents_url(), checkout_id))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(AppError::PaymentGateway(format!(
                "Checkout lookup failed with status {}",
                status
            )));
        }

        Ok(order_state(&body["order"]))
    }
}

/// A gateway callback reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackNotice {
    pub checkout_id: String,
    pub state: CheckoutState,
}

/// Extract the checkout id and settlement state from a callback body.
///
/// Returns `None` when no checkout id can be found.
pub fn parse_callback(payload: &Value) -> Option<CallbackNotice> {
    let data = &payload["data"];
    let checkout_id = json_id(&data["checkoutIntentId"])
        .or_else(|| json_id(&payload["metadata"]["checkoutId"]))
        .or_else(|| json_id(&payload["checkoutId"]))?;

    let state = if data["payments"].is_array() {
        order_state(data)
    } else {
        let status = data["state"]
            .as_str()
            .or_else(|| payload["status"].as_str())
            .unwrap_or("");
        CheckoutState {
            paid: is_paid_state(status),
            transaction_id: json_id(&data["id"]),
            amount: data["amount"].as_i64(),
        }
    };

    Some(CallbackNotice { checkout_id, state })
}

/// An order is paid once any of its payments is in a settled state.
fn order_state(order: &Value) -> CheckoutState {
    let settled = order["payments"].as_array().and_then(|payments| {
        payments
            .iter()
            .find(|p| p["state"].as_str().map(is_paid_state).unwrap_or(false))
    });

    match settled {
        Some(payment) => CheckoutState {
            paid: true,
            transaction_id: json_id(&payment["id"]).or_else(|| json_id(&order["id"])),
            amount: payment["amount"].as_i64(),
        },
        None => CheckoutState {
            paid: false,
            transaction_id: None,
            amount: None,
        },
    }
}

fn is_paid_state(state: &str) -> bool {
    PAID_STATES.contains(&state.to_ascii_lowercase().as_str())
}

/// Gateway ids arrive as numbers or strings.
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_callback() {
        let payload = json!({
            "eventType": "Order",
            "data": {
                "checkoutIntentId": 4021,
                "id": 99,
                "payments": [{ "id": 7001, "state": "Authorized", "amount": 500 }]
            }
        });
        let notice = parse_callback(&payload).unwrap();
        assert_eq!(notice.checkout_id, "4021");
        assert!(notice.state.paid);
        assert_eq!(notice.state.transaction_id.as_deref(), Some("7001"));
        assert_eq!(notice.state.amount, Some(500));
    }

    #[test]
    fn test_parse_flat_paid_callback() {
        let payload = json!({ "checkoutId": "abc", "status": "PAID" });
        let notice = parse_callback(&payload).unwrap();
        assert_eq!(notice.checkout_id, "abc");
        assert!(notice.state.paid);
    }

    #[test]
    fn test_parse_refused_payment() {
        let payload = json!({
            "eventType": "Payment",
            "data": { "id": 12, "state": "Refused" },
            "metadata": { "checkoutId": "55" }
        });
        let notice = parse_callback(&payload).unwrap();
        assert_eq!(notice.checkout_id, "55");
        assert!(!notice.state.paid);
    }

    #[test]
    fn test_parse_callback_without_checkout_id() {
        assert!(parse_callback(&json!({ "eventType": "Form" })).is_none());
        assert!(parse_callback(&json!({ "checkoutId": "" })).is_none());
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let gateway = PaymentGateway::new(&PaymentConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            token_url: "http://127.0.0.1:9/token".to_string(),
            client_id: None,
            client_secret: Some("secret".to_string()),
            organization_slug: "club".to_string(),
        });
        assert!(matches!(
            gateway.ensure_configured(),
            Err(AppError::Configuration(_))
        ));
    }
}
