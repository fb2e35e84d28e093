//! Configuration module for the registration ledger.
//!
//! Deployment configuration is loaded from environment variables with sensible defaults.
//! Event settings (capacity, prices, deadlines) live in the database instead.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the admin API (unset disables admin authentication)
    pub admin_token: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// bcrypt work factor for team passwords
    pub bcrypt_cost: u32,
    /// Public URL of the registration site, used for payment return links
    pub public_url: String,
    /// School name written in the official export
    pub school_name: String,
    /// Payment gateway settings
    pub payment: PaymentConfig,
}

/// Online payment gateway settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Base URL of the gateway REST API
    pub api_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Organization slug the checkout intents are created under
    pub organization_slug: String,
}

impl PaymentConfig {
    /// Both halves of the client credential are present.
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let admin_token = non_empty_var("LEDGER_ADMIN_TOKEN");

        let db_path = env::var("LEDGER_DB_PATH")
            .unwrap_or_else(|_| "./data/ledger.sqlite".to_string())
            .into();

        let bind_addr = env::var("LEDGER_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid LEDGER_BIND_ADDR format");

        let log_level = env::var("LEDGER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bcrypt_cost = env::var("LEDGER_BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);

        let public_url = env::var("LEDGER_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let school_name = env::var("LEDGER_SCHOOL_NAME").unwrap_or_default();

        let payment = PaymentConfig {
            api_url: env::var("PAYMENT_API_URL")
                .unwrap_or_else(|_| "https://api.helloasso.com/v5".to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: env::var("PAYMENT_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.helloasso.com/oauth2/token".to_string()),
            client_id: non_empty_var("PAYMENT_CLIENT_ID"),
            client_secret: non_empty_var("PAYMENT_CLIENT_SECRET"),
            organization_slug: env::var("PAYMENT_ORGANIZATION_SLUG").unwrap_or_default(),
        };

        Self {
            admin_token,
            db_path,
            bind_addr,
            log_level,
            bcrypt_cost,
            public_url,
            school_name,
            payment,
        }
    }
}
