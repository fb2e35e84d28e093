//! Event Registration Ledger
//!
//! REST backend for capacity-limited team registration, payment tracking, on-site
//! attendance and yearly archives, persisted in SQLite.

mod api;
mod archive;
mod auth;
mod capacity;
mod config;
mod db;
mod errors;
mod export;
mod models;
mod payments;
mod pricing;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use payments::PaymentGateway;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub gateway: Arc<PaymentGateway>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Event Registration Ledger");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.admin_token.is_none() {
        tracing::warn!("No admin token configured (LEDGER_ADMIN_TOKEN). Admin routes are open!");
    }
    if !config.payment.has_credentials() {
        tracing::warn!("Payment gateway credentials missing, online checkout will be refused");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool, config.bcrypt_cost));
    let gateway = Arc::new(PaymentGateway::new(&config.payment));

    let state = AppState {
        repo,
        gateway,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_token = state.config.admin_token.clone();

    let public_routes = Router::new()
        .route("/register", post(api::register))
        .route("/teams", get(api::list_teams))
        .route("/teams/{id}", get(api::get_team))
        .route("/teams/{id}/members", post(api::team_members))
        .route("/stats", get(api::get_stats))
        .route("/pricing", get(api::get_pricing))
        .route("/payments/checkout", post(api::initiate_checkout))
        .route("/payments/verify/{checkout_id}", get(api::verify_payment))
        .route("/payments/callback", post(api::payment_callback))
        .route("/payments/delayed", post(api::mark_delayed));

    let admin_routes = Router::new()
        // Teams
        .route("/teams", post(api::create_team))
        .route("/teams/{id}", put(api::update_team).delete(api::delete_team))
        .route("/teams/{id}/room", put(api::set_team_room))
        // Members
        .route("/members", get(api::list_members).post(api::create_member))
        .route(
            "/members/{id}",
            put(api::update_member).delete(api::delete_member),
        )
        // Attendance
        .route("/members/{id}/check-in", post(api::check_in))
        .route("/members/{id}/check-out", post(api::check_out))
        .route("/members/{id}/pizza", post(api::give_pizza))
        .route("/members/{id}/pizza/revoke", post(api::revoke_pizza))
        .route("/members/batch/check-in", post(api::batch_check_in))
        .route("/members/batch/check-out", post(api::batch_check_out))
        .route("/members/batch/pizza", post(api::batch_give_pizza))
        .route("/members/batch/pizza/revoke", post(api::batch_revoke_pizza))
        // Settings, ledger and exports
        .route("/settings", get(api::get_settings).put(api::update_settings))
        .route("/payments/events", get(api::list_payment_events))
        .route("/export/standard", get(api::export_standard))
        .route("/export/official", get(api::export_official))
        // Archives and reset
        .route("/archives", get(api::list_archives).post(api::create_archive))
        .route("/archives/check-expiration", post(api::check_expiration))
        .route("/archives/{year}", get(api::get_archive))
        .route("/archives/{year}/export", get(api::export_archive))
        .route("/reset/check", get(api::reset_check))
        .route("/reset", post(api::reset))
        // Apply admin auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_auth_layer(admin_token.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
