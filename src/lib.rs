pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::gateway::PaystackClient;
use crate::services::notifier::Notifier;
use crate::services::reconciler::Reconciler;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub gateway: PaystackClient,
    pub notifier: Notifier,
    pub reconciler: Reconciler,
}

pub fn create_app(state: AppState) -> Router {
    let cors = match state.config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments/initialize", post(handlers::payments::initialize_payment))
        .route("/webhooks/paystack", post(handlers::webhook::paystack_webhook))
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route("/transactions/:reference", get(handlers::transactions::get_transaction))
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}
