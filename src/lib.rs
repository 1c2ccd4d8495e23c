pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod health;
pub mod ports;
pub mod services;
pub mod startup;
pub mod use_cases;
pub mod utils;
pub mod workflow;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::health::HealthChecks;
use crate::startup::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub health: HealthChecks,
    /// Mercado Pago webhook signatures are only verified when this is set.
    pub webhook_secret: Option<String>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route("/webhooks/mercado-pago", post(handlers::webhook::mercado_pago))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
