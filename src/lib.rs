pub mod adapters;
pub mod cli;
pub mod clients;
pub mod clock;
pub mod config;
pub mod contracts;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers::{bank::BankState, merchant::MerchantState, switch::SwitchState};
use crate::middleware::{request_logger_middleware, AdminKey};
use crate::services::{BankService, MerchantService, SwitchService};

pub fn create_switch_app(service: SwitchService, admin_key: AdminKey) -> Router {
    with_common_layers(handlers::switch::router(SwitchState { service, admin_key }))
}

pub fn create_bank_app(service: BankService, admin_key: AdminKey) -> Router {
    with_common_layers(handlers::bank::router(BankState { service, admin_key }))
}

pub fn create_merchant_app(service: MerchantService) -> Router {
    with_common_layers(handlers::merchant::router(MerchantState { service }))
}

fn with_common_layers(router: Router) -> Router {
    router
        .layer(axum::middleware::from_fn(request_logger_middleware))
        .layer(CorsLayer::permissive())
}
