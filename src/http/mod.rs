//! REST API.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::orders::OrderCoordinator;
use crate::paystack::PaymentGateway;
use crate::store::Store;

mod catalog;
mod dashboard;
pub mod extract;
mod orders;
mod payments;
mod subscriptions;
mod users;

/// Shared handles, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orders: Arc<OrderCoordinator>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub paystack_secret: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, orders: OrderCoordinator, gateway: Arc<dyn PaymentGateway>, paystack_secret: &str) -> Self {
        Self { store, orders: Arc::new(orders), gateway, paystack_secret: Arc::from(paystack_secret) }
    }
}

pub(crate) fn data<T: Serialize>(value: T) -> Json<Value> {
    Json(json!({ "data": value }))
}

pub(crate) fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order).put(orders::update_order).delete(orders::delete_order))
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category).put(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:id",
            get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product),
        )
        .route("/products/:id/order-items", get(catalog::list_product_order_items))
        .route("/subscriptions", get(subscriptions::list_subscriptions).post(subscriptions::create_subscription))
        .route(
            "/subscriptions/:id",
            get(subscriptions::get_subscription)
                .put(subscriptions::update_subscription)
                .delete(subscriptions::delete_subscription),
        )
        .route(
            "/user-subscriptions",
            get(subscriptions::list_user_subscriptions).post(subscriptions::create_user_subscription),
        )
        .route(
            "/user-subscriptions/:id",
            get(subscriptions::get_user_subscription)
                .put(subscriptions::update_user_subscription)
                .delete(subscriptions::delete_user_subscription),
        )
        .route(
            "/subscription-deliveries",
            get(subscriptions::list_deliveries).post(subscriptions::create_delivery),
        )
        .route(
            "/subscription-deliveries/:id",
            get(subscriptions::list_deliveries_for)
                .put(subscriptions::update_delivery)
                .delete(subscriptions::delete_delivery),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user).put(users::update_user).delete(users::delete_user))
        .route("/users/:id/subscriptions", get(users::list_user_subscriptions_for))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/payments", get(payments::list_payments).post(payments::create_payment))
        .route("/payments/:id", get(payments::get_payment).put(payments::update_payment))
        .route("/paystack/initialize", post(payments::initialize_paystack))
        .route("/paystack/webhook", post(payments::paystack_webhook))
        .route("/paystack/verify/:reference", get(payments::verify_paystack))
        .route("/paystack/payments", get(payments::list_paystack_payments))
        .route("/paystack/payments/:reference", get(payments::get_paystack_payment))
        .route("/paystack/events", get(payments::list_paystack_events));

    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "bloom-haven"})) }))
        .nest("/api/v1", api)
        .with_state(state)
}
