use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::extract::{PathParam, QueryParams, ValidatedJson};
use super::{data, message, AppState};
use crate::domain::{
    Money, NewPayment, Payment, PaymentFilter, PaystackEvent, PaystackEventFilter, PaystackPayment,
    PaystackPaymentFilter, UpdatePayment, PAYSTACK_SUCCESS,
};
use crate::pagination::{Page, PageParams};
use crate::paystack::{verify_signature, Checkout, SIGNATURE_HEADER};
use crate::store::PaymentRepository;
use crate::{Error, ErrorKind, Result};

const CHARGE_SUCCESS: &str = "charge.success";

// Ledger

pub async fn create_payment(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<NewPayment>) -> Result<Json<Value>> {
    Ok(data(s.store.create_payment(body).await?))
}

pub async fn get_payment(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_payment(id).await?))
}

pub async fn list_payments(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<PaymentFilter>,
) -> Result<Json<Page<Payment>>> {
    Ok(Json(s.store.list_payments(&filter, page).await?))
}

pub async fn update_payment(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdatePayment>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_payment(id, body).await?))
}

// Paystack

#[derive(Debug, Deserialize, Validate)]
pub struct InitializeBody {
    #[validate(email)]
    pub email: String,
    /// Naira; the gateway is charged in kobo.
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    #[serde(default)]
    data: Value,
}

pub async fn initialize_paystack(
    State(s): State<AppState>,
    ValidatedJson(body): ValidatedJson<InitializeBody>,
) -> Result<Json<Checkout>> {
    if body.amount <= Money::ZERO {
        return Err(Error::invalid_argument("amount must be greater than zero"));
    }
    let kobo = body
        .amount
        .to_minor_units()
        .ok_or_else(|| Error::invalid_argument("amount is too large"))?;

    let checkout = s.gateway.initialize_payment(&body.email, kobo).await?;
    s.store.create_paystack_payment(&body.email, kobo, &checkout.reference).await?;
    info!(reference = %checkout.reference, amount = kobo, "paystack payment initialized");
    Ok(Json(checkout))
}

/// Paystack's callback. The body is trusted only when its HMAC matches the signature header.
pub async fn paystack_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&s.paystack_secret, &body, signature) {
        warn!(bytes = body.len(), "rejected webhook with invalid signature");
        return Err(Error::unauthenticated("invalid signature"));
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| Error::invalid_argument(format!("invalid webhook body: {e}")))?;
    let reference = payload.data.get("reference").and_then(Value::as_str).map(str::to_string);

    s.store.log_paystack_event(&payload.event, payload.data).await?;

    if payload.event == CHARGE_SUCCESS {
        if let Some(reference) = reference {
            match s.store.update_paystack_status(&reference, PAYSTACK_SUCCESS).await {
                Ok(_) => info!(%reference, "paystack payment succeeded"),
                Err(e) if e.kind() == ErrorKind::NotFound => warn!(%reference, "charge for unknown reference"),
                Err(e) => return Err(e),
            }
        }
    }

    Ok(message("event logged and payment status updated"))
}

pub async fn verify_paystack(State(s): State<AppState>, PathParam(reference): PathParam<String>) -> Result<Json<Value>> {
    let payment = s.store.get_paystack_payment(&reference).await?;
    let status = s.gateway.verify_payment(&reference, payment.amount).await?;
    Ok(data(s.store.update_paystack_status(&reference, &status).await?))
}

pub async fn get_paystack_payment(
    State(s): State<AppState>,
    PathParam(reference): PathParam<String>,
) -> Result<Json<Value>> {
    Ok(data(s.store.get_paystack_payment(&reference).await?))
}

pub async fn list_paystack_payments(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<PaystackPaymentFilter>,
) -> Result<Json<Page<PaystackPayment>>> {
    Ok(Json(s.store.list_paystack_payments(&filter, page).await?))
}

pub async fn list_paystack_events(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<PaystackEventFilter>,
) -> Result<Json<Page<PaystackEvent>>> {
    Ok(Json(s.store.list_paystack_events(&filter, page).await?))
}
