//! Paystack gateway client and webhook signature check.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tracing::instrument;

use crate::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub access_code: String,
    pub reference: String,
}

/// Outbound calls to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a transaction for `amount` kobo.
    async fn initialize_payment(&self, email: &str, amount: i64) -> Result<Checkout>;

    /// Returns the gateway's status for `reference` once the charged amount matches `amount` kobo.
    async fn verify_payment(&self, reference: &str, amount: i64) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
}

#[derive(Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    secret_key: String,
    callback_url: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(secret_key: impl Into<String>, callback_url: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            callback_url: callback_url.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    #[instrument(skip(self, email), err(Display))]
    async fn initialize_payment(&self, email: &str, amount: i64) -> Result<Checkout> {
        let body = serde_json::json!({
            "email": email,
            "amount": amount.to_string(),
            "callback_url": self.callback_url,
        });
        let envelope: Envelope<InitializeData> = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match envelope {
            Envelope { status: true, data: Some(data), .. } => {
                Ok(Checkout { access_code: data.access_code, reference: data.reference })
            }
            Envelope { message, .. } => Err(Error::internal(format!("failed to initialize payment: {message}"))),
        }
    }

    #[instrument(skip(self), err(Display))]
    async fn verify_payment(&self, reference: &str, amount: i64) -> Result<String> {
        let envelope: Envelope<VerifyData> = self
            .http
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?
            .json()
            .await?;

        let data = match envelope {
            Envelope { status: true, data: Some(data), .. } => data,
            Envelope { message, .. } => return Err(Error::not_found(format!("failed to verify payment: {message}"))),
        };
        if data.amount != amount {
            return Err(Error::invalid_argument(format!(
                "amount mismatch: expected {amount}, got {}",
                data.amount
            )));
        }
        Ok(data.status)
    }
}

/// Hex HMAC-SHA512 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature header against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk_test_secret";

    #[test]
    fn test_signed_body_verifies() {
        let body = br#"{"event":"charge.success","data":{"reference":"ref-1"}}"#;
        let signature = sign(SECRET, body);
        assert_eq!(signature.len(), 128);
        assert!(verify_signature(SECRET, body, &signature));
    }

    #[test]
    fn test_tampered_body_fails() {
        let body = br#"{"event":"charge.success","data":{"amount":5000}}"#;
        let signature = sign(SECRET, body);
        let tampered = br#"{"event":"charge.success","data":{"amount":9000}}"#;
        assert!(!verify_signature(SECRET, tampered, &signature));
    }

    #[test]
    fn test_wrong_secret_or_garbage_fails() {
        let body = b"{}";
        assert!(!verify_signature("other", body, &sign(SECRET, body)));
        assert!(!verify_signature(SECRET, body, "not-a-valid-hex-signature"));
        assert!(!verify_signature(SECRET, body, ""));
    }
}
