//! Runtime configuration loaded from the environment (and `.env` when present).

use std::env;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Allowed CORS origin. `None` means permissive CORS.
    pub frontend_url: Option<String>,
    pub paystack_secret_key: String,
    pub paystack_callback_url: String,
    pub paystack_base_url: String,
    pub nats_url: Option<String>,
    pub order_tx_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required("DATABASE_URL")?,
            port: parsed("PORT", 8083)?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            frontend_url: optional("FRONTEND_URL"),
            paystack_secret_key: required("PAYSTACK_SECRET_KEY")?,
            paystack_callback_url: optional("PAYSTACK_CALLBACK_URL").unwrap_or_default(),
            paystack_base_url: optional("PAYSTACK_BASE_URL").unwrap_or_else(|| DEFAULT_PAYSTACK_BASE_URL.to_string()),
            nats_url: optional("NATS_URL"),
            order_tx_timeout: Duration::from_secs(parsed("ORDER_TX_TIMEOUT_SECS", 10)?),
        };

        tracing::info!(port = config.port, nats = config.nats_url.is_some(), "configuration loaded");
        Ok(config)
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| Error::invalid_argument(format!("missing environment variable {name}")))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::invalid_argument(format!("invalid {name} value {raw:?}: {e}"))),
        None => Ok(default),
    }
}
