//! Bloom Haven Commerce
//!
//! Order management backend for a flower and gift shop.
//!
//! ## Features
//! - Catalog: categories, products and stem-count price variants
//! - Atomic order placement with stock reservation
//! - Recurring subscriptions synthesized from order lines
//! - Subscription deliveries and payment ledger
//! - Paystack checkout (initialize, verify, signed webhooks)

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod orders;
pub mod pagination;
pub mod paystack;
pub mod store;

pub use config::Config;
pub use error::{Error, ErrorKind};
pub use orders::OrderCoordinator;

pub type Result<T> = std::result::Result<T, Error>;
