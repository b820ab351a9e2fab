//! Payment ledger and Paystack records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub user_subscription_id: Option<Uuid>,
    pub description: Option<String>,
    pub payment_method: String,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewPayment {
    pub order_id: Option<Uuid>,
    pub user_subscription_id: Option<Uuid>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: String,
    pub amount: Money,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdatePayment {
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    pub amount: Option<Money>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl UpdatePayment {
    pub fn apply_to(&self, payment: &mut Payment) {
        if let Some(v) = &self.description { payment.description = Some(v.clone()); }
        if let Some(v) = &self.payment_method { payment.payment_method = v.clone(); }
        if let Some(v) = self.amount { payment.amount = v; }
        if let Some(v) = self.paid_at { payment.paid_at = v; }
    }
}

/// `start_date`/`end_date` bound `paid_at`, both days inclusive.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub payment_method: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        let day = payment.paid_at.date_naive();
        self.payment_method.as_deref().map_or(true, |m| payment.payment_method == m)
            && self.start_date.map_or(true, |d| day >= d)
            && self.end_date.map_or(true, |d| day <= d)
    }
}

// =============================================================================
// Paystack
// =============================================================================

pub const PAYSTACK_PENDING: &str = "pending";
pub const PAYSTACK_SUCCESS: &str = "success";

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaystackPayment {
    pub id: Uuid,
    pub email: String,
    /// Kobo.
    pub amount: i64,
    pub reference: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaystackEvent {
    pub id: Uuid,
    pub event: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaystackPaymentFilter {
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaystackEventFilter {
    pub event: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let payment = Payment {
            id: Uuid::nil(), order_id: None, user_subscription_id: None, description: None,
            payment_method: "transfer".into(), amount: Money::new(Decimal::new(10, 0)),
            paid_at: Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap(), created_at: Utc::now(),
        };
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let filter = PaymentFilter { payment_method: Some("transfer".into()), start_date: Some(day), end_date: Some(day) };
        assert!(filter.matches(&payment));
        let other = PaymentFilter { payment_method: Some("card".into()), ..Default::default() };
        assert!(!other.matches(&payment));
    }
}
