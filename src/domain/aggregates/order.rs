//! Order Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{Money, PaymentMethod, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_name: String,
    pub user_phone_number: String,
    pub payment_status: bool,
    pub status: String,
    pub delivery_date: NaiveDate,
    pub time_slot: String,
    pub shipping_address: Option<String>,
    pub total_amount: Money,
    pub by_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub stem_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    pub frequency: Option<String>,
    pub quantity: i32,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Sum of the stored item amounts; equals `total_amount` for any order built by the coordinator.
    pub fn items_total(&self) -> Money { self.items.iter().map(|item| item.amount).sum() }
    pub fn subscription_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| item.payment_method == PaymentMethod::Subscription)
    }
}

// =============================================================================
// Write models
// =============================================================================

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_name: String,
    pub user_phone_number: String,
    pub payment_status: bool,
    pub status: String,
    pub delivery_date: NaiveDate,
    pub time_slot: String,
    pub shipping_address: Option<String>,
    pub total_amount: Money,
    pub by_admin: bool,
}

#[derive(Clone, Debug)]
pub struct NewOrderItem {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub stem_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub frequency: Option<String>,
    pub quantity: Quantity,
    pub amount: Money,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateOrder {
    #[validate(length(min = 1))]
    pub user_name: Option<String>,
    #[validate(length(min = 1))]
    pub user_phone_number: Option<String>,
    pub payment_status: Option<bool>,
    #[validate(length(min = 1))]
    pub status: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<bool>,
}

// =============================================================================
// Place-order command
// =============================================================================

/// A validated request to place an order. Built by the HTTP layer, consumed by the coordinator.
#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub user_name: String,
    pub user_phone_number: String,
    pub payment_status: bool,
    pub status: String,
    pub delivery_date: NaiveDate,
    pub time_slot: String,
    pub shipping_address: Option<String>,
    pub by_admin: bool,
    pub lines: Vec<LineRequest>,
}

#[derive(Clone, Debug)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub stem_id: Option<Uuid>,
    pub payment: LinePayment,
    pub quantity: Quantity,
    pub client_amount: Money,
}

/// A subscription line always carries its frequency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinePayment {
    Normal,
    Subscription { frequency: String },
}

impl LinePayment {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Normal => PaymentMethod::Normal,
            Self::Subscription { .. } => PaymentMethod::Subscription,
        }
    }

    pub fn frequency(&self) -> Option<&str> {
        match self {
            Self::Normal => None,
            Self::Subscription { frequency } => Some(frequency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(method: PaymentMethod, amount: i64) -> OrderItem {
        OrderItem {
            id: Uuid::now_v7(), order_id: Uuid::nil(), product_id: Uuid::now_v7(), stem_id: None,
            payment_method: method, frequency: None, quantity: 1,
            amount: Money::new(Decimal::new(amount, 0)), created_at: Utc::now(),
        }
    }

    #[test]
    fn test_items_total_and_subscription_filter() {
        let order = Order {
            id: Uuid::nil(), user_name: "Ada".into(), user_phone_number: "0800".into(), payment_status: false,
            status: "pending".into(), delivery_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            time_slot: "morning".into(), shipping_address: None, total_amount: Money::new(Decimal::new(30, 0)),
            by_admin: false, deleted_at: None, created_at: Utc::now(),
            items: vec![item(PaymentMethod::Normal, 10), item(PaymentMethod::Subscription, 20)],
        };
        assert_eq!(order.items_total(), order.total_amount);
        assert_eq!(order.subscription_items().count(), 1);
    }

    #[test]
    fn test_line_payment_frequency() {
        let line = LinePayment::Subscription { frequency: "weekly".into() };
        assert_eq!(line.method(), PaymentMethod::Subscription);
        assert_eq!(line.frequency(), Some("weekly"));
        assert_eq!(LinePayment::Normal.frequency(), None);
    }
}
