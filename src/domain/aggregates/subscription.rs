//! Subscriptions, user enrollments and their deliveries

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::{contains_ci, Product};
use crate::domain::value_objects::{DayOfWeek, Money, Quantity};

/// Length of an enrollment created from an order line.
pub const ORDER_SUBSCRIPTION_MONTHS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub product_ids: Vec<Uuid>,
    pub add_ons: Vec<Uuid>,
    pub stem_ids: Vec<Uuid>,
    pub price: Money,
    pub parent_order_id: Option<Uuid>,
    pub by_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub subscription_id: Uuid,
    pub day_of_week: i16,
    pub status: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct SubscriptionDelivery {
    pub id: Uuid,
    pub user_subscription_id: Uuid,
    pub delivered_on: DateTime<Utc>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Write models
// =============================================================================

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewSubscription {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1))]
    pub product_ids: Vec<Uuid>,
    #[serde(default)]
    pub add_ons: Vec<Uuid>,
    #[serde(default)]
    pub stem_ids: Vec<Uuid>,
    pub price: Money,
    #[serde(skip)]
    pub parent_order_id: Option<Uuid>,
    #[serde(default)]
    pub by_admin: bool,
}

impl NewSubscription {
    /// The template recorded for a subscription line of an order.
    pub fn for_order_line(
        customer: &str,
        product: &Product,
        stem_id: Option<Uuid>,
        quantity: Quantity,
        price: Money,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: customer.to_string(),
            description: format!(
                "Subscription made by {customer} for product {} of quantity {} on {}",
                product.name,
                quantity.value(),
                placed_at.format("%Y-%m-%d %H:%M:%S"),
            ),
            product_ids: vec![product.id],
            add_ons: Vec::new(),
            stem_ids: stem_id.into_iter().collect(),
            price,
            parent_order_id: None,
            by_admin: false,
        }
    }

    /// Every product id the template points at, add-ons included.
    pub fn referenced_products(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.product_ids.iter().chain(self.add_ons.iter()).copied()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateSubscription {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub product_ids: Option<Vec<Uuid>>,
    pub add_ons: Option<Vec<Uuid>>,
    pub stem_ids: Option<Vec<Uuid>>,
    pub price: Option<Money>,
}

impl UpdateSubscription {
    pub fn referenced_products(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.product_ids.iter().flatten().chain(self.add_ons.iter().flatten()).copied()
    }

    pub fn apply_to(&self, sub: &mut Subscription) {
        if let Some(v) = &self.name { sub.name = v.clone(); }
        if let Some(v) = &self.description { sub.description = v.clone(); }
        if let Some(v) = &self.product_ids { sub.product_ids = v.clone(); }
        if let Some(v) = &self.add_ons { sub.add_ons = v.clone(); }
        if let Some(v) = &self.stem_ids { sub.stem_ids = v.clone(); }
        if let Some(v) = self.price { sub.price = v; }
    }
}

#[derive(Clone, Debug)]
pub struct NewUserSubscription {
    pub user_id: Option<Uuid>,
    pub subscription_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub status: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub frequency: String,
}

impl NewUserSubscription {
    /// An unassigned, active enrollment running three months from `now`.
    pub fn for_order_line(subscription_id: Uuid, day_of_week: DayOfWeek, frequency: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: None,
            subscription_id,
            day_of_week,
            status: true,
            start_date: now,
            end_date: now
                .checked_add_months(Months::new(ORDER_SUBSCRIPTION_MONTHS))
                .unwrap_or(now),
            frequency: frequency.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateUserSubscription {
    pub user_id: Option<Uuid>,
    #[validate(range(min = 0, max = 6))]
    pub day_of_week: Option<i16>,
    pub status: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub frequency: Option<String>,
}

impl UpdateUserSubscription {
    pub fn apply_to(&self, sub: &mut UserSubscription) {
        if let Some(v) = self.user_id { sub.user_id = Some(v); }
        if let Some(v) = self.day_of_week { sub.day_of_week = v; }
        if let Some(v) = self.status { sub.status = v; }
        if let Some(v) = self.start_date { sub.start_date = v; }
        if let Some(v) = self.end_date { sub.end_date = v; }
        if let Some(v) = &self.frequency { sub.frequency = v.clone(); }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSubscriptionDelivery {
    pub user_subscription_id: Uuid,
    pub delivered_on: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateSubscriptionDelivery {
    pub delivered_on: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

// =============================================================================
// Filters
// =============================================================================

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub search: Option<String>,
    pub price_from: Option<Money>,
    pub price_to: Option<Money>,
}

impl SubscriptionFilter {
    pub fn matches(&self, sub: &Subscription) -> bool {
        self.search.as_deref().map_or(true, |q| contains_ci(&sub.name, q) || contains_ci(&sub.description, q))
            && self.price_from.map_or(true, |p| sub.price >= p)
            && self.price_to.map_or(true, |p| sub.price <= p)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserSubscriptionFilter {
    pub status: Option<bool>,
    pub user_id: Option<Uuid>,
}

impl UserSubscriptionFilter {
    pub fn matches(&self, sub: &UserSubscription) -> bool {
        self.status.map_or(true, |s| sub.status == s) && self.user_id.map_or(true, |u| sub.user_id == Some(u))
    }
}
