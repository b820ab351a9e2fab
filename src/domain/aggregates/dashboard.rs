//! Admin dashboard read model

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::value_objects::Money;

/// Orders shown under `recent_orders`.
pub const RECENT_ORDERS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dashboard {
    /// Sum of `total_amount` over live, paid orders.
    pub total_revenue: Money,
    pub total_products: i64,
    pub total_orders: i64,
    /// Live enrollments whose status is on.
    pub active_subscriptions: i64,
    pub recent_orders: Vec<Order>,
    pub categories: Vec<CategoryProductCount>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct CategoryProductCount {
    pub id: Uuid,
    pub name: String,
    pub product_count: i64,
}
