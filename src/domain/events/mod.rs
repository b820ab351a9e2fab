//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, total: Money, item_count: usize, subscriptions: usize },
}

impl OrderEvent {
    pub fn placed(order: &Order) -> Self {
        OrderEvent::Placed {
            order_id: order.id,
            total: order.total_amount,
            item_count: order.items.len(),
            subscriptions: order.subscription_items().count(),
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            OrderEvent::Placed { .. } => "orders.placed",
        }
    }
}
