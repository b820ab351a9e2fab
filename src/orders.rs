//! Order placement.
//!
//! [`OrderCoordinator::place_order`] turns a [`PlaceOrder`] command into a persisted
//! order in a single transaction: every line is priced against the catalog, stock is
//! reserved, subscription lines get their own subscription template and enrollment,
//! and the order with its items is written. Any failure rolls the whole unit back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    DayOfWeek, LineRequest, Money, NewOrder, NewOrderItem, NewSubscription, NewUserSubscription, Order, OrderEvent,
    PlaceOrder,
};
use crate::store::{CatalogStore, OrderRepository, OrderWriter, Store, SubscriptionStore, Transaction};
use crate::{Error, Result};

/// A line after pricing, kept in request order.
#[derive(Debug)]
struct PricedLine {
    line: LineRequest,
    amount: Money,
    subscription: Option<NewSubscription>,
}

pub struct OrderCoordinator {
    store: Arc<dyn Store>,
    events: Option<async_nats::Client>,
    timeout: Duration,
}

impl OrderCoordinator {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, events: None, timeout }
    }

    /// Publishes `orders.placed` after each successful commit.
    pub fn with_events(mut self, client: async_nats::Client) -> Self {
        self.events = Some(client);
        self
    }

    #[instrument(skip(self, request), fields(customer = %request.user_name, lines = request.lines.len()), err(Display))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        check_request(&request)?;

        // The deadline covers the reads and writes; once staged, the commit runs to completion.
        let (tx, order_id) = match tokio::time::timeout(self.timeout, self.stage(request)).await {
            Ok(staged) => staged?,
            Err(_) => {
                error!(timeout = ?self.timeout, "order transaction timed out, rolled back");
                return Err(Error::internal("order transaction timed out"));
            }
        };
        tx.commit().await?;

        let order = self.store.get_order(order_id).await?;
        info!(order_id = %order.id, total = %order.total_amount, items = order.items.len(), "order placed");
        self.publish(&order).await;
        Ok(order)
    }

    /// Opens a transaction and performs every write of the order, leaving it uncommitted.
    async fn stage(&self, request: PlaceOrder) -> Result<(Box<dyn Transaction>, Uuid)> {
        let mut tx = self.store.begin().await?;
        match place_within(tx.as_mut(), request).await {
            Ok(order_id) => Ok((tx, order_id)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn publish(&self, order: &Order) {
        let Some(client) = &self.events else { return };
        let event = OrderEvent::placed(order);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "could not encode order event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            warn!(order_id = %order.id, error = %e, "could not publish order event");
        }
    }
}

/// Request-shape rules checked before any store access.
fn check_request(request: &PlaceOrder) -> Result<()> {
    if request.user_phone_number.trim().is_empty() {
        return Err(Error::invalid_argument("user_phone_number is required"));
    }
    if request.lines.is_empty() {
        return Err(Error::invalid_argument("an order needs at least one item"));
    }
    for (position, line) in request.lines.iter().enumerate() {
        if line.payment.frequency().is_some_and(|f| f.trim().is_empty()) {
            return Err(Error::invalid_argument(format!("item {position}: frequency is required for subscription items")));
        }
    }
    Ok(())
}

async fn place_within(tx: &mut dyn Transaction, request: PlaceOrder) -> Result<Uuid> {
    let PlaceOrder {
        user_name,
        user_phone_number,
        payment_status,
        status,
        delivery_date,
        time_slot,
        shipping_address,
        by_admin,
        lines,
    } = request;

    let now = Utc::now();
    let mut priced: Vec<PricedLine> = Vec::with_capacity(lines.len());
    for (position, line) in lines.into_iter().enumerate() {
        let product = tx.get_product(line.product_id).await?;

        let unit_price = match line.stem_id {
            Some(stem_id) => match product.stem(stem_id) {
                Some(stem) => stem.price,
                None => {
                    // NotFound when the stem does not exist at all.
                    tx.get_stem(stem_id).await?;
                    return Err(Error::invalid_argument(format!(
                        "item {position}: stem {stem_id} does not belong to product {}",
                        product.id
                    )));
                }
            },
            None => product.price,
        };

        let remaining = line.quantity.deduct_from(product.stock_quantity).ok_or_else(|| {
            warn!(product_id = %product.id, stock = product.stock_quantity, requested = line.quantity.value(), "insufficient stock");
            Error::invalid_argument(format!(
                "insufficient stock for product {}: {} available, {} requested",
                product.name,
                product.stock_quantity,
                line.quantity.value()
            ))
        })?;

        let amount = unit_price.times(line.quantity).to_currency_precision();
        if !amount.matches(&line.client_amount) {
            warn!(product_id = %product.id, expected = %amount, got = %line.client_amount, "amount mismatch");
            return Err(Error::invalid_argument(format!(
                "item {position}: amount mismatch, expected {amount}, got {}",
                line.client_amount
            )));
        }

        tx.update_stock(product.id, remaining).await?;

        let subscription = line
            .payment
            .frequency()
            .map(|_| NewSubscription::for_order_line(&user_name, &product, line.stem_id, line.quantity, amount, now));
        priced.push(PricedLine { line, amount, subscription });
    }

    let total_amount: Money = priced.iter().map(|p| p.amount).sum();
    let order_id = tx
        .create_order(NewOrder {
            user_name,
            user_phone_number,
            payment_status,
            status,
            delivery_date,
            time_slot,
            shipping_address,
            total_amount,
            by_admin,
        })
        .await?;

    let day_of_week = DayOfWeek::from_date(delivery_date);
    for p in priced.iter_mut() {
        let (Some(mut template), Some(frequency)) = (p.subscription.take(), p.line.payment.frequency()) else {
            continue;
        };
        template.parent_order_id = Some(order_id);
        let subscription_id = tx.create_subscription(template).await?;
        tx.create_user_subscription(NewUserSubscription::for_order_line(subscription_id, day_of_week, frequency, now))
            .await?;
    }

    for p in priced {
        tx.create_order_item(NewOrderItem {
            order_id,
            product_id: p.line.product_id,
            stem_id: p.line.stem_id,
            payment_method: p.line.payment.method(),
            frequency: p.line.payment.frequency().map(str::to_string),
            quantity: p.line.quantity,
            amount: p.amount,
        })
        .await?;
    }

    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinePayment, NewProduct, Quantity};
    use crate::store::{MemoryStore, ProductRepository};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn request(lines: Vec<LineRequest>) -> PlaceOrder {
        PlaceOrder {
            user_name: "Ada".into(),
            user_phone_number: "0803".into(),
            payment_status: false,
            status: "pending".into(),
            delivery_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            time_slot: "morning".into(),
            shipping_address: None,
            by_admin: false,
            lines,
        }
    }

    fn line(payment: LinePayment) -> LineRequest {
        LineRequest {
            product_id: Uuid::now_v7(),
            stem_id: None,
            payment,
            quantity: Quantity::new(1).unwrap(),
            client_amount: Money::new(Decimal::new(10, 0)),
        }
    }

    #[test]
    fn test_check_request_rules() {
        assert!(check_request(&request(vec![line(LinePayment::Normal)])).is_ok());
        assert!(check_request(&request(vec![])).is_err());

        let mut no_phone = request(vec![line(LinePayment::Normal)]);
        no_phone.user_phone_number = "  ".into();
        assert!(check_request(&no_phone).is_err());

        let blank = line(LinePayment::Subscription { frequency: " ".into() });
        assert!(check_request(&request(vec![blank])).is_err());
    }

    #[tokio::test]
    async fn test_commit_outlasting_the_deadline_still_lands() {
        let store = Arc::new(MemoryStore::with_commit_delay(Duration::from_millis(300)));
        let product: NewProduct =
            serde_json::from_value(serde_json::json!({ "name": "Tulips", "price": 10, "stock_quantity": 4 })).unwrap();
        let product = store.create_product(product).await.unwrap();
        let coordinator = OrderCoordinator::new(store.clone(), Duration::from_millis(100));

        let mut wanted = line(LinePayment::Normal);
        wanted.product_id = product.id;
        let order = coordinator.place_order(request(vec![wanted])).await.unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(ProductRepository::get_product(store.as_ref(), product.id).await.unwrap().stock_quantity, 3);
    }
}
