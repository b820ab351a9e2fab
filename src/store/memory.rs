//! In-memory store.
//!
//! All tables sit behind one async mutex. A transaction holds the lock for its whole
//! lifetime and works on a staged copy of the tables, so transactions are fully
//! serialized and an uncommitted transaction leaves no trace.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    CatalogStore, CategoryRepository, DashboardRepository, OrderRepository, OrderWriter, PaymentRepository,
    ProductRepository, Store, SubscriptionRepository, SubscriptionStore, Transaction, UserRepository,
};
use crate::domain::aggregates::product::contains_ci;
use crate::domain::aggregates::payment::PAYSTACK_PENDING;
use crate::domain::{
    Category, CategoryFilter, CategoryProductCount, Dashboard, Money, NewCategory, NewOrder, NewOrderItem, NewPayment,
    NewProduct, NewStem, NewSubscription, NewSubscriptionDelivery, NewUser, NewUserSubscription, Order, OrderFilter,
    OrderItem, Payment, PaymentFilter, PaystackEvent, PaystackEventFilter, PaystackPayment, PaystackPaymentFilter,
    Product, ProductFilter, ProductStem, Subscription, SubscriptionDelivery, SubscriptionFilter, UpdateCategory,
    UpdateOrder, UpdatePayment, UpdateProduct, UpdateSubscription, UpdateSubscriptionDelivery, UpdateUser,
    UpdateUserSubscription, User, UserFilter, UserSubscription, UserSubscriptionFilter, RECENT_ORDERS,
};
use crate::pagination::{Page, PageParams};
use crate::{Error, Result};

#[derive(Clone, Debug, Default)]
struct Tables {
    categories: Vec<Category>,
    products: Vec<Product>,
    stems: Vec<ProductStem>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    subscriptions: Vec<Subscription>,
    user_subscriptions: Vec<UserSubscription>,
    deliveries: Vec<SubscriptionDelivery>,
    payments: Vec<Payment>,
    paystack_payments: Vec<PaystackPayment>,
    paystack_events: Vec<PaystackEvent>,
    users: Vec<User>,
}

/// Newest first, matching `ORDER BY created_at DESC`.
fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, page: PageParams) -> Page<T> {
    Page::from_vec(rows.rev().collect(), page)
}

impl Tables {
    // ---- catalog ----

    fn category_mut(&mut self, id: Uuid) -> Result<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("category with id {id} not found")))
    }

    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product> {
        self.products
            .iter_mut()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("product with id {id} not found")))
    }

    fn product(&mut self, id: Uuid) -> Result<Product> {
        let mut product = self.product_mut(id)?.clone();
        product.stems = self.stems.iter().filter(|s| s.product_id == id).cloned().collect();
        Ok(product)
    }

    fn stem(&self, id: Uuid) -> Result<ProductStem> {
        self.stems
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("stem with id {id} not found")))
    }

    fn replace_stems(&mut self, product_id: Uuid, stems: &[NewStem]) {
        self.stems.retain(|s| s.product_id != product_id);
        for stem in stems {
            self.stems.push(ProductStem {
                id: Uuid::now_v7(),
                product_id,
                stem_count: stem.stem_count,
                price: stem.price,
                created_at: Utc::now(),
            });
        }
    }

    fn check_category(&mut self, category_id: Option<Uuid>) -> Result<()> {
        match category_id {
            Some(id) => self.category_mut(id).map(|_| ()),
            None => Ok(()),
        }
    }

    // ---- orders ----

    fn order(&self, id: Uuid) -> Result<Order> {
        let mut order = self
            .orders
            .iter()
            .find(|o| o.id == id && o.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| Error::not_found(format!("order with id {id} not found")))?;
        order.items = self.order_items.iter().filter(|i| i.order_id == id).cloned().collect();
        Ok(order)
    }

    fn insert_order(&mut self, order: NewOrder) -> Uuid {
        let id = Uuid::now_v7();
        self.orders.push(Order {
            id,
            user_name: order.user_name,
            user_phone_number: order.user_phone_number,
            payment_status: order.payment_status,
            status: order.status,
            delivery_date: order.delivery_date,
            time_slot: order.time_slot,
            shipping_address: order.shipping_address,
            total_amount: order.total_amount,
            by_admin: order.by_admin,
            deleted_at: None,
            created_at: Utc::now(),
            items: Vec::new(),
        });
        id
    }

    fn insert_order_item(&mut self, item: NewOrderItem) -> Result<Uuid> {
        if !self.orders.iter().any(|o| o.id == item.order_id) {
            return Err(Error::invalid_argument(format!("order with id {} does not exist", item.order_id)));
        }
        let quantity = i32::try_from(item.quantity.value())
            .map_err(|_| Error::invalid_argument("quantity out of range"))?;
        let id = Uuid::now_v7();
        self.order_items.push(OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            stem_id: item.stem_id,
            payment_method: item.payment_method,
            frequency: item.frequency,
            quantity,
            amount: item.amount,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    // ---- subscriptions ----

    fn check_products_exist(&mut self, product_ids: impl IntoIterator<Item = Uuid>) -> Result<()> {
        for id in product_ids {
            self.product_mut(id)?;
        }
        Ok(())
    }

    fn insert_subscription(&mut self, sub: NewSubscription) -> Subscription {
        let row = Subscription {
            id: Uuid::now_v7(),
            name: sub.name,
            description: sub.description,
            product_ids: sub.product_ids,
            add_ons: sub.add_ons,
            stem_ids: sub.stem_ids,
            price: sub.price,
            parent_order_id: sub.parent_order_id,
            by_admin: sub.by_admin,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.subscriptions.push(row.clone());
        row
    }

    fn subscription_mut(&mut self, id: Uuid) -> Result<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id == id && s.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("subscription with id {id} not found")))
    }

    fn insert_user_subscription(&mut self, enrollment: NewUserSubscription) -> Result<UserSubscription> {
        self.subscription_mut(enrollment.subscription_id)?;
        self.check_user(enrollment.user_id)?;
        let row = UserSubscription {
            id: Uuid::now_v7(),
            user_id: enrollment.user_id,
            subscription_id: enrollment.subscription_id,
            day_of_week: enrollment.day_of_week.value(),
            status: enrollment.status,
            start_date: enrollment.start_date,
            end_date: enrollment.end_date,
            frequency: enrollment.frequency,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.user_subscriptions.push(row.clone());
        Ok(row)
    }

    fn user_subscription_mut(&mut self, id: Uuid) -> Result<&mut UserSubscription> {
        self.user_subscriptions
            .iter_mut()
            .find(|s| s.id == id && s.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("user subscription with id {id} not found")))
    }

    fn delivery_mut(&mut self, id: Uuid) -> Result<&mut SubscriptionDelivery> {
        self.deliveries
            .iter_mut()
            .find(|d| d.id == id && d.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("subscription delivery with id {id} not found")))
    }

    // ---- users ----

    fn user_mut(&mut self, id: Uuid) -> Result<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("user with id {id} not found")))
    }

    fn check_user(&mut self, user_id: Option<Uuid>) -> Result<()> {
        match user_id {
            Some(id) => self.user_mut(id).map(|_| ()),
            None => Ok(()),
        }
    }

    // ---- payments ----

    fn payment_mut(&mut self, id: Uuid) -> Result<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found(format!("payment with id {id} not found")))
    }

    fn paystack_payment_mut(&mut self, reference: &str) -> Result<&mut PaystackPayment> {
        self.paystack_payments
            .iter_mut()
            .find(|p| p.reference == reference)
            .ok_or_else(|| Error::not_found(format!("paystack payment with reference {reference} not found")))
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    #[cfg(test)]
    commit_delay: Option<std::time::Duration>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Store whose transactions stall for `delay` before committing.
    #[cfg(test)]
    pub(crate) fn with_commit_delay(delay: std::time::Duration) -> Self {
        Self { commit_delay: Some(delay), ..Self::default() }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            #[cfg(test)]
            commit_delay: self.commit_delay,
        }))
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let mut tables = self.tables.lock().await;
        if tables.categories.iter().any(|c| c.deleted_at.is_none() && c.name == category.name) {
            return Err(Error::already_exists(format!("category {} already exists", category.name)));
        }
        let row = Category {
            id: Uuid::now_v7(),
            name: category.name,
            description: category.description,
            image_url: category.image_url,
            deleted_at: None,
            created_at: Utc::now(),
        };
        tables.categories.push(row.clone());
        Ok(row)
    }

    async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.tables.lock().await.category_mut(id).map(|c| c.clone())
    }

    async fn list_categories(&self, filter: &CategoryFilter, page: PageParams) -> Result<Page<Category>> {
        let tables = self.tables.lock().await;
        let rows = tables.categories.iter().filter(|c| c.deleted_at.is_none() && filter.matches(c)).cloned();
        Ok(newest_first(rows.collect::<Vec<_>>().into_iter(), page))
    }

    async fn update_category(&self, id: Uuid, update: UpdateCategory) -> Result<Category> {
        let mut tables = self.tables.lock().await;
        tables.category_mut(id)?;
        if let Some(name) = &update.name {
            if tables.categories.iter().any(|c| c.id != id && c.deleted_at.is_none() && &c.name == name) {
                return Err(Error::already_exists(format!("category {name} already exists")));
            }
        }
        let category = tables.category_mut(id)?;
        if let Some(v) = update.name { category.name = v; }
        if let Some(v) = update.description { category.description = v; }
        if let Some(v) = update.image_url { category.image_url = v; }
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.category_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let product = product.normalize()?;
        let mut tables = self.tables.lock().await;
        tables.check_category(product.category_id)?;
        let id = Uuid::now_v7();
        tables.products.push(Product {
            id,
            name: product.name,
            description: product.description,
            price: product.price,
            category_id: product.category_id,
            image_url: product.image_url,
            has_stems: product.has_stems,
            is_message_card: product.is_message_card,
            is_flowers: product.is_flowers,
            is_add_on: product.is_add_on,
            stock_quantity: product.stock_quantity,
            deleted_at: None,
            created_at: Utc::now(),
            stems: Vec::new(),
        });
        tables.replace_stems(id, &product.stems);
        tables.product(id)
    }

    async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.tables.lock().await.product(id)
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageParams) -> Result<Page<Product>> {
        let mut tables = self.tables.lock().await;
        let ids: Vec<Uuid> = tables
            .products
            .iter()
            .filter(|p| p.deleted_at.is_none() && filter.matches(p))
            .map(|p| p.id)
            .collect();
        let rows = ids.into_iter().map(|id| tables.product(id)).collect::<Result<Vec<_>>>()?;
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_product(&self, id: Uuid, update: UpdateProduct) -> Result<Product> {
        let update = update.normalize()?;
        let mut tables = self.tables.lock().await;
        tables.check_category(update.category_id)?;
        update.apply_to(tables.product_mut(id)?);
        if let Some(stems) = &update.stems {
            tables.replace_stems(id, stems);
        }
        tables.product(id)
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.product_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn list_product_order_items(&self, product_id: Uuid, page: PageParams) -> Result<Page<OrderItem>> {
        let mut tables = self.tables.lock().await;
        tables.product_mut(product_id)?;
        let live_orders: Vec<Uuid> = tables.orders.iter().filter(|o| o.deleted_at.is_none()).map(|o| o.id).collect();
        let rows: Vec<OrderItem> = tables
            .order_items
            .iter()
            .filter(|i| i.product_id == product_id && live_orders.contains(&i.order_id))
            .cloned()
            .collect();
        Ok(newest_first(rows.into_iter(), page))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.tables.lock().await.order(id)
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageParams) -> Result<Page<Order>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .orders
            .iter()
            .filter(|o| o.deleted_at.is_none())
            .filter(|o| {
                filter.search.as_deref().map_or(true, |q| contains_ci(&o.user_name, q) || contains_ci(&o.user_phone_number, q))
                    && filter.status.as_deref().map_or(true, |s| o.status == s)
                    && filter.payment_status.map_or(true, |p| o.payment_status == p)
            })
            .map(|o| tables.order(o.id))
            .collect::<Result<Vec<_>>>()?;
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_order(&self, id: Uuid, update: UpdateOrder) -> Result<Order> {
        let mut tables = self.tables.lock().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("order with id {id} not found")))?;
        if let Some(v) = update.user_name { order.user_name = v; }
        if let Some(v) = update.user_phone_number { order.user_phone_number = v; }
        if let Some(v) = update.payment_status { order.payment_status = v; }
        if let Some(v) = update.status { order.status = v; }
        if let Some(v) = update.shipping_address { order.shipping_address = Some(v); }
        tables.order(id)
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.deleted_at.is_none())
            .ok_or_else(|| Error::not_found(format!("order with id {id} not found")))?;
        order.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn create_subscription(&self, subscription: NewSubscription) -> Result<Subscription> {
        let mut tables = self.tables.lock().await;
        tables.check_products_exist(subscription.referenced_products())?;
        Ok(tables.insert_subscription(subscription))
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Subscription> {
        self.tables.lock().await.subscription_mut(id).map(|s| s.clone())
    }

    async fn list_subscriptions(&self, filter: &SubscriptionFilter, page: PageParams) -> Result<Page<Subscription>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Subscription> =
            tables.subscriptions.iter().filter(|s| s.deleted_at.is_none() && filter.matches(s)).cloned().collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_subscription(&self, id: Uuid, update: UpdateSubscription) -> Result<Subscription> {
        let mut tables = self.tables.lock().await;
        tables.check_products_exist(update.referenced_products())?;
        let sub = tables.subscription_mut(id)?;
        update.apply_to(sub);
        Ok(sub.clone())
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.subscription_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn create_user_subscription(&self, enrollment: NewUserSubscription) -> Result<UserSubscription> {
        self.tables.lock().await.insert_user_subscription(enrollment)
    }

    async fn get_user_subscription(&self, id: Uuid) -> Result<UserSubscription> {
        self.tables.lock().await.user_subscription_mut(id).map(|s| s.clone())
    }

    async fn list_user_subscriptions(&self, filter: &UserSubscriptionFilter, page: PageParams) -> Result<Page<UserSubscription>> {
        let tables = self.tables.lock().await;
        let rows: Vec<UserSubscription> =
            tables.user_subscriptions.iter().filter(|s| s.deleted_at.is_none() && filter.matches(s)).cloned().collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_user_subscription(&self, id: Uuid, update: UpdateUserSubscription) -> Result<UserSubscription> {
        let mut tables = self.tables.lock().await;
        tables.check_user(update.user_id)?;
        let sub = tables.user_subscription_mut(id)?;
        update.apply_to(sub);
        Ok(sub.clone())
    }

    async fn delete_user_subscription(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.user_subscription_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn create_delivery(&self, delivery: NewSubscriptionDelivery) -> Result<SubscriptionDelivery> {
        let mut tables = self.tables.lock().await;
        tables.user_subscription_mut(delivery.user_subscription_id)?;
        let now = Utc::now();
        let row = SubscriptionDelivery {
            id: Uuid::now_v7(),
            user_subscription_id: delivery.user_subscription_id,
            delivered_on: delivery.delivered_on.unwrap_or(now),
            description: delivery.description,
            deleted_at: None,
            created_at: now,
        };
        tables.deliveries.push(row.clone());
        Ok(row)
    }

    async fn list_deliveries(&self, user_subscription_id: Option<Uuid>, page: PageParams) -> Result<Page<SubscriptionDelivery>> {
        let tables = self.tables.lock().await;
        let rows: Vec<SubscriptionDelivery> = tables
            .deliveries
            .iter()
            .filter(|d| d.deleted_at.is_none())
            .filter(|d| user_subscription_id.map_or(true, |id| d.user_subscription_id == id))
            .cloned()
            .collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_delivery(&self, id: Uuid, update: UpdateSubscriptionDelivery) -> Result<SubscriptionDelivery> {
        let mut tables = self.tables.lock().await;
        let delivery = tables.delivery_mut(id)?;
        if let Some(v) = update.delivered_on { delivery.delivered_on = v; }
        if let Some(v) = update.description { delivery.description = Some(v); }
        Ok(delivery.clone())
    }

    async fn delete_delivery(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.delivery_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        let mut tables = self.tables.lock().await;
        if let Some(order_id) = payment.order_id {
            tables.order(order_id)?;
        }
        if let Some(sub_id) = payment.user_subscription_id {
            tables.user_subscription_mut(sub_id)?;
        }
        let now = Utc::now();
        let row = Payment {
            id: Uuid::now_v7(),
            order_id: payment.order_id,
            user_subscription_id: payment.user_subscription_id,
            description: payment.description,
            payment_method: payment.payment_method,
            amount: payment.amount,
            paid_at: payment.paid_at.unwrap_or(now),
            created_at: now,
        };
        tables.payments.push(row.clone());
        Ok(row)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Payment> {
        self.tables.lock().await.payment_mut(id).map(|p| p.clone())
    }

    async fn list_payments(&self, filter: &PaymentFilter, page: PageParams) -> Result<Page<Payment>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Payment> = tables.payments.iter().filter(|p| filter.matches(p)).cloned().collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_payment(&self, id: Uuid, update: UpdatePayment) -> Result<Payment> {
        let mut tables = self.tables.lock().await;
        let payment = tables.payment_mut(id)?;
        update.apply_to(payment);
        Ok(payment.clone())
    }

    async fn create_paystack_payment(&self, email: &str, amount: i64, reference: &str) -> Result<PaystackPayment> {
        let mut tables = self.tables.lock().await;
        if tables.paystack_payments.iter().any(|p| p.reference == reference) {
            return Err(Error::already_exists(format!("paystack payment with reference {reference} already exists")));
        }
        let now = Utc::now();
        let row = PaystackPayment {
            id: Uuid::now_v7(),
            email: email.to_string(),
            amount,
            reference: reference.to_string(),
            status: PAYSTACK_PENDING.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.paystack_payments.push(row.clone());
        Ok(row)
    }

    async fn get_paystack_payment(&self, reference: &str) -> Result<PaystackPayment> {
        self.tables.lock().await.paystack_payment_mut(reference).map(|p| p.clone())
    }

    async fn update_paystack_status(&self, reference: &str, status: &str) -> Result<PaystackPayment> {
        let mut tables = self.tables.lock().await;
        let payment = tables.paystack_payment_mut(reference)?;
        payment.status = status.to_string();
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn list_paystack_payments(&self, filter: &PaystackPaymentFilter, page: PageParams) -> Result<Page<PaystackPayment>> {
        let tables = self.tables.lock().await;
        let rows: Vec<PaystackPayment> = tables
            .paystack_payments
            .iter()
            .filter(|p| filter.status.as_deref().map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn log_paystack_event(&self, event: &str, data: serde_json::Value) -> Result<PaystackEvent> {
        let row = PaystackEvent { id: Uuid::now_v7(), event: event.to_string(), data, created_at: Utc::now() };
        self.tables.lock().await.paystack_events.push(row.clone());
        Ok(row)
    }

    async fn list_paystack_events(&self, filter: &PaystackEventFilter, page: PageParams) -> Result<Page<PaystackEvent>> {
        let tables = self.tables.lock().await;
        let rows: Vec<PaystackEvent> = tables
            .paystack_events
            .iter()
            .filter(|e| filter.event.as_deref().map_or(true, |name| e.event == name))
            .cloned()
            .collect();
        Ok(newest_first(rows.into_iter(), page))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(Error::already_exists(format!("user with email {} already exists", user.email)));
        }
        let row = User {
            id: Uuid::now_v7(),
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            address: user.address,
            is_admin: user.is_admin,
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
        };
        tables.users.push(row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: Uuid) -> Result<User> {
        self.tables.lock().await.user_mut(id).map(|u| u.clone())
    }

    async fn list_users(&self, filter: &UserFilter, page: PageParams) -> Result<Page<User>> {
        let tables = self.tables.lock().await;
        let rows: Vec<User> = tables.users.iter().filter(|u| u.deleted_at.is_none() && filter.matches(u)).cloned().collect();
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn update_user(&self, id: Uuid, update: UpdateUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(id)?;
        update.apply_to(user);
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.user_mut(id)?.deleted_at = Some(Utc::now());
        for enrollment in tables.user_subscriptions.iter_mut().filter(|s| s.user_id == Some(id)) {
            enrollment.user_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardRepository for MemoryStore {
    async fn dashboard(&self) -> Result<Dashboard> {
        let guard = self.tables.lock().await;
        let tables: &Tables = &guard;
        let live_orders: Vec<&Order> = tables.orders.iter().filter(|o| o.deleted_at.is_none()).collect();
        let live_products: Vec<&Product> = tables.products.iter().filter(|p| p.deleted_at.is_none()).collect();

        let recent_orders = live_orders
            .iter()
            .rev()
            .take(RECENT_ORDERS as usize)
            .map(|o| tables.order(o.id))
            .collect::<Result<Vec<_>>>()?;
        let categories = tables
            .categories
            .iter()
            .filter(|c| c.deleted_at.is_none())
            .map(|c| CategoryProductCount {
                id: c.id,
                name: c.name.clone(),
                product_count: live_products.iter().filter(|p| p.category_id == Some(c.id)).count() as i64,
            })
            .collect();

        Ok(Dashboard {
            total_revenue: live_orders.iter().filter(|o| o.payment_status).map(|o| o.total_amount).sum::<Money>(),
            total_products: live_products.len() as i64,
            total_orders: live_orders.len() as i64,
            active_subscriptions: tables
                .user_subscriptions
                .iter()
                .filter(|s| s.deleted_at.is_none() && s.status)
                .count() as i64,
            recent_orders,
            categories,
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    #[cfg(test)]
    commit_delay: Option<std::time::Duration>,
}

impl MemoryTransaction {
    #[cfg(test)]
    async fn pause_before_commit(&self) {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
    }

    #[cfg(not(test))]
    async fn pause_before_commit(&self) {}
}

#[async_trait]
impl CatalogStore for MemoryTransaction {
    async fn get_product(&mut self, id: Uuid) -> Result<Product> {
        self.staged.product(id)
    }

    async fn get_stem(&mut self, id: Uuid) -> Result<ProductStem> {
        self.staged.stem(id)
    }

    async fn update_stock(&mut self, product_id: Uuid, new_quantity: i32) -> Result<()> {
        if new_quantity < 0 {
            return Err(Error::invalid_argument("stock_quantity must not be negative"));
        }
        self.staged.product_mut(product_id)?.stock_quantity = new_quantity;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryTransaction {
    async fn create_subscription(&mut self, subscription: NewSubscription) -> Result<Uuid> {
        Ok(self.staged.insert_subscription(subscription).id)
    }

    async fn create_user_subscription(&mut self, enrollment: NewUserSubscription) -> Result<Uuid> {
        Ok(self.staged.insert_user_subscription(enrollment)?.id)
    }
}

#[async_trait]
impl OrderWriter for MemoryTransaction {
    async fn create_order(&mut self, order: NewOrder) -> Result<Uuid> {
        Ok(self.staged.insert_order(order))
    }

    async fn create_order_item(&mut self, item: NewOrderItem) -> Result<Uuid> {
        self.staged.insert_order_item(item)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.pause_before_commit().await;
        let MemoryTransaction { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn roses(stock: i32) -> NewProduct {
        NewProduct {
            name: "Roses".into(), description: "Red roses".into(), price: Money::new(Decimal::new(20, 0)),
            category_id: None, image_url: vec![], has_stems: false, is_message_card: false, is_flowers: true,
            is_add_on: false, stock_quantity: stock, stems: vec![],
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let product = store.create_product(roses(5)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(product.id, 1).await.unwrap();
        drop(tx);

        assert_eq!(ProductRepository::get_product(&store, product.id).await.unwrap().stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let product = store.create_product(roses(5)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(product.id, 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ProductRepository::get_product(&store, product.id).await.unwrap().stock_quantity, 2);
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_are_hidden() {
        let store = MemoryStore::new();
        let product = store.create_product(roses(5)).await.unwrap();
        store.delete_product(product.id).await.unwrap();

        let err = ProductRepository::get_product(&store, product.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        let page = store.list_products(&ProductFilter::default(), PageParams::default()).await.unwrap();
        assert!(page.data.is_empty());

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_product(product.id).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_requires_existing_products() {
        let store = MemoryStore::new();
        let sub = NewSubscription {
            name: "Weekly roses".into(),
            description: String::new(),
            product_ids: vec![Uuid::now_v7()],
            add_ons: vec![],
            stem_ids: vec![],
            price: Money::new(Decimal::new(10, 0)),
            parent_order_id: None,
            by_admin: true,
        };
        let err = SubscriptionRepository::create_subscription(&store, sub).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_category_rename_keeps_live_names_unique() {
        let store = MemoryStore::new();
        let new = |name: &str| NewCategory { name: name.into(), description: String::new(), image_url: vec![] };
        store.create_category(new("Bouquets")).await.unwrap();
        let vases = store.create_category(new("Vases")).await.unwrap();

        let rename = UpdateCategory { name: Some("Bouquets".into()), ..Default::default() };
        let err = store.update_category(vases.id, rename).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlreadyExists);
        assert_eq!(store.get_category(vases.id).await.unwrap().name, "Vases");

        let same = UpdateCategory { name: Some("Vases".into()), ..Default::default() };
        assert_eq!(store.update_category(vases.id, same).await.unwrap().name, "Vases");
    }

    #[tokio::test]
    async fn test_paystack_reference_is_unique() {
        let store = MemoryStore::new();
        store.create_paystack_payment("a@b.co", 5000, "ref-1").await.unwrap();
        let err = store.create_paystack_payment("a@b.co", 5000, "ref-1").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlreadyExists);
    }

    fn ada() -> NewUser {
        NewUser {
            name: "Ada Obi".into(),
            email: "ada@example.com".into(),
            phone_number: "08030000000".into(),
            address: None,
            is_admin: false,
        }
    }

    async fn template(store: &MemoryStore) -> Subscription {
        let product = store.create_product(roses(10)).await.unwrap();
        let sub = NewSubscription {
            name: "Weekly roses".into(),
            description: String::new(),
            product_ids: vec![product.id],
            add_ons: vec![],
            stem_ids: vec![],
            price: Money::new(Decimal::new(20, 0)),
            parent_order_id: None,
            by_admin: true,
        };
        SubscriptionRepository::create_subscription(store, sub).await.unwrap()
    }

    fn enrollment(subscription_id: Uuid, user_id: Option<Uuid>) -> NewUserSubscription {
        NewUserSubscription {
            user_id,
            ..NewUserSubscription::for_order_line(subscription_id, crate::domain::DayOfWeek::new(1).unwrap(), "weekly", Utc::now())
        }
    }

    #[tokio::test]
    async fn test_user_email_is_unique_among_live_users() {
        let store = MemoryStore::new();
        let first = store.create_user(ada()).await.unwrap();
        assert!(first.is_active);

        let shouting = NewUser { email: "ADA@example.com".into(), ..ada() };
        let err = store.create_user(shouting.clone()).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlreadyExists);

        store.delete_user(first.id).await.unwrap();
        assert!(store.create_user(shouting).await.is_ok());
    }

    #[tokio::test]
    async fn test_enrollment_user_must_exist_and_is_unlinked_on_delete() {
        let store = MemoryStore::new();
        let sub = template(&store).await;

        let err = SubscriptionRepository::create_user_subscription(&store, enrollment(sub.id, Some(Uuid::now_v7())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);

        let user = store.create_user(ada()).await.unwrap();
        let linked = SubscriptionRepository::create_user_subscription(&store, enrollment(sub.id, Some(user.id)))
            .await
            .unwrap();
        store.delete_user(user.id).await.unwrap();

        assert_eq!(store.get_user_subscription(linked.id).await.unwrap().user_id, None);
        assert_eq!(store.get_user(user.id).await.unwrap_err().kind(), crate::ErrorKind::NotFound);
    }

    async fn record_order(store: &MemoryStore, total: i64, paid: bool) -> Uuid {
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .create_order(NewOrder {
                user_name: "Ada".into(),
                user_phone_number: "0803".into(),
                payment_status: paid,
                status: "pending".into(),
                delivery_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                time_slot: "9am-12pm".into(),
                shipping_address: None,
                total_amount: Money::new(Decimal::new(total, 0)),
                by_admin: false,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_dashboard_counts_live_rows() {
        let store = MemoryStore::new();
        let bouquets = store
            .create_category(NewCategory { name: "Bouquets".into(), description: String::new(), image_url: vec![] })
            .await
            .unwrap();
        store.create_product(NewProduct { category_id: Some(bouquets.id), ..roses(3) }).await.unwrap();
        let gone = store.create_product(NewProduct { category_id: Some(bouquets.id), ..roses(3) }).await.unwrap();
        store.delete_product(gone.id).await.unwrap();

        let sub = template(&store).await;
        SubscriptionRepository::create_user_subscription(&store, enrollment(sub.id, None)).await.unwrap();
        let paused = SubscriptionRepository::create_user_subscription(&store, enrollment(sub.id, None)).await.unwrap();
        let pause = UpdateUserSubscription { status: Some(false), ..Default::default() };
        store.update_user_subscription(paused.id, pause).await.unwrap();

        let first = record_order(&store, 50, true).await;
        let second = record_order(&store, 20, false).await;
        let deleted = record_order(&store, 30, true).await;
        store.delete_order(deleted).await.unwrap();

        let dashboard = store.dashboard().await.unwrap();
        assert_eq!(dashboard.total_revenue, Money::new(Decimal::new(50, 0)));
        // one Bouquets rose plus the template's product
        assert_eq!(dashboard.total_products, 2);
        assert_eq!(dashboard.total_orders, 2);
        assert_eq!(dashboard.active_subscriptions, 1);
        let recent: Vec<Uuid> = dashboard.recent_orders.iter().map(|o| o.id).collect();
        assert_eq!(recent, vec![second, first]);
        assert_eq!(dashboard.categories.len(), 1);
        assert_eq!(dashboard.categories[0].name, "Bouquets");
        assert_eq!(dashboard.categories[0].product_count, 1);
    }
}
