//! Persistence seams.
//!
//! The order coordinator talks to a [`Transaction`], which bundles the catalog,
//! subscription and order-writing capabilities behind one atomic session. The
//! HTTP layer talks to the pool-level repository traits. [`PgStore`] backs
//! production; [`MemoryStore`] backs tests and local demos.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Category, CategoryFilter, Dashboard, NewCategory, NewOrder, NewOrderItem, NewPayment, NewProduct, NewSubscription,
    NewSubscriptionDelivery, NewUser, NewUserSubscription, Order, OrderFilter, OrderItem, Payment, PaymentFilter,
    PaystackEvent, PaystackEventFilter, PaystackPayment, PaystackPaymentFilter, Product, ProductFilter, ProductStem,
    Subscription, SubscriptionDelivery, SubscriptionFilter, UpdateCategory, UpdateOrder, UpdatePayment, UpdateProduct,
    UpdateSubscription, UpdateSubscriptionDelivery, UpdateUser, UpdateUserSubscription, User, UserFilter,
    UserSubscription, UserSubscriptionFilter,
};
use crate::pagination::{Page, PageParams};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// =============================================================================
// Transactional session
// =============================================================================

#[async_trait]
pub trait CatalogStore: Send {
    /// Fetches a live product with its stems and holds its row for the rest of the session.
    async fn get_product(&mut self, id: Uuid) -> Result<Product>;
    async fn get_stem(&mut self, id: Uuid) -> Result<ProductStem>;
    async fn update_stock(&mut self, product_id: Uuid, new_quantity: i32) -> Result<()>;
}

#[async_trait]
pub trait SubscriptionStore: Send {
    async fn create_subscription(&mut self, subscription: NewSubscription) -> Result<Uuid>;
    async fn create_user_subscription(&mut self, enrollment: NewUserSubscription) -> Result<Uuid>;
}

#[async_trait]
pub trait OrderWriter: Send {
    async fn create_order(&mut self, order: NewOrder) -> Result<Uuid>;
    async fn create_order_item(&mut self, item: NewOrderItem) -> Result<Uuid>;
}

/// Dropping a transaction without committing discards every write made through it.
#[async_trait]
pub trait Transaction: CatalogStore + SubscriptionStore + OrderWriter {
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// Repositories
// =============================================================================

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create_category(&self, category: NewCategory) -> Result<Category>;
    async fn get_category(&self, id: Uuid) -> Result<Category>;
    async fn list_categories(&self, filter: &CategoryFilter, page: PageParams) -> Result<Page<Category>>;
    async fn update_category(&self, id: Uuid, update: UpdateCategory) -> Result<Category>;
    async fn delete_category(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create_product(&self, product: NewProduct) -> Result<Product>;
    async fn get_product(&self, id: Uuid) -> Result<Product>;
    async fn list_products(&self, filter: &ProductFilter, page: PageParams) -> Result<Page<Product>>;
    async fn update_product(&self, id: Uuid, update: UpdateProduct) -> Result<Product>;
    async fn delete_product(&self, id: Uuid) -> Result<()>;
    async fn list_product_order_items(&self, product_id: Uuid, page: PageParams) -> Result<Page<OrderItem>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Order>;
    async fn list_orders(&self, filter: &OrderFilter, page: PageParams) -> Result<Page<Order>>;
    async fn update_order(&self, id: Uuid, update: UpdateOrder) -> Result<Order>;
    async fn delete_order(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create_subscription(&self, subscription: NewSubscription) -> Result<Subscription>;
    async fn get_subscription(&self, id: Uuid) -> Result<Subscription>;
    async fn list_subscriptions(&self, filter: &SubscriptionFilter, page: PageParams) -> Result<Page<Subscription>>;
    async fn update_subscription(&self, id: Uuid, update: UpdateSubscription) -> Result<Subscription>;
    async fn delete_subscription(&self, id: Uuid) -> Result<()>;

    async fn create_user_subscription(&self, enrollment: NewUserSubscription) -> Result<UserSubscription>;
    async fn get_user_subscription(&self, id: Uuid) -> Result<UserSubscription>;
    async fn list_user_subscriptions(&self, filter: &UserSubscriptionFilter, page: PageParams) -> Result<Page<UserSubscription>>;
    async fn update_user_subscription(&self, id: Uuid, update: UpdateUserSubscription) -> Result<UserSubscription>;
    async fn delete_user_subscription(&self, id: Uuid) -> Result<()>;

    async fn create_delivery(&self, delivery: NewSubscriptionDelivery) -> Result<SubscriptionDelivery>;
    async fn list_deliveries(&self, user_subscription_id: Option<Uuid>, page: PageParams) -> Result<Page<SubscriptionDelivery>>;
    async fn update_delivery(&self, id: Uuid, update: UpdateSubscriptionDelivery) -> Result<SubscriptionDelivery>;
    async fn delete_delivery(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment>;
    async fn get_payment(&self, id: Uuid) -> Result<Payment>;
    async fn list_payments(&self, filter: &PaymentFilter, page: PageParams) -> Result<Page<Payment>>;
    async fn update_payment(&self, id: Uuid, update: UpdatePayment) -> Result<Payment>;

    async fn create_paystack_payment(&self, email: &str, amount: i64, reference: &str) -> Result<PaystackPayment>;
    async fn get_paystack_payment(&self, reference: &str) -> Result<PaystackPayment>;
    async fn update_paystack_status(&self, reference: &str, status: &str) -> Result<PaystackPayment>;
    async fn list_paystack_payments(&self, filter: &PaystackPaymentFilter, page: PageParams) -> Result<Page<PaystackPayment>>;
    async fn log_paystack_event(&self, event: &str, data: serde_json::Value) -> Result<PaystackEvent>;
    async fn list_paystack_events(&self, filter: &PaystackEventFilter, page: PageParams) -> Result<Page<PaystackEvent>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: Uuid) -> Result<User>;
    async fn list_users(&self, filter: &UserFilter, page: PageParams) -> Result<Page<User>>;
    async fn update_user(&self, id: Uuid, update: UpdateUser) -> Result<User>;
    async fn delete_user(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Shop-wide totals over live rows only.
    async fn dashboard(&self) -> Result<Dashboard>;
}

/// Everything the application needs from persistence.
#[async_trait]
pub trait Store:
    CategoryRepository
    + ProductRepository
    + OrderRepository
    + SubscriptionRepository
    + PaymentRepository
    + UserRepository
    + DashboardRepository
{
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
