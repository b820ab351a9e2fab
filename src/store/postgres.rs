//! PostgreSQL store backed by a sqlx pool.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgExecutor, PgPool, Postgres};
use uuid::Uuid;

use super::{
    CatalogStore, CategoryRepository, DashboardRepository, OrderRepository, OrderWriter, PaymentRepository,
    ProductRepository, Store, SubscriptionRepository, SubscriptionStore, Transaction, UserRepository,
};
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

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
    pub fn pool(&self) -> &PgPool { &self.pool }
}

fn limit_offset(page: PageParams) -> (i64, i64) {
    (i64::from(page.page_size()), page.offset() as i64)
}

fn total(count: i64) -> u64 { u64::try_from(count).unwrap_or_default() }

// =============================================================================
// Shared row helpers
// =============================================================================

async fn load_stems<'e>(conn: impl PgExecutor<'e>, product_ids: &[Uuid]) -> Result<Vec<ProductStem>> {
    Ok(sqlx::query_as::<_, ProductStem>(
        "SELECT * FROM product_stems WHERE product_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(product_ids)
    .fetch_all(conn)
    .await?)
}

fn attach_stems(products: &mut [Product], stems: Vec<ProductStem>) {
    let mut by_product: HashMap<Uuid, Vec<ProductStem>> = HashMap::new();
    for stem in stems {
        by_product.entry(stem.product_id).or_default().push(stem);
    }
    for product in products.iter_mut() {
        product.stems = by_product.remove(&product.id).unwrap_or_default();
    }
}

async fn load_items<'e>(conn: impl PgExecutor<'e>, order_ids: &[Uuid]) -> Result<Vec<OrderItem>> {
    Ok(sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?)
}

fn attach_items(orders: &mut [Order], items: Vec<OrderItem>) {
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }
    for order in orders.iter_mut() {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }
}

async fn insert_stems(conn: &mut sqlx::PgConnection, product_id: Uuid, stems: &[NewStem]) -> Result<()> {
    for stem in stems {
        sqlx::query("INSERT INTO product_stems (id, product_id, stem_count, price, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(Uuid::now_v7())
            .bind(product_id)
            .bind(stem.stem_count)
            .bind(stem.price)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn soft_delete(pool: &PgPool, table: &str, id: Uuid, what: &str) -> Result<()> {
    let sql = format!("UPDATE {table} SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL");
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("{what} with id {id} not found")));
    }
    Ok(())
}

// =============================================================================
// Transaction
// =============================================================================

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

#[async_trait]
impl CatalogStore for PgTransaction {
    async fn get_product(&mut self, id: Uuid) -> Result<Product> {
        let mut product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("product with id {id} not found")))?;
        product.stems = load_stems(&mut *self.tx, &[id]).await?;
        Ok(product)
    }

    async fn get_stem(&mut self, id: Uuid) -> Result<ProductStem> {
        sqlx::query_as::<_, ProductStem>("SELECT * FROM product_stems WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("stem with id {id} not found")))
    }

    async fn update_stock(&mut self, product_id: Uuid, new_quantity: i32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock_quantity = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(product_id)
            .bind(new_quantity)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("product with id {product_id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for PgTransaction {
    async fn create_subscription(&mut self, subscription: NewSubscription) -> Result<Uuid> {
        insert_subscription(&mut *self.tx, subscription).await.map(|row| row.id)
    }

    async fn create_user_subscription(&mut self, enrollment: NewUserSubscription) -> Result<Uuid> {
        insert_user_subscription(&mut *self.tx, enrollment).await.map(|row| row.id)
    }
}

#[async_trait]
impl OrderWriter for PgTransaction {
    async fn create_order(&mut self, order: NewOrder) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO orders (id, user_name, user_phone_number, payment_status, status, delivery_date, time_slot, \
             shipping_address, total_amount, by_admin, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(id)
        .bind(&order.user_name)
        .bind(&order.user_phone_number)
        .bind(order.payment_status)
        .bind(&order.status)
        .bind(order.delivery_date)
        .bind(&order.time_slot)
        .bind(&order.shipping_address)
        .bind(order.total_amount)
        .bind(order.by_admin)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn create_order_item(&mut self, item: NewOrderItem) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let quantity = i32::try_from(item.quantity.value()).map_err(|_| Error::invalid_argument("quantity out of range"))?;
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, stem_id, payment_method, frequency, quantity, amount, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.stem_id)
        .bind(item.payment_method.as_str())
        .bind(&item.frequency)
        .bind(quantity)
        .bind(item.amount)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let PgTransaction { tx } = *self;
        Ok(tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgTransaction { tx } = *self;
        Ok(tx.rollback().await?)
    }
}

async fn insert_subscription<'e>(conn: impl PgExecutor<'e>, sub: NewSubscription) -> Result<Subscription> {
    Ok(sqlx::query_as::<_, Subscription>(
        "INSERT INTO subscriptions (id, name, description, product_ids, add_ons, stem_ids, price, parent_order_id, by_admin, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&sub.name)
    .bind(&sub.description)
    .bind(&sub.product_ids)
    .bind(&sub.add_ons)
    .bind(&sub.stem_ids)
    .bind(sub.price)
    .bind(sub.parent_order_id)
    .bind(sub.by_admin)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?)
}

async fn insert_user_subscription<'e>(conn: impl PgExecutor<'e>, sub: NewUserSubscription) -> Result<UserSubscription> {
    Ok(sqlx::query_as::<_, UserSubscription>(
        "INSERT INTO user_subscriptions (id, user_id, subscription_id, day_of_week, status, start_date, end_date, frequency, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(sub.user_id)
    .bind(sub.subscription_id)
    .bind(sub.day_of_week.value())
    .bind(sub.status)
    .bind(sub.start_date)
    .bind(sub.end_date)
    .bind(&sub.frequency)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?)
}

// =============================================================================
// Categories
// =============================================================================

const CATEGORY_WHERE: &str =
    "WHERE deleted_at IS NULL AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%')";

#[async_trait]
impl CategoryRepository for PgStore {
    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        Ok(sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description, image_url, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.image_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_category(&self, id: Uuid) -> Result<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("category with id {id} not found")))
    }

    async fn list_categories(&self, filter: &CategoryFilter, page: PageParams) -> Result<Page<Category>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT * FROM categories {CATEGORY_WHERE} ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(&filter.search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM categories {CATEGORY_WHERE}"))
            .bind(&filter.search)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_category(&self, id: Uuid, update: UpdateCategory) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = COALESCE($2, name), description = COALESCE($3, description), \
             image_url = COALESCE($4, image_url) WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.image_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("category with id {id} not found")))
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "categories", id, "category").await
    }
}

// =============================================================================
// Products
// =============================================================================

const PRODUCT_WHERE: &str = "WHERE deleted_at IS NULL \
    AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%') \
    AND ($2::uuid IS NULL OR category_id = $2) \
    AND ($3::numeric IS NULL OR price >= $3) \
    AND ($4::numeric IS NULL OR price <= $4) \
    AND ($5::boolean IS NULL OR is_message_card = $5) \
    AND ($6::boolean IS NULL OR is_flowers = $6) \
    AND ($7::boolean IS NULL OR is_add_on = $7)";

#[async_trait]
impl ProductRepository for PgStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let product = product.normalize()?;
        let id = Uuid::now_v7();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO products (id, name, description, price, category_id, image_url, has_stems, is_message_card, \
             is_flowers, is_add_on, stock_quantity, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.category_id)
        .bind(&product.image_url)
        .bind(product.has_stems)
        .bind(product.is_message_card)
        .bind(product.is_flowers)
        .bind(product.is_add_on)
        .bind(product.stock_quantity)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        insert_stems(&mut tx, id, &product.stems).await?;
        tx.commit().await?;
        ProductRepository::get_product(self, id).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Product> {
        let mut product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("product with id {id} not found")))?;
        product.stems = load_stems(&self.pool, &[id]).await?;
        Ok(product)
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageParams) -> Result<Page<Product>> {
        let (limit, offset) = limit_offset(page);
        let mut rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT * FROM products {PRODUCT_WHERE} ORDER BY created_at DESC LIMIT $8 OFFSET $9"
        ))
        .bind(&filter.search)
        .bind(filter.category_id)
        .bind(filter.price_from)
        .bind(filter.price_to)
        .bind(filter.is_message_card)
        .bind(filter.is_flowers)
        .bind(filter.is_add_on)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {PRODUCT_WHERE}"))
            .bind(&filter.search)
            .bind(filter.category_id)
            .bind(filter.price_from)
            .bind(filter.price_to)
            .bind(filter.is_message_card)
            .bind(filter.is_flowers)
            .bind(filter.is_add_on)
            .fetch_one(&self.pool)
            .await?;
        let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
        attach_stems(&mut rows, load_stems(&self.pool, &ids).await?);
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_product(&self, id: Uuid, update: UpdateProduct) -> Result<Product> {
        let update = update.normalize()?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE products SET name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), category_id = COALESCE($5, category_id), image_url = COALESCE($6, image_url), \
             has_stems = COALESCE($7, has_stems), is_message_card = COALESCE($8, is_message_card), \
             is_flowers = COALESCE($9, is_flowers), is_add_on = COALESCE($10, is_add_on), \
             stock_quantity = COALESCE($11, stock_quantity) \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(update.category_id)
        .bind(&update.image_url)
        .bind(update.has_stems)
        .bind(update.is_message_card)
        .bind(update.is_flowers)
        .bind(update.is_add_on)
        .bind(update.stock_quantity)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("product with id {id} not found")));
        }
        if let Some(stems) = &update.stems {
            sqlx::query("DELETE FROM product_stems WHERE product_id = $1").bind(id).execute(&mut *tx).await?;
            insert_stems(&mut tx, id, stems).await?;
        }
        tx.commit().await?;
        ProductRepository::get_product(self, id).await
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "products", id, "product").await
    }

    async fn list_product_order_items(&self, product_id: Uuid, page: PageParams) -> Result<Page<OrderItem>> {
        ProductRepository::get_product(self, product_id).await?;
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, OrderItem>(
            "SELECT i.* FROM order_items i JOIN orders o ON o.id = i.order_id \
             WHERE i.product_id = $1 AND o.deleted_at IS NULL \
             ORDER BY i.created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(product_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_items i JOIN orders o ON o.id = i.order_id \
             WHERE i.product_id = $1 AND o.deleted_at IS NULL",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Page::new(rows, total(count), page))
    }
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_WHERE: &str = "WHERE deleted_at IS NULL \
    AND ($1::text IS NULL OR user_name ILIKE '%' || $1 || '%' OR user_phone_number ILIKE '%' || $1 || '%') \
    AND ($2::text IS NULL OR status = $2) \
    AND ($3::boolean IS NULL OR payment_status = $3)";

#[async_trait]
impl OrderRepository for PgStore {
    async fn get_order(&self, id: Uuid) -> Result<Order> {
        let mut order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("order with id {id} not found")))?;
        order.items = load_items(&self.pool, &[id]).await?;
        Ok(order)
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageParams) -> Result<Page<Order>> {
        let (limit, offset) = limit_offset(page);
        let mut rows = sqlx::query_as::<_, Order>(&format!(
            "SELECT * FROM orders {ORDER_WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&filter.search)
        .bind(&filter.status)
        .bind(filter.payment_status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {ORDER_WHERE}"))
            .bind(&filter.search)
            .bind(&filter.status)
            .bind(filter.payment_status)
            .fetch_one(&self.pool)
            .await?;
        let ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
        attach_items(&mut rows, load_items(&self.pool, &ids).await?);
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_order(&self, id: Uuid, update: UpdateOrder) -> Result<Order> {
        let result = sqlx::query(
            "UPDATE orders SET user_name = COALESCE($2, user_name), user_phone_number = COALESCE($3, user_phone_number), \
             payment_status = COALESCE($4, payment_status), status = COALESCE($5, status), \
             shipping_address = COALESCE($6, shipping_address) WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&update.user_name)
        .bind(&update.user_phone_number)
        .bind(update.payment_status)
        .bind(&update.status)
        .bind(&update.shipping_address)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("order with id {id} not found")));
        }
        self.get_order(id).await
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "orders", id, "order").await
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

const SUBSCRIPTION_WHERE: &str = "WHERE deleted_at IS NULL \
    AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%') \
    AND ($2::numeric IS NULL OR price >= $2) \
    AND ($3::numeric IS NULL OR price <= $3)";

const USER_SUBSCRIPTION_WHERE: &str = "WHERE deleted_at IS NULL \
    AND ($1::boolean IS NULL OR status = $1) \
    AND ($2::uuid IS NULL OR user_id = $2)";

const DELIVERY_WHERE: &str = "WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_subscription_id = $1)";

impl PgStore {
    async fn ensure_products_exist(&self, ids: &[Uuid], label: &str) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1) AND deleted_at IS NULL")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        match ids.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(Error::not_found(format!("{label} with id {missing} not found"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionRepository for PgStore {
    async fn create_subscription(&self, subscription: NewSubscription) -> Result<Subscription> {
        self.ensure_products_exist(&subscription.product_ids, "product").await?;
        self.ensure_products_exist(&subscription.add_ons, "add-on").await?;
        insert_subscription(&self.pool, subscription).await
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Subscription> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("subscription with id {id} not found")))
    }

    async fn list_subscriptions(&self, filter: &SubscriptionFilter, page: PageParams) -> Result<Page<Subscription>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT * FROM subscriptions {SUBSCRIPTION_WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&filter.search)
        .bind(filter.price_from)
        .bind(filter.price_to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM subscriptions {SUBSCRIPTION_WHERE}"))
            .bind(&filter.search)
            .bind(filter.price_from)
            .bind(filter.price_to)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_subscription(&self, id: Uuid, update: UpdateSubscription) -> Result<Subscription> {
        if let Some(ids) = &update.product_ids {
            self.ensure_products_exist(ids, "product").await?;
        }
        if let Some(ids) = &update.add_ons {
            self.ensure_products_exist(ids, "add-on").await?;
        }
        sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET name = COALESCE($2, name), description = COALESCE($3, description), \
             product_ids = COALESCE($4, product_ids), add_ons = COALESCE($5, add_ons), \
             stem_ids = COALESCE($6, stem_ids), price = COALESCE($7, price) \
             WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.product_ids)
        .bind(&update.add_ons)
        .bind(&update.stem_ids)
        .bind(update.price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("subscription with id {id} not found")))
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "subscriptions", id, "subscription").await
    }

    async fn create_user_subscription(&self, enrollment: NewUserSubscription) -> Result<UserSubscription> {
        self.get_subscription(enrollment.subscription_id).await?;
        if let Some(user_id) = enrollment.user_id {
            self.get_user(user_id).await?;
        }
        insert_user_subscription(&self.pool, enrollment).await
    }

    async fn get_user_subscription(&self, id: Uuid) -> Result<UserSubscription> {
        sqlx::query_as::<_, UserSubscription>("SELECT * FROM user_subscriptions WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("user subscription with id {id} not found")))
    }

    async fn list_user_subscriptions(&self, filter: &UserSubscriptionFilter, page: PageParams) -> Result<Page<UserSubscription>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, UserSubscription>(&format!(
            "SELECT * FROM user_subscriptions {USER_SUBSCRIPTION_WHERE} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM user_subscriptions {USER_SUBSCRIPTION_WHERE}"))
            .bind(filter.status)
            .bind(filter.user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_user_subscription(&self, id: Uuid, update: UpdateUserSubscription) -> Result<UserSubscription> {
        if let Some(user_id) = update.user_id {
            self.get_user(user_id).await?;
        }
        sqlx::query_as::<_, UserSubscription>(
            "UPDATE user_subscriptions SET user_id = COALESCE($2, user_id), day_of_week = COALESCE($3, day_of_week), \
             status = COALESCE($4, status), start_date = COALESCE($5, start_date), end_date = COALESCE($6, end_date), \
             frequency = COALESCE($7, frequency) WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(id)
        .bind(update.user_id)
        .bind(update.day_of_week)
        .bind(update.status)
        .bind(update.start_date)
        .bind(update.end_date)
        .bind(&update.frequency)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("user subscription with id {id} not found")))
    }

    async fn delete_user_subscription(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "user_subscriptions", id, "user subscription").await
    }

    async fn create_delivery(&self, delivery: NewSubscriptionDelivery) -> Result<SubscriptionDelivery> {
        self.get_user_subscription(delivery.user_subscription_id).await?;
        let now = Utc::now();
        Ok(sqlx::query_as::<_, SubscriptionDelivery>(
            "INSERT INTO subscription_deliveries (id, user_subscription_id, delivered_on, description, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(delivery.user_subscription_id)
        .bind(delivery.delivered_on.unwrap_or(now))
        .bind(&delivery.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_deliveries(&self, user_subscription_id: Option<Uuid>, page: PageParams) -> Result<Page<SubscriptionDelivery>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, SubscriptionDelivery>(&format!(
            "SELECT * FROM subscription_deliveries {DELIVERY_WHERE} ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_subscription_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM subscription_deliveries {DELIVERY_WHERE}"))
            .bind(user_subscription_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_delivery(&self, id: Uuid, update: UpdateSubscriptionDelivery) -> Result<SubscriptionDelivery> {
        sqlx::query_as::<_, SubscriptionDelivery>(
            "UPDATE subscription_deliveries SET delivered_on = COALESCE($2, delivered_on), \
             description = COALESCE($3, description) WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(id)
        .bind(update.delivered_on)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("subscription delivery with id {id} not found")))
    }

    async fn delete_delivery(&self, id: Uuid) -> Result<()> {
        soft_delete(&self.pool, "subscription_deliveries", id, "subscription delivery").await
    }
}

// =============================================================================
// Users
// =============================================================================

const USER_WHERE: &str = "WHERE deleted_at IS NULL \
    AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%' OR phone_number ILIKE '%' || $1 || '%') \
    AND ($2::boolean IS NULL OR is_admin = $2) \
    AND ($3::boolean IS NULL OR is_active = $3)";

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        Ok(sqlx::query_as::<_, User>(
            "INSERT INTO users (id, name, email, phone_number, address, is_admin, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(user.is_admin)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_user(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("user with id {id} not found")))
    }

    async fn list_users(&self, filter: &UserFilter, page: PageParams) -> Result<Page<User>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT * FROM users {USER_WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&filter.search)
        .bind(filter.is_admin)
        .bind(filter.is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {USER_WHERE}"))
            .bind(&filter.search)
            .bind(filter.is_admin)
            .bind(filter.is_active)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_user(&self, id: Uuid, update: UpdateUser) -> Result<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($2, name), phone_number = COALESCE($3, phone_number), \
             address = COALESCE($4, address), is_admin = COALESCE($5, is_admin), is_active = COALESCE($6, is_active) \
             WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.phone_number)
        .bind(&update.address)
        .bind(update.is_admin)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("user with id {id} not found")))
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("user with id {id} not found")));
        }
        sqlx::query("UPDATE user_subscriptions SET user_id = NULL WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Dashboard
// =============================================================================

#[async_trait]
impl DashboardRepository for PgStore {
    async fn dashboard(&self) -> Result<Dashboard> {
        let total_revenue: Money = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE deleted_at IS NULL AND payment_status",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        let active_subscriptions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_subscriptions WHERE deleted_at IS NULL AND status")
                .fetch_one(&self.pool)
                .await?;
        let recent = self.list_orders(&OrderFilter::default(), PageParams::new(1, RECENT_ORDERS)).await?;
        let categories = sqlx::query_as::<_, CategoryProductCount>(
            "SELECT c.id, c.name, COUNT(p.id) AS product_count FROM categories c \
             LEFT JOIN products p ON p.category_id = c.id AND p.deleted_at IS NULL \
             WHERE c.deleted_at IS NULL GROUP BY c.id, c.name ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(Dashboard {
            total_revenue,
            total_products,
            total_orders,
            active_subscriptions,
            recent_orders: recent.data,
            categories,
        })
    }
}

// =============================================================================
// Payments
// =============================================================================

const PAYMENT_WHERE: &str = "WHERE ($1::text IS NULL OR payment_method = $1) \
    AND ($2::date IS NULL OR paid_at::date >= $2) \
    AND ($3::date IS NULL OR paid_at::date <= $3)";

#[async_trait]
impl PaymentRepository for PgStore {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        if let Some(order_id) = payment.order_id {
            self.get_order(order_id).await?;
        }
        if let Some(sub_id) = payment.user_subscription_id {
            self.get_user_subscription(sub_id).await?;
        }
        let now = Utc::now();
        Ok(sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (id, order_id, user_subscription_id, description, payment_method, amount, paid_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(payment.order_id)
        .bind(payment.user_subscription_id)
        .bind(&payment.description)
        .bind(&payment.payment_method)
        .bind(payment.amount)
        .bind(payment.paid_at.unwrap_or(now))
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("payment with id {id} not found")))
    }

    async fn list_payments(&self, filter: &PaymentFilter, page: PageParams) -> Result<Page<Payment>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, Payment>(&format!(
            "SELECT * FROM payments {PAYMENT_WHERE} ORDER BY paid_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&filter.payment_method)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM payments {PAYMENT_WHERE}"))
            .bind(&filter.payment_method)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn update_payment(&self, id: Uuid, update: UpdatePayment) -> Result<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET description = COALESCE($2, description), payment_method = COALESCE($3, payment_method), \
             amount = COALESCE($4, amount), paid_at = COALESCE($5, paid_at) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&update.description)
        .bind(&update.payment_method)
        .bind(update.amount)
        .bind(update.paid_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("payment with id {id} not found")))
    }

    async fn create_paystack_payment(&self, email: &str, amount: i64, reference: &str) -> Result<PaystackPayment> {
        let now = Utc::now();
        Ok(sqlx::query_as::<_, PaystackPayment>(
            "INSERT INTO paystack_payments (id, email, amount, reference, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(email)
        .bind(amount)
        .bind(reference)
        .bind(PAYSTACK_PENDING)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_paystack_payment(&self, reference: &str) -> Result<PaystackPayment> {
        sqlx::query_as::<_, PaystackPayment>("SELECT * FROM paystack_payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("paystack payment with reference {reference} not found")))
    }

    async fn update_paystack_status(&self, reference: &str, status: &str) -> Result<PaystackPayment> {
        sqlx::query_as::<_, PaystackPayment>(
            "UPDATE paystack_payments SET status = $2, updated_at = NOW() WHERE reference = $1 RETURNING *",
        )
        .bind(reference)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("paystack payment with reference {reference} not found")))
    }

    async fn list_paystack_payments(&self, filter: &PaystackPaymentFilter, page: PageParams) -> Result<Page<PaystackPayment>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, PaystackPayment>(
            "SELECT * FROM paystack_payments WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(&filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paystack_payments WHERE ($1::text IS NULL OR status = $1)")
            .bind(&filter.status)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }

    async fn log_paystack_event(&self, event: &str, data: serde_json::Value) -> Result<PaystackEvent> {
        Ok(sqlx::query_as::<_, PaystackEvent>(
            "INSERT INTO paystack_events (id, event, data, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(event)
        .bind(data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_paystack_events(&self, filter: &PaystackEventFilter, page: PageParams) -> Result<Page<PaystackEvent>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, PaystackEvent>(
            "SELECT * FROM paystack_events WHERE ($1::text IS NULL OR event = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(&filter.event)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paystack_events WHERE ($1::text IS NULL OR event = $1)")
            .bind(&filter.event)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(rows, total(count), page))
    }
}
