use std::sync::Arc;
use std::time::Duration;

use bloom_haven::domain::{LinePayment, LineRequest, Money, NewProduct, PaymentMethod, PlaceOrder, Product, Quantity};
use bloom_haven::pagination::PageParams;
use bloom_haven::store::{MemoryStore, OrderRepository, ProductRepository, Store, SubscriptionRepository};
use bloom_haven::{ErrorKind, OrderCoordinator};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

fn naira(units: i64) -> Money {
    Money::new(Decimal::new(units, 0))
}

fn coordinator(store: &Arc<MemoryStore>) -> OrderCoordinator {
    OrderCoordinator::new(store.clone(), Duration::from_secs(5))
}

async fn product(store: &MemoryStore, body: serde_json::Value) -> Product {
    let new: NewProduct = serde_json::from_value(body).unwrap();
    store.create_product(new).await.unwrap()
}

async fn stocked(store: &MemoryStore, name: &str, price: i64, stock: i32) -> Product {
    product(store, serde_json::json!({ "name": name, "price": price, "stock_quantity": stock })).await
}

async fn roses(store: &MemoryStore, price: i64, stock: i32) -> Product {
    stocked(store, "Red Roses", price, stock).await
}

fn line(product_id: Uuid, quantity: i64, amount: Money) -> LineRequest {
    LineRequest {
        product_id,
        stem_id: None,
        payment: LinePayment::Normal,
        quantity: Quantity::new(quantity).unwrap(),
        client_amount: amount,
    }
}

fn subscription_line(product_id: Uuid, quantity: i64, amount: Money) -> LineRequest {
    LineRequest { payment: LinePayment::Subscription { frequency: "weekly".into() }, ..line(product_id, quantity, amount) }
}

fn order(lines: Vec<LineRequest>) -> PlaceOrder {
    PlaceOrder {
        user_name: "Ada Obi".into(),
        user_phone_number: "08030000000".into(),
        payment_status: false,
        status: "pending".into(),
        // A Wednesday.
        delivery_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        time_slot: "9am-12pm".into(),
        shipping_address: Some("12 Allen Avenue, Ikeja".into()),
        by_admin: false,
        lines,
    }
}

async fn stock_of(store: &MemoryStore, id: Uuid) -> i32 {
    ProductRepository::get_product(store, id).await.unwrap().stock_quantity
}

async fn order_count(store: &MemoryStore) -> u64 {
    store.list_orders(&Default::default(), PageParams::default()).await.unwrap().pagination.total
}

#[tokio::test]
async fn test_total_is_sum_of_items_and_stock_is_decremented() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let lilies = product(&store, serde_json::json!({ "name": "Lilies", "price": "12.50", "stock_quantity": 10 })).await;

    let placed = coordinator(&store)
        .place_order(order(vec![
            line(roses.id, 2, naira(60)),
            line(lilies.id, 3, Money::new(Decimal::new(3750, 2))),
        ]))
        .await
        .unwrap();

    assert_eq!(placed.items.len(), 2);
    assert_eq!(placed.total_amount, Money::new(Decimal::new(9750, 2)));
    assert_eq!(placed.items_total(), placed.total_amount);
    assert_eq!(stock_of(&store, roses.id).await, 3);
    assert_eq!(stock_of(&store, lilies.id).await, 7);
}

#[tokio::test]
async fn test_read_back_matches_request() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;

    let placed = coordinator(&store).place_order(order(vec![line(roses.id, 1, naira(30))])).await.unwrap();
    let fetched = store.get_order(placed.id).await.unwrap();

    assert_eq!(fetched, placed);
    assert_eq!(fetched.user_name, "Ada Obi");
    assert_eq!(fetched.status, "pending");
    assert_eq!(fetched.delivery_date, NaiveDate::from_ymd_opt(2024, 6, 5).unwrap());
    assert_eq!(fetched.shipping_address.as_deref(), Some("12 Allen Avenue, Ikeja"));
    assert_eq!(fetched.items[0].product_id, roses.id);
    assert_eq!(fetched.items[0].quantity, 1);
    assert_eq!(fetched.items[0].payment_method, PaymentMethod::Normal);
    assert_eq!(fetched.items[0].frequency, None);
}

#[tokio::test]
async fn test_client_amount_is_compared_at_currency_precision() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;

    let placed = coordinator(&store)
        .place_order(order(vec![line(roses.id, 1, Money::new(Decimal::new(300001, 4)))]))
        .await
        .unwrap();
    assert_eq!(placed.total_amount, naira(30));
}

#[tokio::test]
async fn test_insufficient_stock_leaves_everything_untouched() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let lilies = stocked(&store, "Lilies", 10, 1).await;

    let err = coordinator(&store)
        .place_order(order(vec![line(roses.id, 2, naira(60)), line(lilies.id, 2, naira(20))]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("insufficient stock"));
    assert_eq!(stock_of(&store, roses.id).await, 5);
    assert_eq!(stock_of(&store, lilies.id).await, 1);
    assert_eq!(order_count(&store).await, 0);
}

#[tokio::test]
async fn test_amount_mismatch_rolls_back_earlier_lines() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let lilies = stocked(&store, "Lilies", 10, 4).await;

    let err = coordinator(&store)
        .place_order(order(vec![
            line(roses.id, 1, naira(30)),
            subscription_line(lilies.id, 2, naira(25)),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("amount mismatch"));
    assert_eq!(stock_of(&store, roses.id).await, 5);
    assert_eq!(stock_of(&store, lilies.id).await, 4);
    assert_eq!(order_count(&store).await, 0);
    let subs = store.list_subscriptions(&Default::default(), PageParams::default()).await.unwrap();
    assert_eq!(subs.pagination.total, 0);
}

#[tokio::test]
async fn test_blank_frequency_is_rejected_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let mut bad = subscription_line(roses.id, 1, naira(30));
    bad.payment = LinePayment::Subscription { frequency: "  ".into() };

    let err = coordinator(&store).place_order(order(vec![bad])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(stock_of(&store, roses.id).await, 5);
}

#[tokio::test]
async fn test_empty_order_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let err = coordinator(&store).place_order(order(vec![])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_subscription_line_creates_linked_template_and_enrollment() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let lilies = stocked(&store, "Lilies", 10, 5).await;

    let placed = coordinator(&store)
        .place_order(order(vec![line(lilies.id, 1, naira(10)), subscription_line(roses.id, 2, naira(60))]))
        .await
        .unwrap();

    assert_eq!(placed.subscription_items().count(), 1);
    let item = placed.subscription_items().next().unwrap();
    assert_eq!(item.frequency.as_deref(), Some("weekly"));

    let subs = store.list_subscriptions(&Default::default(), PageParams::default()).await.unwrap();
    assert_eq!(subs.data.len(), 1);
    let template = &subs.data[0];
    assert_eq!(template.parent_order_id, Some(placed.id));
    assert_eq!(template.product_ids, vec![roses.id]);
    assert_eq!(template.price, naira(60));
    assert_eq!(template.name, "Ada Obi");
    assert!(template
        .description
        .starts_with("Subscription made by Ada Obi for product Red Roses of quantity 2 on "));

    let enrollments = store.list_user_subscriptions(&Default::default(), PageParams::default()).await.unwrap();
    assert_eq!(enrollments.data.len(), 1);
    let enrollment = &enrollments.data[0];
    assert_eq!(enrollment.subscription_id, template.id);
    assert_eq!(enrollment.day_of_week, 3);
    assert_eq!(enrollment.frequency, "weekly");
    assert!(enrollment.status);
    assert_eq!(enrollment.user_id, None);
    assert!(enrollment.end_date > enrollment.start_date);
}

#[tokio::test]
async fn test_stem_price_overrides_product_price() {
    let store = Arc::new(MemoryStore::new());
    let bouquet = product(
        &store,
        serde_json::json!({
            "name": "Tulip Bouquet",
            "has_stems": true,
            "stock_quantity": 8,
            "stems": [{ "stem_count": 10, "price": 15 }, { "stem_count": 20, "price": 28 }],
        }),
    )
    .await;
    assert_eq!(bouquet.price, naira(15));
    let twenty = bouquet.stems.iter().find(|s| s.stem_count == 20).unwrap().id;

    let mut stemmed = line(bouquet.id, 2, naira(56));
    stemmed.stem_id = Some(twenty);
    let placed = coordinator(&store).place_order(order(vec![stemmed])).await.unwrap();

    assert_eq!(placed.total_amount, naira(56));
    assert_eq!(placed.items[0].stem_id, Some(twenty));
    assert_eq!(stock_of(&store, bouquet.id).await, 6);
}

#[tokio::test]
async fn test_stem_of_another_product_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let bouquet = product(
        &store,
        serde_json::json!({
            "name": "Tulip Bouquet",
            "has_stems": true,
            "stock_quantity": 8,
            "stems": [{ "stem_count": 10, "price": 30 }],
        }),
    )
    .await;

    let mut crossed = line(roses.id, 1, naira(30));
    crossed.stem_id = Some(bouquet.stems[0].id);
    let err = coordinator(&store).place_order(order(vec![crossed])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(stock_of(&store, roses.id).await, 5);
}

#[tokio::test]
async fn test_unknown_product_or_stem_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;

    let err = coordinator(&store)
        .place_order(order(vec![line(Uuid::now_v7(), 1, naira(30))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut ghost_stem = line(roses.id, 1, naira(30));
    ghost_stem.stem_id = Some(Uuid::now_v7());
    let err = coordinator(&store).place_order(order(vec![ghost_stem])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(order_count(&store).await, 0);
}

#[tokio::test]
async fn test_deleted_product_cannot_be_ordered() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    store.delete_product(roses.id).await.unwrap();

    let err = coordinator(&store).place_order(order(vec![line(roses.id, 1, naira(30))])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_concurrent_orders_for_last_unit_admit_exactly_one() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 1).await;
    let coordinator = coordinator(&store);

    let (first, second) = tokio::join!(
        coordinator.place_order(order(vec![line(roses.id, 1, naira(30))])),
        coordinator.place_order(order(vec![line(roses.id, 1, naira(30))])),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(failure.kind(), ErrorKind::InvalidArgument);
    assert_eq!(stock_of(&store, roses.id).await, 0);
    assert_eq!(order_count(&store).await, 1);
}

#[tokio::test]
async fn test_transaction_that_cannot_start_in_time_fails_internal() {
    let store = Arc::new(MemoryStore::new());
    let roses = roses(&store, 30, 5).await;
    let coordinator = OrderCoordinator::new(store.clone(), Duration::from_millis(50));

    let held = store.begin().await.unwrap();
    let err = coordinator.place_order(order(vec![line(roses.id, 1, naira(30))])).await.unwrap_err();
    drop(held);

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(stock_of(&store, roses.id).await, 5);
    assert_eq!(order_count(&store).await, 0);
}
