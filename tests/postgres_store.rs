//! Runs against a live database: `DATABASE_URL=... cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use bloom_haven::domain::{LinePayment, LineRequest, Money, NewProduct, PlaceOrder, Product, Quantity};
use bloom_haven::store::{PgStore, ProductRepository};
use bloom_haven::{ErrorKind, OrderCoordinator};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;

async fn store() -> Arc<PgStore> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
    let store = PgStore::new(pool);
    sqlx::migrate!("./migrations").run(store.pool()).await.unwrap();
    Arc::new(store)
}

async fn last_rose(store: &PgStore) -> Product {
    let new: NewProduct =
        serde_json::from_value(serde_json::json!({ "name": "Last Rose", "price": 30, "stock_quantity": 1 })).unwrap();
    store.create_product(new).await.unwrap()
}

fn order(product: &Product, payment: LinePayment) -> PlaceOrder {
    PlaceOrder {
        user_name: "Ada Obi".into(),
        user_phone_number: "08030000000".into(),
        payment_status: false,
        status: "pending".into(),
        delivery_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        time_slot: "9am-12pm".into(),
        shipping_address: None,
        by_admin: false,
        lines: vec![LineRequest {
            product_id: product.id,
            stem_id: None,
            payment,
            quantity: Quantity::new(1).unwrap(),
            client_amount: Money::new(Decimal::new(30, 0)),
        }],
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_row_lock_admits_one_order_for_last_unit() {
    let store = store().await;
    let rose = last_rose(&store).await;
    let coordinator = OrderCoordinator::new(store.clone(), Duration::from_secs(5));

    let (first, second) = tokio::join!(
        coordinator.place_order(order(&rose, LinePayment::Normal)),
        coordinator.place_order(order(&rose, LinePayment::Normal)),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(failure.kind(), ErrorKind::InvalidArgument);
    assert_eq!(store.get_product(rose.id).await.unwrap().stock_quantity, 0);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_subscription_line_commits_with_the_order() {
    let store = store().await;
    let rose = last_rose(&store).await;
    let coordinator = OrderCoordinator::new(store.clone(), Duration::from_secs(5));

    let placed = coordinator
        .place_order(order(&rose, LinePayment::Subscription { frequency: "weekly".into() }))
        .await
        .unwrap();

    assert_eq!(placed.subscription_items().count(), 1);
    assert_eq!(store.get_product(rose.id).await.unwrap().stock_quantity, 0);
}
