use axum::extract::State;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::extract::{PathParam, QueryParams, ValidatedJson};
use super::{data, message, AppState};
use crate::domain::{LinePayment, LineRequest, Money, Order, OrderFilter, PaymentMethod, PlaceOrder, Quantity, UpdateOrder};
use crate::pagination::{Page, PageParams};
use crate::store::OrderRepository;
use crate::{Error, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderBody {
    #[validate(length(min = 1))]
    pub user_name: String,
    #[validate(length(min = 1))]
    pub user_phone_number: String,
    #[serde(default)]
    pub payment_status: bool,
    #[serde(default = "pending")]
    pub status: String,
    pub delivery_date: NaiveDate,
    #[serde(default)]
    pub time_slot: String,
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub by_admin: bool,
    pub items: Vec<OrderItemBody>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemBody {
    pub product_id: Uuid,
    pub stem_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub frequency: Option<String>,
    pub quantity: i64,
    pub amount: Money,
}

fn pending() -> String { "pending".to_string() }

impl TryFrom<CreateOrderBody> for PlaceOrder {
    type Error = Error;

    fn try_from(body: CreateOrderBody) -> Result<Self> {
        let lines = body
            .items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                let quantity = Quantity::new(item.quantity)
                    .map_err(|e| Error::invalid_argument(format!("item {position}: {e}")))?;
                let payment = match item.payment_method {
                    PaymentMethod::Normal => LinePayment::Normal,
                    PaymentMethod::Subscription => match item.frequency {
                        Some(frequency) if !frequency.trim().is_empty() => LinePayment::Subscription { frequency },
                        _ => {
                            return Err(Error::invalid_argument(format!(
                                "item {position}: frequency is required for subscription items"
                            )))
                        }
                    },
                };
                Ok(LineRequest {
                    product_id: item.product_id,
                    stem_id: item.stem_id,
                    payment,
                    quantity,
                    client_amount: item.amount,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PlaceOrder {
            user_name: body.user_name,
            user_phone_number: body.user_phone_number,
            payment_status: body.payment_status,
            status: body.status,
            delivery_date: body.delivery_date,
            time_slot: body.time_slot,
            shipping_address: body.shipping_address,
            by_admin: body.by_admin,
            lines,
        })
    }
}

pub async fn create_order(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<CreateOrderBody>) -> Result<Json<Value>> {
    let order = s.orders.place_order(PlaceOrder::try_from(body)?).await?;
    Ok(data(order))
}

pub async fn get_order(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_order(id).await?))
}

pub async fn list_orders(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<OrderFilter>,
) -> Result<Json<Page<Order>>> {
    Ok(Json(s.store.list_orders(&filter, page).await?))
}

pub async fn update_order(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(update): ValidatedJson<UpdateOrder>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_order(id, update).await?))
}

pub async fn delete_order(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_order(id).await?;
    Ok(message("Order deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(items: serde_json::Value) -> CreateOrderBody {
        serde_json::from_value(serde_json::json!({
            "user_name": "Ada",
            "user_phone_number": "0803",
            "delivery_date": "2024-06-05",
            "time_slot": "9am-12pm",
            "items": items,
        }))
        .unwrap()
    }

    #[test]
    fn test_subscription_item_without_frequency_is_rejected() {
        let items = serde_json::json!([{
            "product_id": Uuid::now_v7(), "payment_method": "subscription", "quantity": 1, "amount": 10
        }]);
        let err = PlaceOrder::try_from(body(items)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!(err.message().contains("frequency"));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let items = serde_json::json!([{
            "product_id": Uuid::now_v7(), "payment_method": "normal", "quantity": 0, "amount": 0
        }]);
        assert!(PlaceOrder::try_from(body(items)).is_err());
    }

    #[test]
    fn test_normal_item_drops_frequency() {
        let items = serde_json::json!([{
            "product_id": Uuid::now_v7(), "payment_method": "normal", "frequency": "weekly", "quantity": 2, "amount": "20.00"
        }]);
        let order = PlaceOrder::try_from(body(items)).unwrap();
        assert_eq!(order.status, "pending");
        assert_eq!(order.lines[0].payment, LinePayment::Normal);
    }
}
