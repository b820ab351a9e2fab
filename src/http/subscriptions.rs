use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::extract::{JsonBody, PathParam, QueryParams, ValidatedJson};
use super::{data, message, AppState};
use crate::domain::{
    DayOfWeek, NewSubscription, NewSubscriptionDelivery, NewUserSubscription, Subscription, SubscriptionDelivery,
    SubscriptionFilter, UpdateSubscription, UpdateSubscriptionDelivery, UpdateUserSubscription, UserSubscription,
    UserSubscriptionFilter,
};
use crate::pagination::{Page, PageParams};
use crate::store::SubscriptionRepository;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserSubscriptionBody {
    pub user_id: Option<Uuid>,
    pub subscription_id: Uuid,
    pub day_of_week: i64,
    #[serde(default = "active")]
    pub status: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub frequency: String,
}

fn active() -> bool { true }

impl TryFrom<CreateUserSubscriptionBody> for NewUserSubscription {
    type Error = crate::Error;

    fn try_from(body: CreateUserSubscriptionBody) -> Result<Self> {
        if body.end_date < body.start_date {
            return Err(crate::Error::invalid_argument("end_date is before start_date"));
        }
        Ok(NewUserSubscription {
            user_id: body.user_id,
            subscription_id: body.subscription_id,
            day_of_week: DayOfWeek::new(body.day_of_week)?,
            status: body.status,
            start_date: body.start_date,
            end_date: body.end_date,
            frequency: body.frequency,
        })
    }
}

// Subscription templates

pub async fn create_subscription(
    State(s): State<AppState>,
    ValidatedJson(body): ValidatedJson<NewSubscription>,
) -> Result<Json<Value>> {
    Ok(data(s.store.create_subscription(body).await?))
}

pub async fn get_subscription(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_subscription(id).await?))
}

pub async fn list_subscriptions(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<SubscriptionFilter>,
) -> Result<Json<Page<Subscription>>> {
    Ok(Json(s.store.list_subscriptions(&filter, page).await?))
}

pub async fn update_subscription(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateSubscription>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_subscription(id, body).await?))
}

pub async fn delete_subscription(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_subscription(id).await?;
    Ok(message("Subscription deleted successfully"))
}

// Enrollments

pub async fn create_user_subscription(
    State(s): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateUserSubscriptionBody>,
) -> Result<Json<Value>> {
    let enrollment = NewUserSubscription::try_from(body)?;
    Ok(data(s.store.create_user_subscription(enrollment).await?))
}

pub async fn get_user_subscription(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_user_subscription(id).await?))
}

pub async fn list_user_subscriptions(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<UserSubscriptionFilter>,
) -> Result<Json<Page<UserSubscription>>> {
    Ok(Json(s.store.list_user_subscriptions(&filter, page).await?))
}

pub async fn update_user_subscription(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateUserSubscription>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_user_subscription(id, body).await?))
}

pub async fn delete_user_subscription(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_user_subscription(id).await?;
    Ok(message("User subscription deleted successfully"))
}

// Deliveries

pub async fn create_delivery(
    State(s): State<AppState>,
    JsonBody(body): JsonBody<NewSubscriptionDelivery>,
) -> Result<Json<Value>> {
    Ok(data(s.store.create_delivery(body).await?))
}

pub async fn list_deliveries(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<SubscriptionDelivery>>> {
    Ok(Json(s.store.list_deliveries(None, page).await?))
}

/// Deliveries recorded against one enrollment; the path id is the enrollment's.
pub async fn list_deliveries_for(
    State(s): State<AppState>,
    PathParam(user_subscription_id): PathParam<Uuid>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<SubscriptionDelivery>>> {
    Ok(Json(s.store.list_deliveries(Some(user_subscription_id), page).await?))
}

pub async fn update_delivery(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateSubscriptionDelivery>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_delivery(id, body).await?))
}

pub async fn delete_delivery(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_delivery(id).await?;
    Ok(message("Subscription delivery deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn body(day_of_week: i64) -> CreateUserSubscriptionBody {
        serde_json::from_value(serde_json::json!({
            "subscription_id": Uuid::now_v7(),
            "day_of_week": day_of_week,
            "start_date": "2024-06-01T00:00:00Z",
            "end_date": "2024-09-01T00:00:00Z",
            "frequency": "weekly",
        }))
        .unwrap()
    }

    #[test]
    fn test_enrollment_defaults_to_active() {
        let enrollment = NewUserSubscription::try_from(body(3)).unwrap();
        assert!(enrollment.status);
        assert_eq!(enrollment.day_of_week.value(), 3);
        assert_eq!(enrollment.user_id, None);
    }

    #[test]
    fn test_enrollment_day_out_of_range() {
        let err = NewUserSubscription::try_from(body(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_enrollment_window_must_not_be_inverted() {
        let mut inverted = body(1);
        std::mem::swap(&mut inverted.start_date, &mut inverted.end_date);
        assert!(NewUserSubscription::try_from(inverted).is_err());
    }
}
