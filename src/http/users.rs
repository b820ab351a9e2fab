use axum::extract::State;
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use super::extract::{ActingUser, PathParam, QueryParams, ValidatedJson};
use super::{data, message, AppState};
use crate::domain::aggregates::user::require_admin;
use crate::domain::{NewUser, UpdateUser, User, UserFilter, UserSubscription, UserSubscriptionFilter};
use crate::pagination::{Page, PageParams};
use crate::store::{SubscriptionRepository, UserRepository};
use crate::{Error, ErrorKind, Result};

/// Loads the acting user; an id that matches no live user is Unauthenticated.
async fn actor(s: &AppState, ActingUser(id): ActingUser) -> Result<Option<User>> {
    let Some(id) = id else { return Ok(None) };
    match s.store.get_user(id).await {
        Ok(user) => Ok(Some(user)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::unauthenticated("unknown acting user")),
        Err(e) => Err(e),
    }
}

/// Anyone may register. Creating an admin needs an acting admin once the first admin exists.
pub async fn create_user(
    State(s): State<AppState>,
    acting: ActingUser,
    ValidatedJson(body): ValidatedJson<NewUser>,
) -> Result<Json<Value>> {
    if body.is_admin {
        let admins = s.store.list_users(&UserFilter::admins(), PageParams::new(1, 1)).await?;
        if admins.pagination.total > 0 {
            require_admin("is_admin", actor(&s, acting).await?.as_ref())?;
        }
    }
    Ok(data(s.store.create_user(body).await?))
}

pub async fn get_user(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_user(id).await?))
}

pub async fn list_users(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<UserFilter>,
) -> Result<Json<Page<User>>> {
    Ok(Json(s.store.list_users(&filter, page).await?))
}

pub async fn update_user(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    acting: ActingUser,
    ValidatedJson(update): ValidatedJson<UpdateUser>,
) -> Result<Json<Value>> {
    if update.admin_field().is_some() {
        update.authorize(actor(&s, acting).await?.as_ref())?;
    }
    Ok(data(s.store.update_user(id, update).await?))
}

pub async fn delete_user(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_user(id).await?;
    Ok(message("User deleted successfully"))
}

pub async fn list_user_subscriptions_for(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<UserSubscription>>> {
    s.store.get_user(id).await?;
    let filter = UserSubscriptionFilter { user_id: Some(id), ..Default::default() };
    Ok(Json(s.store.list_user_subscriptions(&filter, page).await?))
}
