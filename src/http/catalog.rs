use axum::extract::State;
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use super::extract::{PathParam, QueryParams, ValidatedJson};
use super::{data, message, AppState};
use crate::domain::{
    Category, CategoryFilter, NewCategory, NewProduct, OrderItem, Product, ProductFilter, UpdateCategory,
    UpdateProduct,
};
use crate::pagination::{Page, PageParams};
use crate::store::{CategoryRepository, ProductRepository};
use crate::Result;

// Categories

pub async fn create_category(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<NewCategory>) -> Result<Json<Value>> {
    Ok(data(s.store.create_category(body).await?))
}

pub async fn get_category(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(s.store.get_category(id).await?))
}

pub async fn list_categories(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<CategoryFilter>,
) -> Result<Json<Page<Category>>> {
    Ok(Json(s.store.list_categories(&filter, page).await?))
}

pub async fn update_category(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateCategory>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_category(id, body).await?))
}

pub async fn delete_category(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_category(id).await?;
    Ok(message("Category deleted successfully"))
}

// Products

pub async fn create_product(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<NewProduct>) -> Result<Json<Value>> {
    Ok(data(s.store.create_product(body).await?))
}

pub async fn get_product(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    Ok(data(ProductRepository::get_product(s.store.as_ref(), id).await?))
}

pub async fn list_products(
    State(s): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<ProductFilter>,
) -> Result<Json<Page<Product>>> {
    Ok(Json(s.store.list_products(&filter, page).await?))
}

pub async fn update_product(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateProduct>,
) -> Result<Json<Value>> {
    Ok(data(s.store.update_product(id, body).await?))
}

pub async fn delete_product(State(s): State<AppState>, PathParam(id): PathParam<Uuid>) -> Result<Json<Value>> {
    s.store.delete_product(id).await?;
    Ok(message("Product deleted successfully"))
}

/// Every order line that sold the product.
pub async fn list_product_order_items(
    State(s): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<OrderItem>>> {
    Ok(Json(s.store.list_product_order_items(id, page).await?))
}
