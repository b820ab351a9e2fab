use axum::extract::State;
use axum::Json;
use serde_json::Value;

use super::{data, AppState};
use crate::store::DashboardRepository;
use crate::Result;

pub async fn get_dashboard(State(s): State<AppState>) -> Result<Json<Value>> {
    Ok(data(s.store.dashboard().await?))
}
