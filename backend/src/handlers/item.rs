//! HTTP handlers for the item catalog

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::{page, require};
use crate::middleware::CurrentUser;
use crate::services::item::{CreateItemInput, ItemFilter, ItemService, UpdateItemInput};
use crate::AppState;
use shared::{Item, ItemStatus, ItemType, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Create a catalog item
pub async fn create_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<Item>> {
    require(&current_user.0, "items", "write")?;
    let service = ItemService::new(state.db);
    let item = service.create_item(current_user.0.org_id, input).await?;
    Ok(Json(item))
}

/// Get a catalog item
pub async fn get_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Item>> {
    let service = ItemService::new(state.db);
    let item = service.get_item(current_user.0.org_id, item_id).await?;
    Ok(Json(item))
}

/// List catalog items with optional type/status filters
pub async fn list_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListItemsQuery>,
) -> AppResult<Json<PaginatedResponse<Item>>> {
    let service = ItemService::new(state.db);
    let filter = ItemFilter {
        item_type: query.item_type,
        status: query.status,
    };
    let items = service
        .list_items(
            current_user.0.org_id,
            filter,
            page(query.page, query.per_page),
        )
        .await?;
    Ok(Json(items))
}

/// Update an item's descriptive fields and status
pub async fn update_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<Item>> {
    require(&current_user.0, "items", "write")?;
    let service = ItemService::new(state.db);
    let item = service
        .update_item(current_user.0.org_id, item_id, input)
        .await?;
    Ok(Json(item))
}

/// List active items at or below their reorder point
pub async fn list_below_reorder(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Item>>> {
    let service = ItemService::new(state.db);
    let items = service.list_below_reorder(current_user.0.org_id).await?;
    Ok(Json(items))
}
