//! HTTP handlers for BOM templates

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::{page, require};
use crate::middleware::CurrentUser;
use crate::services::bom::{BomService, CreateBomInput, UpdateBomInput};
use crate::AppState;
use shared::{Bom, BomComponent, BomWithComponents, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct ListBomsQuery {
    pub product_item_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Create a BOM version with its components
pub async fn create_bom(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateBomInput>,
) -> AppResult<Json<BomWithComponents>> {
    require(&current_user.0, "boms", "write")?;
    let service = BomService::new(state.db);
    let bom = service.create_bom(current_user.0.org_id, input).await?;
    Ok(Json(bom))
}

/// Get a BOM with its components
pub async fn get_bom(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bom_id): Path<Uuid>,
) -> AppResult<Json<BomWithComponents>> {
    let service = BomService::new(state.db);
    let bom = service.get_bom(current_user.0.org_id, bom_id).await?;
    Ok(Json(bom))
}

/// List BOM versions, optionally for one product
pub async fn list_boms(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListBomsQuery>,
) -> AppResult<Json<PaginatedResponse<Bom>>> {
    let service = BomService::new(state.db);
    let boms = service
        .list_boms(
            current_user.0.org_id,
            query.product_item_id,
            page(query.page, query.per_page),
        )
        .await?;
    Ok(Json(boms))
}

/// Update a BOM version
pub async fn update_bom(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bom_id): Path<Uuid>,
    Json(input): Json<UpdateBomInput>,
) -> AppResult<Json<BomWithComponents>> {
    require(&current_user.0, "boms", "write")?;
    let service = BomService::new(state.db);
    let bom = service
        .update_bom(current_user.0.org_id, bom_id, input)
        .await?;
    Ok(Json(bom))
}

/// Activate a BOM version, deactivating any sibling
pub async fn activate_bom(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bom_id): Path<Uuid>,
) -> AppResult<Json<Bom>> {
    require(&current_user.0, "boms", "write")?;
    let service = BomService::new(state.db);
    let bom = service.activate_bom(current_user.0.org_id, bom_id).await?;
    Ok(Json(bom))
}

/// Get a BOM's ordered component list for run pre-fill
pub async fn get_components(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bom_id): Path<Uuid>,
) -> AppResult<Json<Vec<BomComponent>>> {
    let service = BomService::new(state.db);
    let components = service.instantiate(current_user.0.org_id, bom_id).await?;
    Ok(Json(components))
}
