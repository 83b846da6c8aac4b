//! HTTP handlers for lot tracking

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::{page, require};
use crate::middleware::CurrentUser;
use crate::services::lot::{CreateLotInput, LotFilter, LotService};
use crate::AppState;
use shared::{Lot, LotMutation, LotStatus, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct ListLotsQuery {
    pub material_item_id: Option<Uuid>,
    pub status: Option<LotStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Receive a new lot, recording its purchase on the ledger
pub async fn create_lot(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateLotInput>,
) -> AppResult<Json<LotMutation>> {
    require(&current_user.0, "lots", "write")?;
    let service = LotService::new(state.db);
    let lot = service
        .create_lot(current_user.0.org_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(lot))
}

/// Get a lot
pub async fn get_lot(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(lot_id): Path<Uuid>,
) -> AppResult<Json<Lot>> {
    let service = LotService::new(state.db);
    let lot = service.get_lot(current_user.0.org_id, lot_id).await?;
    Ok(Json(lot))
}

/// List lots with optional material/status filters
pub async fn list_lots(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListLotsQuery>,
) -> AppResult<Json<PaginatedResponse<Lot>>> {
    let service = LotService::new(state.db);
    let filter = LotFilter {
        material_item_id: query.material_item_id,
        status: query.status,
    };
    let lots = service
        .list_lots(
            current_user.0.org_id,
            filter,
            page(query.page, query.per_page),
        )
        .await?;
    Ok(Json(lots))
}
