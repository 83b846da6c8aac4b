//! HTTP handlers for the transaction ledger

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::{page, require};
use crate::middleware::CurrentUser;
use crate::services::ledger::{
    BalanceView, HistoryFilter, LedgerService, RecordTransactionInput,
};
use crate::AppState;
use shared::{
    InventoryTransaction, PaginatedResponse, TransactionKind, TransactionRecorded,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub kind: Option<TransactionKind>,
    pub lot_number: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Record an inventory transaction
pub async fn record_transaction(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordTransactionInput>,
) -> AppResult<Json<TransactionRecorded>> {
    require(&current_user.0, "inventory", "write")?;
    let service = LedgerService::new(state.db);
    let recorded = service
        .record_transaction(current_user.0.org_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(recorded))
}

/// List recent transactions across the organization
pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryTransaction>>> {
    let service = LedgerService::new(state.db);
    let transactions = service
        .list_transactions(current_user.0.org_id, page(query.page, query.per_page))
        .await?;
    Ok(Json(transactions))
}

/// Get an item's cached balance alongside the live ledger sum
pub async fn get_balance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<BalanceView>> {
    let service = LedgerService::new(state.db);
    let balance = service.get_balance(current_user.0.org_id, item_id).await?;
    Ok(Json(balance))
}

/// Get an item's transaction history, newest first
pub async fn get_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryTransaction>>> {
    let service = LedgerService::new(state.db);
    let filter = HistoryFilter {
        kind: query.kind,
        lot_number: query.lot_number,
        from: query.from,
        to: query.to,
        reference_type: query.reference_type,
        reference_id: query.reference_id,
    };
    let history = service
        .get_history(
            current_user.0.org_id,
            item_id,
            filter,
            page(query.page, query.per_page),
        )
        .await?;
    Ok(Json(history))
}
