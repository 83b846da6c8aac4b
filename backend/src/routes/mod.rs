//! Route definitions for the CraftCost backend

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/items", item_routes(state.clone()))
        .nest("/inventory", inventory_routes(state.clone()))
        .nest("/lots", lot_routes(state.clone()))
        .nest("/boms", bom_routes(state.clone()))
        .nest("/runs", run_routes(state))
}

/// Item catalog routes (protected)
fn item_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/below-reorder", get(handlers::list_below_reorder))
        .route(
            "/:item_id",
            get(handlers::get_item).put(handlers::update_item),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Transaction ledger routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::record_transaction),
        )
        .route("/items/:item_id/balance", get(handlers::get_balance))
        .route("/items/:item_id/transactions", get(handlers::get_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Lot tracking routes (protected)
fn lot_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_lots).post(handlers::create_lot))
        .route("/:lot_id", get(handlers::get_lot))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// BOM template routes (protected)
fn bom_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_boms).post(handlers::create_bom))
        .route(
            "/:bom_id",
            get(handlers::get_bom).put(handlers::update_bom),
        )
        .route("/:bom_id/activate", post(handlers::activate_bom))
        .route("/:bom_id/components", get(handlers::get_components))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Production run routes (protected)
fn run_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_runs).post(handlers::create_run))
        .route("/:run_id", get(handlers::get_run))
        .route("/:run_id/start", post(handlers::start_run))
        .route("/:run_id/materials", put(handlers::set_materials))
        .route("/:run_id/complete", post(handlers::complete_run))
        .route("/:run_id/cancel", post(handlers::cancel_run))
        .route("/:run_id/notes", post(handlers::append_note))
        .route("/:run_id/stages/:stage_id/start", post(handlers::start_stage))
        .route(
            "/:run_id/stages/:stage_id/complete",
            post(handlers::complete_stage),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
