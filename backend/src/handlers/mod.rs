//! HTTP request handlers

pub mod bom;
pub mod inventory;
pub mod item;
pub mod lot;
pub mod run;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::Pagination;

/// Capability check at the HTTP boundary; engine logic never sees roles.
pub fn require(user: &AuthUser, resource: &str, action: &str) -> AppResult<()> {
    if user.has_permission(resource, action) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Missing permission {}:{}",
            resource, action
        )))
    }
}

/// Build pagination from optional query parameters
pub fn page(page: Option<u32>, per_page: Option<u32>) -> Pagination {
    let default = Pagination::default();
    Pagination {
        page: page.unwrap_or(default.page),
        per_page: per_page.unwrap_or(default.per_page),
    }
}

pub use bom::{activate_bom, create_bom, get_bom, get_components, list_boms, update_bom};
pub use inventory::{get_balance, get_history, list_transactions, record_transaction};
pub use item::{create_item, get_item, list_below_reorder, list_items, update_item};
pub use lot::{create_lot, get_lot, list_lots};
pub use run::{
    append_note, cancel_run, complete_run, complete_stage, create_run, get_run, list_runs,
    set_materials, start_run, start_stage,
};
