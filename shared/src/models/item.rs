//! Catalog item models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ItemStatus, ItemType};

/// A trackable catalog item: a raw material or a finished good.
///
/// `current_stock` is a cached value maintained exclusively by the
/// transaction ledger; it always equals the sum of quantity deltas over the
/// item's transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub org_id: Uuid,
    /// Unique per organization
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    /// Unit of measure (e.g. "kg", "unit")
    pub unit: String,
    pub reorder_point: Option<Decimal>,
    /// Last-known unit cost, refreshed by purchase receipts
    pub unit_cost: Option<Decimal>,
    pub current_stock: Decimal,
    pub status: ItemStatus,
    /// Open string-keyed map of scalar values; never interpreted by the engine
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
