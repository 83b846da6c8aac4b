//! Inventory ledger transaction models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{StockWarning, TransactionKind};

/// An immutable stock-changing event. Corrections are made by appending
/// offsetting transactions, never by editing or deleting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub org_id: Uuid,
    pub item_id: Uuid,
    pub kind: TransactionKind,
    /// Signed quantity delta (consumption is negative)
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    /// |quantity| x unit_cost when both are present
    pub total_cost: Option<Decimal>,
    /// Tracked lot this transaction depletes or fills, if any
    pub lot_id: Option<Uuid>,
    /// Free-text lot identifier when no tracked lot is linked
    pub lot_number: Option<String>,
    /// Originating document, e.g. ("production_run", run id)
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Result of recording a transaction: the persisted row plus any non-fatal
/// warnings (negative stock, negative lot remainder).
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecorded {
    pub transaction: InventoryTransaction,
    pub warnings: Vec<StockWarning>,
}
