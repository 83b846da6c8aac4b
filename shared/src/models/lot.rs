//! Raw-material lot models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{LotStatus, StockWarning};

/// A traceable batch of a raw material, received at a point in time at a
/// known cost. Remaining quantity is depleted by production consumption and
/// may go negative; the status field is advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub org_id: Uuid,
    pub material_item_id: Uuid,
    /// Unique per (org, material); system-generated as "L-YYYYMMDD-NNN"
    /// when not supplied by the user
    pub lot_number: String,
    pub quantity_received: Decimal,
    pub quantity_remaining: Decimal,
    /// Unit cost at receipt; authoritative for costing consumption from
    /// this lot
    pub unit_cost: Decimal,
    pub received_date: NaiveDate,
    /// Originating document, e.g. ("purchase_order", po id) or manual entry
    pub source_type: Option<String>,
    pub source_id: Option<Uuid>,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a lot mutation: the lot with updated remaining quantity plus
/// any warnings raised by the underlying ledger write.
#[derive(Debug, Clone, Serialize)]
pub struct LotMutation {
    pub lot: Lot,
    pub warnings: Vec<StockWarning>,
}

/// Generate a lot number: L-YYYYMMDD-NNN
pub fn generate_lot_number(date: NaiveDate, sequence: i32) -> String {
    format!("L-{}-{:03}", date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_lot_number() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(generate_lot_number(date, 1), "L-20260824-001");
        assert_eq!(generate_lot_number(date, 42), "L-20260824-042");
        assert_eq!(generate_lot_number(date, 1234), "L-20260824-1234");
    }
}
