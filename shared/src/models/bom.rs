//! Bill of materials template models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, versioned template of material quantities for a product.
/// Pure template: instantiating it into a run is a one-time snapshot, and
/// it is never authoritative for actual cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bom {
    pub id: Uuid,
    pub org_id: Uuid,
    pub product_item_id: Uuid,
    pub version_label: String,
    /// At most one active version per product
    pub is_active: bool,
    pub output_quantity: Decimal,
    pub output_unit: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An ordered component line within a BOM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomComponent {
    pub id: Uuid,
    pub bom_id: Uuid,
    pub position: i32,
    pub material_item_id: Uuid,
    pub quantity: Decimal,
    pub unit: String,
}

/// A BOM with its ordered components
#[derive(Debug, Clone, Serialize)]
pub struct BomWithComponents {
    #[serde(flatten)]
    pub bom: Bom,
    pub components: Vec<BomComponent>,
}
