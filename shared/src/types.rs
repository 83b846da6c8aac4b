//! Common types used across the platform

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a trackable catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    RawMaterial,
    FinishedGood,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::RawMaterial => "raw_material",
            ItemType::FinishedGood => "finished_good",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "raw_material" => Some(ItemType::RawMaterial),
            "finished_good" => Some(ItemType::FinishedGood),
            _ => None,
        }
    }
}

/// Lifecycle status of a catalog item. Items are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Inactive,
    Discontinued,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Inactive => "inactive",
            ItemStatus::Discontinued => "discontinued",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ItemStatus::Active),
            "inactive" => Some(ItemStatus::Inactive),
            "discontinued" => Some(ItemStatus::Discontinued),
            _ => None,
        }
    }
}

/// Kind of a stock-changing ledger event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    PurchaseReceive,
    ProductionConsume,
    ProductionOutput,
    AdjustmentCount,
    AdjustmentWaste,
    AdjustmentOther,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::PurchaseReceive => "purchase_receive",
            TransactionKind::ProductionConsume => "production_consume",
            TransactionKind::ProductionOutput => "production_output",
            TransactionKind::AdjustmentCount => "adjustment_count",
            TransactionKind::AdjustmentWaste => "adjustment_waste",
            TransactionKind::AdjustmentOther => "adjustment_other",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_receive" => Some(TransactionKind::PurchaseReceive),
            "production_consume" => Some(TransactionKind::ProductionConsume),
            "production_output" => Some(TransactionKind::ProductionOutput),
            "adjustment_count" => Some(TransactionKind::AdjustmentCount),
            "adjustment_waste" => Some(TransactionKind::AdjustmentWaste),
            "adjustment_other" => Some(TransactionKind::AdjustmentOther),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

/// Advisory status of a raw-material lot. Remaining quantity is authoritative;
/// the status only mirrors it for listing convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Active,
    Depleted,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "active",
            LotStatus::Depleted => "depleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LotStatus::Active),
            "depleted" => Some(LotStatus::Depleted),
            _ => None,
        }
    }
}

/// Production run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planning,
    InProgress,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Planning => "planning",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(RunStatus::Planning),
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(RunStatus::Completed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }

    /// Whether a transition from `self` to `next` is permitted.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Planning, RunStatus::InProgress) => true,
            (RunStatus::Planning, RunStatus::Cancelled) => true,
            (RunStatus::InProgress, RunStatus::Completed) => true,
            (RunStatus::InProgress, RunStatus::Cancelled) => true,
            _ => false,
        }
    }
}

/// Lifecycle state of a stage within a multi-stage run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "in_progress" => Some(StageStatus::InProgress),
            "completed" => Some(StageStatus::Completed),
            _ => None,
        }
    }
}

/// Overhead allocation policy for a production run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "rate", rename_all = "snake_case")]
pub enum OverheadPolicy {
    /// Overhead as a percentage of labor cost (e.g. 50 means 50%)
    PercentOfLabor(Decimal),
    /// Flat overhead amount per labor hour
    PerLaborHour(Decimal),
}

impl OverheadPolicy {
    pub fn method_str(&self) -> &'static str {
        match self {
            OverheadPolicy::PercentOfLabor(_) => "percent_of_labor",
            OverheadPolicy::PerLaborHour(_) => "per_labor_hour",
        }
    }

    pub fn rate(&self) -> Decimal {
        match self {
            OverheadPolicy::PercentOfLabor(r) | OverheadPolicy::PerLaborHour(r) => *r,
        }
    }

    pub fn from_parts(method: &str, rate: Decimal) -> Option<Self> {
        match method {
            "percent_of_labor" => Some(OverheadPolicy::PercentOfLabor(rate)),
            "per_labor_hour" => Some(OverheadPolicy::PerLaborHour(rate)),
            _ => None,
        }
    }

    /// Overhead cost for the given labor inputs.
    pub fn overhead_for(&self, labor_hours: Decimal, labor_cost: Decimal) -> Decimal {
        match self {
            OverheadPolicy::PercentOfLabor(pct) => labor_cost * *pct / Decimal::from(100),
            OverheadPolicy::PerLaborHour(rate) => labor_hours * *rate,
        }
    }
}

/// Non-fatal condition returned alongside a successful mutation.
/// Negative balances are permitted by design: physical consumption routinely
/// precedes its recording, so the ledger flags rather than blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockWarning {
    NegativeStock {
        item_id: Uuid,
        resulting_stock: Decimal,
    },
    NegativeLotRemainder {
        lot_id: Uuid,
        quantity_remaining: Decimal,
    },
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.per_page.max(1) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.max(1);
        let total_pages = ((total_items + per_page as u64 - 1) / per_page as u64) as u32;
        Self {
            page: pagination.page.max(1),
            per_page,
            total_items,
            total_pages,
        }
    }
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}
