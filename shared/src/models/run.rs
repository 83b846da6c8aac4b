//! Production run models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OverheadPolicy, RunStatus, StageStatus, StockWarning};

/// One manufacturing execution producing finished goods from consumed
/// materials. Cost fields are populated exactly once at completion and
/// never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRun {
    pub id: Uuid,
    pub org_id: Uuid,
    /// Unique per organization, format PR-YYYYMMDD-NNN
    pub run_number: String,
    pub product_item_id: Uuid,
    pub planned_quantity: Decimal,
    /// Populated at completion
    pub actual_quantity: Option<Decimal>,
    pub status: RunStatus,
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    pub labor_cost: Option<Decimal>,
    pub overhead_policy: Option<OverheadPolicy>,
    pub material_cost: Option<Decimal>,
    pub overhead_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub cost_per_unit: Option<Decimal>,
    /// Append-only; remains writable on terminal runs
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A material line on a production run. Planned values come from the BOM
/// snapshot or manual entry; actuals are recorded at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMaterial {
    pub id: Uuid,
    pub run_id: Uuid,
    /// Stage this line belongs to, for multi-stage runs
    pub stage_id: Option<Uuid>,
    pub position: i32,
    pub material_item_id: Uuid,
    pub planned_quantity: Decimal,
    pub actual_quantity: Option<Decimal>,
    pub unit: String,
    /// Unit cost at consumption, fixed when the line is consumed
    pub unit_cost: Option<Decimal>,
    pub lot_id: Option<Uuid>,
    pub lot_number: Option<String>,
}

/// A sequential, non-overlapping phase within a multi-stage run.
/// Stages consume inventory but produce none; only the final stage's
/// completion produces output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStage {
    pub id: Uuid,
    pub run_id: Uuid,
    pub position: i32,
    pub name: String,
    pub status: StageStatus,
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    pub labor_cost: Option<Decimal>,
    pub overhead_cost: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A run with its material lines and stages
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: ProductionRun,
    pub materials: Vec<RunMaterial>,
    pub stages: Vec<RunStage>,
}

/// Result of a completion: the finished run plus any stock warnings raised
/// while consuming materials.
#[derive(Debug, Clone, Serialize)]
pub struct RunCompleted {
    pub run: RunDetail,
    pub warnings: Vec<StockWarning>,
}

/// Generate a run number: PR-YYYYMMDD-NNN
pub fn generate_run_number(date: NaiveDate, sequence: i32) -> String {
    format!("PR-{}-{:03}", date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_number() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(generate_run_number(date, 7), "PR-20260105-007");
        assert_eq!(generate_run_number(date, 100), "PR-20260105-100");
    }
}
