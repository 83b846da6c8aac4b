//! Production run engine
//!
//! Drives the planning → in_progress → completed | cancelled lifecycle,
//! consumes materials through the ledger, and computes the one-shot cost
//! breakdown at completion. Multi-stage runs complete stage by stage in
//! strict position order; only the final stage produces output.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{begin_serializable, LedgerService, RecordTransactionInput};
use crate::services::lot::{next_sequence, LotService};
use shared::{
    generate_run_number, validate_positive_quantity, CostBreakdown, OverheadPolicy,
    PaginatedResponse, Pagination, PaginationMeta, ProductionRun, RunCompleted, RunDetail,
    RunMaterial, RunStage, RunStatus, StageStatus, StockWarning, TransactionKind,
};

/// Service for production run management and COGS computation
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
}

/// A planned material line supplied at creation or via line editing
#[derive(Debug, Clone, Deserialize)]
pub struct RunMaterialInput {
    pub material_item_id: Uuid,
    pub planned_quantity: Decimal,
    /// Defaults to the item's unit of measure
    pub unit: Option<String>,
    /// Index into the run's stage list, for multi-stage runs
    pub stage_position: Option<i32>,
}

/// Input for creating a run
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunInput {
    pub product_item_id: Uuid,
    pub planned_quantity: Decimal,
    /// Snapshot this BOM's components into the run's material lines
    pub bom_id: Option<Uuid>,
    #[serde(default)]
    pub materials: Vec<RunMaterialInput>,
    /// Ordered stage names; empty for a single-shot run
    #[serde(default)]
    pub stages: Vec<String>,
    pub notes: Option<String>,
}

/// Input for starting a run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRunInput {
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    pub overhead_policy: Option<OverheadPolicy>,
}

/// An actual consumption line recorded at run or stage completion.
/// Either references a planned line by id or describes an ad-hoc one.
#[derive(Debug, Clone, Deserialize)]
pub struct ActualLine {
    pub run_material_id: Option<Uuid>,
    /// Required for ad-hoc lines
    pub material_item_id: Option<Uuid>,
    pub actual_quantity: Decimal,
    /// Tracked lot to consume from; its receipt cost prices the line
    pub lot_id: Option<Uuid>,
    /// Free-text lot identifier recorded without lot linkage
    pub lot_number: Option<String>,
    /// Fallback price for lines without a tracked lot
    pub unit_cost: Option<Decimal>,
}

/// Input for completing a single-shot run
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRunInput {
    pub quantity_produced: Decimal,
    /// Override the values captured at start
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    pub overhead_policy: Option<OverheadPolicy>,
    #[serde(default)]
    pub lines: Vec<ActualLine>,
    pub note: Option<String>,
}

/// Input for completing a stage
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteStageInput {
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    #[serde(default)]
    pub lines: Vec<ActualLine>,
    /// Required on the final stage, rejected on earlier ones
    pub quantity_produced: Option<Decimal>,
    pub note: Option<String>,
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub product_item_id: Option<Uuid>,
}

/// Outcome of a cancellation. Consumption already on the ledger stays there
/// as sunk cost; the count makes that explicit to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub run: RunDetail,
    pub retained_consumption_transactions: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    org_id: Uuid,
    run_number: String,
    product_item_id: Uuid,
    planned_quantity: Decimal,
    actual_quantity: Option<Decimal>,
    status: String,
    labor_hours: Option<Decimal>,
    labor_rate: Option<Decimal>,
    labor_cost: Option<Decimal>,
    overhead_method: Option<String>,
    overhead_rate: Option<Decimal>,
    material_cost: Option<Decimal>,
    overhead_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    cost_per_unit: Option<Decimal>,
    notes: Option<String>,
    created_by: Uuid,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunRow {
    fn into_model(self) -> AppResult<ProductionRun> {
        let status = RunStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown run status: {}", self.status)))?;
        let overhead_policy = match (self.overhead_method.as_deref(), self.overhead_rate) {
            (Some(method), Some(rate)) => {
                Some(OverheadPolicy::from_parts(method, rate).ok_or_else(|| {
                    AppError::Internal(format!("Unknown overhead method: {method}"))
                })?)
            }
            _ => None,
        };
        Ok(ProductionRun {
            id: self.id,
            org_id: self.org_id,
            run_number: self.run_number,
            product_item_id: self.product_item_id,
            planned_quantity: self.planned_quantity,
            actual_quantity: self.actual_quantity,
            status,
            labor_hours: self.labor_hours,
            labor_rate: self.labor_rate,
            labor_cost: self.labor_cost,
            overhead_policy,
            material_cost: self.material_cost,
            overhead_cost: self.overhead_cost,
            total_cost: self.total_cost,
            cost_per_unit: self.cost_per_unit,
            notes: self.notes,
            created_by: self.created_by,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StageRow {
    id: Uuid,
    run_id: Uuid,
    position: i32,
    name: String,
    status: String,
    labor_hours: Option<Decimal>,
    labor_rate: Option<Decimal>,
    labor_cost: Option<Decimal>,
    overhead_cost: Option<Decimal>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl StageRow {
    fn into_model(self) -> AppResult<RunStage> {
        let status = StageStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown stage status: {}", self.status))
        })?;
        Ok(RunStage {
            id: self.id,
            run_id: self.run_id,
            position: self.position,
            name: self.name,
            status,
            labor_hours: self.labor_hours,
            labor_rate: self.labor_rate,
            labor_cost: self.labor_cost,
            overhead_cost: self.overhead_cost,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    id: Uuid,
    run_id: Uuid,
    stage_id: Option<Uuid>,
    position: i32,
    material_item_id: Uuid,
    planned_quantity: Decimal,
    actual_quantity: Option<Decimal>,
    unit: String,
    unit_cost: Option<Decimal>,
    lot_id: Option<Uuid>,
    lot_number: Option<String>,
}

impl From<MaterialRow> for RunMaterial {
    fn from(row: MaterialRow) -> Self {
        RunMaterial {
            id: row.id,
            run_id: row.run_id,
            stage_id: row.stage_id,
            position: row.position,
            material_item_id: row.material_item_id,
            planned_quantity: row.planned_quantity,
            actual_quantity: row.actual_quantity,
            unit: row.unit,
            unit_cost: row.unit_cost,
            lot_id: row.lot_id,
            lot_number: row.lot_number,
        }
    }
}

const RUN_COLUMNS: &str = "id, org_id, run_number, product_item_id, planned_quantity, \
     actual_quantity, status, labor_hours, labor_rate, labor_cost, overhead_method, \
     overhead_rate, material_cost, overhead_cost, total_cost, cost_per_unit, notes, \
     created_by, started_at, completed_at, created_at, updated_at";

const STAGE_COLUMNS: &str = "id, run_id, position, name, status, labor_hours, labor_rate, \
     labor_cost, overhead_cost, started_at, completed_at";

const MATERIAL_COLUMNS: &str = "id, run_id, stage_id, position, material_item_id, \
     planned_quantity, actual_quantity, unit, unit_cost, lot_id, lot_number";

impl ProductionService {
    /// Create a new ProductionService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a run in `planning`. Optionally snapshots a BOM into the run's
    /// material lines and sets up an ordered stage list.
    pub async fn create_run(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        input: CreateRunInput,
    ) -> AppResult<RunDetail> {
        validate_positive_quantity(input.planned_quantity).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;

        let mut tx = self.db.begin().await?;

        let product = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            "SELECT id, org_id, item_type FROM items WHERE id = $1",
        )
        .bind(input.product_item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        if product.1 != org_id {
            return Err(AppError::CrossTenant("Item".to_string()));
        }
        if product.2 != "finished_good" {
            return Err(AppError::Validation {
                field: "product_item_id".to_string(),
                message: "Production runs produce finished goods".to_string(),
            });
        }

        let today = Utc::now().date_naive();
        let sequence = next_sequence(&mut tx, org_id, "run", today).await?;
        let run_number = generate_run_number(today, sequence);

        let run_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO production_runs (org_id, run_number, product_item_id,
                                         planned_quantity, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(&run_number)
        .bind(input.product_item_id)
        .bind(input.planned_quantity)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut stage_ids = Vec::with_capacity(input.stages.len());
        for (position, name) in input.stages.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(AppError::Validation {
                    field: "stages".to_string(),
                    message: "Stage names cannot be empty".to_string(),
                });
            }
            let stage_id = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO run_stages (run_id, position, name) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(run_id)
            .bind(position as i32)
            .bind(name.trim())
            .fetch_one(&mut *tx)
            .await?;
            stage_ids.push(stage_id);
        }

        let mut position = 0i32;

        if let Some(bom_id) = input.bom_id {
            let bom = sqlx::query_as::<_, (Uuid, Uuid)>(
                "SELECT org_id, product_item_id FROM boms WHERE id = $1",
            )
            .bind(bom_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("BOM".to_string()))?;

            if bom.0 != org_id {
                return Err(AppError::CrossTenant("BOM".to_string()));
            }
            if bom.1 != input.product_item_id {
                return Err(AppError::Validation {
                    field: "bom_id".to_string(),
                    message: "BOM belongs to a different product".to_string(),
                });
            }

            // One-time snapshot: later edits to the BOM never touch this run
            let components = sqlx::query_as::<_, (Uuid, Decimal, String)>(
                "SELECT material_item_id, quantity, unit FROM bom_components \
                 WHERE bom_id = $1 ORDER BY position",
            )
            .bind(bom_id)
            .fetch_all(&mut *tx)
            .await?;

            for (material_item_id, quantity, unit) in components {
                sqlx::query(
                    "INSERT INTO run_materials (run_id, position, material_item_id, planned_quantity, unit) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(run_id)
                .bind(position)
                .bind(material_item_id)
                .bind(quantity)
                .bind(&unit)
                .execute(&mut *tx)
                .await?;
                position += 1;
            }
        }

        for material in &input.materials {
            let stage_id = match material.stage_position {
                Some(idx) => Some(
                    stage_ids
                        .get(idx as usize)
                        .copied()
                        .ok_or_else(|| AppError::Validation {
                            field: "stage_position".to_string(),
                            message: format!("Run has no stage at position {idx}"),
                        })?,
                ),
                None => None,
            };
            Self::insert_material_line(&mut tx, org_id, run_id, stage_id, position, material)
                .await?;
            position += 1;
        }

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Start a run, capturing planned labor and the overhead policy.
    /// No ledger activity happens here; nothing is reserved.
    pub async fn start_run(
        &self,
        org_id: Uuid,
        run_id: Uuid,
        input: StartRunInput,
    ) -> AppResult<RunDetail> {
        let mut tx = self.db.begin().await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        Self::require_transition(run.status, RunStatus::InProgress)?;

        let (method, rate) = match input.overhead_policy {
            Some(policy) => (Some(policy.method_str().to_string()), Some(policy.rate())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE production_runs
            SET status = 'in_progress',
                started_at = now(),
                labor_hours = COALESCE($2, labor_hours),
                labor_rate = COALESCE($3, labor_rate),
                overhead_method = COALESCE($4, overhead_method),
                overhead_rate = COALESCE($5, overhead_rate)
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(input.labor_hours)
        .bind(input.labor_rate)
        .bind(&method)
        .bind(rate)
        .execute(&mut *tx)
        .await?;

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Replace the run's unconsumed planned material lines. Lines already
    /// consumed by a completed stage are kept untouched.
    pub async fn set_materials(
        &self,
        org_id: Uuid,
        run_id: Uuid,
        materials: Vec<RunMaterialInput>,
    ) -> AppResult<RunDetail> {
        let mut tx = self.db.begin().await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        if run.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Cannot edit material lines on a {} run",
                run.status.as_str()
            )));
        }

        sqlx::query("DELETE FROM run_materials WHERE run_id = $1 AND actual_quantity IS NULL")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        let mut position = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(position) FROM run_materials WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?
        .map_or(0, |max| max + 1);

        let stage_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM run_stages WHERE run_id = $1 ORDER BY position",
        )
        .bind(run_id)
        .fetch_all(&mut *tx)
        .await?;

        for material in &materials {
            let stage_id = match material.stage_position {
                Some(idx) => Some(
                    stage_ids
                        .get(idx as usize)
                        .copied()
                        .ok_or_else(|| AppError::Validation {
                            field: "stage_position".to_string(),
                            message: format!("Run has no stage at position {idx}"),
                        })?,
                ),
                None => None,
            };
            Self::insert_material_line(&mut tx, org_id, run_id, stage_id, position, material)
                .await?;
            position += 1;
        }

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Complete a single-shot run: consume every actual line, produce the
    /// output, and persist the one-shot cost breakdown, all in one database
    /// transaction. Any line failure aborts everything.
    pub async fn complete_run(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        run_id: Uuid,
        input: CompleteRunInput,
    ) -> AppResult<RunCompleted> {
        validate_positive_quantity(input.quantity_produced).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;

        let mut tx = begin_serializable(&self.db).await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        Self::require_transition(run.status, RunStatus::Completed)?;

        let stage_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM run_stages WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;
        if stage_count > 0 {
            return Err(AppError::StageOrderViolation(
                "Runs with stages are completed by completing their final stage".to_string(),
            ));
        }

        let (lines, mut warnings) =
            Self::consume_lines(&mut tx, org_id, user_id, run_id, None, &input.lines).await?;

        let labor_hours = input
            .labor_hours
            .or(run.labor_hours)
            .unwrap_or(Decimal::ZERO);
        let labor_rate = input.labor_rate.or(run.labor_rate).unwrap_or(Decimal::ZERO);
        let policy = input
            .overhead_policy
            .or(run.overhead_policy)
            .unwrap_or(OverheadPolicy::PercentOfLabor(Decimal::ZERO));

        let breakdown = CostBreakdown::compute(
            &lines,
            labor_hours,
            labor_rate,
            policy,
            input.quantity_produced,
        );

        let (_, output_warnings) = LedgerService::record_in_tx(
            &mut tx,
            org_id,
            user_id,
            RecordTransactionInput {
                item_id: run.product_item_id,
                kind: TransactionKind::ProductionOutput,
                quantity: input.quantity_produced,
                unit_cost: Some(breakdown.cost_per_unit),
                lot_id: None,
                lot_number: None,
                reference_type: Some("production_run".to_string()),
                reference_id: Some(run_id),
                note: input.note.clone(),
            },
        )
        .await?;
        warnings.extend(output_warnings);

        sqlx::query(
            r#"
            UPDATE production_runs
            SET status = 'completed',
                actual_quantity = $2,
                labor_hours = $3,
                labor_rate = $4,
                labor_cost = $5,
                overhead_method = $6,
                overhead_rate = $7,
                material_cost = $8,
                overhead_cost = $9,
                total_cost = $10,
                cost_per_unit = $11,
                notes = CASE WHEN $12::text IS NULL THEN notes
                             WHEN notes IS NULL OR notes = '' THEN $12
                             ELSE notes || E'\n' || $12 END,
                completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(input.quantity_produced)
        .bind(labor_hours)
        .bind(labor_rate)
        .bind(breakdown.labor_cost)
        .bind(policy.method_str())
        .bind(policy.rate())
        .bind(breakdown.material_cost)
        .bind(breakdown.overhead_cost)
        .bind(breakdown.total_cost)
        .bind(breakdown.cost_per_unit)
        .bind(&input.note)
        .execute(&mut *tx)
        .await?;

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;

        Ok(RunCompleted {
            run: detail,
            warnings,
        })
    }

    /// Cancel a run. Consumption already recorded by completed stages stays
    /// on the ledger as sunk cost; the outcome reports how many such
    /// transactions were retained so the caller can write them off with an
    /// explicit adjustment if desired.
    pub async fn cancel_run(&self, org_id: Uuid, run_id: Uuid) -> AppResult<CancelOutcome> {
        let mut tx = self.db.begin().await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        Self::require_transition(run.status, RunStatus::Cancelled)?;

        let retained = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM inventory_transactions \
             WHERE org_id = $1 AND reference_type = 'production_run' AND reference_id = $2",
        )
        .bind(org_id)
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE production_runs SET status = 'cancelled' WHERE id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;

        if retained > 0 {
            tracing::info!(
                run_number = %detail.run.run_number,
                retained,
                "Run cancelled with consumption retained on the ledger"
            );
        }

        Ok(CancelOutcome {
            run: detail,
            retained_consumption_transactions: retained,
        })
    }

    /// Start a stage. Stages run strictly in position order, one at a time.
    pub async fn start_stage(
        &self,
        org_id: Uuid,
        run_id: Uuid,
        stage_id: Uuid,
    ) -> AppResult<RunStage> {
        let mut tx = self.db.begin().await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(AppError::InvalidTransition(format!(
                "Stages can only be started on an in_progress run (run is {})",
                run.status.as_str()
            )));
        }

        let stage = Self::load_stage(&mut tx, run_id, stage_id).await?;
        match stage.status {
            StageStatus::Pending => {}
            _ => {
                return Err(AppError::StageOrderViolation(format!(
                    "Stage '{}' has already been started",
                    stage.name
                )))
            }
        }

        let unfinished_before = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM run_stages \
             WHERE run_id = $1 AND position < $2 AND status <> 'completed'",
        )
        .bind(run_id)
        .bind(stage.position)
        .fetch_one(&mut *tx)
        .await?;
        if unfinished_before > 0 {
            return Err(AppError::StageOrderViolation(format!(
                "Stage '{}' cannot start before earlier stages are completed",
                stage.name
            )));
        }

        let row = sqlx::query_as::<_, StageRow>(&format!(
            "UPDATE run_stages SET status = 'in_progress', started_at = now() \
             WHERE id = $1 RETURNING {STAGE_COLUMNS}"
        ))
        .bind(stage_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_model()
    }

    /// Complete a stage: consume its material lines and accrue its labor and
    /// overhead. Completing the final stage additionally produces the output,
    /// aggregates costs across all stages, and completes the run, all in the
    /// same database transaction.
    pub async fn complete_stage(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        run_id: Uuid,
        stage_id: Uuid,
        input: CompleteStageInput,
    ) -> AppResult<RunCompleted> {
        let mut tx = begin_serializable(&self.db).await?;

        let run = Self::load_run(&mut tx, org_id, run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(AppError::InvalidTransition(format!(
                "Stages can only be completed on an in_progress run (run is {})",
                run.status.as_str()
            )));
        }

        let stage = Self::load_stage(&mut tx, run_id, stage_id).await?;
        match stage.status {
            StageStatus::InProgress => {}
            StageStatus::Pending => {
                return Err(AppError::StageOrderViolation(format!(
                    "Stage '{}' has not been started",
                    stage.name
                )))
            }
            StageStatus::Completed => {
                return Err(AppError::StageOrderViolation(format!(
                    "Stage '{}' is already completed",
                    stage.name
                )))
            }
        }

        let max_position = sqlx::query_scalar::<_, i32>(
            "SELECT MAX(position) FROM run_stages WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;
        let is_final = stage.position == max_position;

        if !is_final && input.quantity_produced.is_some() {
            return Err(AppError::Validation {
                field: "quantity_produced".to_string(),
                message: "Only the final stage produces output".to_string(),
            });
        }

        let (_, mut warnings) = Self::consume_lines(
            &mut tx,
            org_id,
            user_id,
            run_id,
            Some(stage_id),
            &input.lines,
        )
        .await?;

        let labor_hours = input.labor_hours.unwrap_or(Decimal::ZERO);
        let labor_rate = input.labor_rate.or(run.labor_rate).unwrap_or(Decimal::ZERO);
        let labor_cost = labor_hours * labor_rate;
        let overhead_cost = run
            .overhead_policy
            .map(|policy| policy.overhead_for(labor_hours, labor_cost))
            .unwrap_or(Decimal::ZERO);

        sqlx::query(
            r#"
            UPDATE run_stages
            SET status = 'completed', labor_hours = $2, labor_rate = $3,
                labor_cost = $4, overhead_cost = $5, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(stage_id)
        .bind(labor_hours)
        .bind(labor_rate)
        .bind(labor_cost)
        .bind(overhead_cost)
        .execute(&mut *tx)
        .await?;

        if is_final {
            let quantity_produced = input.quantity_produced.ok_or_else(|| {
                AppError::InvalidQuantity(
                    "quantity_produced is required when completing the final stage".to_string(),
                )
            })?;
            validate_positive_quantity(quantity_produced).map_err(|e| {
                AppError::InvalidQuantity(e.to_string())
            })?;

            // Aggregate across all stages: materials from consumed lines,
            // labor and overhead from per-stage accruals
            let material_cost = sqlx::query_scalar::<_, Decimal>(
                "SELECT COALESCE(SUM(actual_quantity * unit_cost), 0) FROM run_materials \
                 WHERE run_id = $1 AND actual_quantity IS NOT NULL",
            )
            .bind(run_id)
            .fetch_one(&mut *tx)
            .await?;

            let (total_hours, total_labor, total_overhead) =
                sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
                    "SELECT COALESCE(SUM(labor_hours), 0), COALESCE(SUM(labor_cost), 0), \
                            COALESCE(SUM(overhead_cost), 0) \
                     FROM run_stages WHERE run_id = $1",
                )
                .bind(run_id)
                .fetch_one(&mut *tx)
                .await?;

            let total_cost = material_cost + total_labor + total_overhead;
            let cost_per_unit = total_cost / quantity_produced;

            let (_, output_warnings) = LedgerService::record_in_tx(
                &mut tx,
                org_id,
                user_id,
                RecordTransactionInput {
                    item_id: run.product_item_id,
                    kind: TransactionKind::ProductionOutput,
                    quantity: quantity_produced,
                    unit_cost: Some(cost_per_unit),
                    lot_id: None,
                    lot_number: None,
                    reference_type: Some("production_run".to_string()),
                    reference_id: Some(run_id),
                    note: input.note.clone(),
                },
            )
            .await?;
            warnings.extend(output_warnings);

            sqlx::query(
                r#"
                UPDATE production_runs
                SET status = 'completed',
                    actual_quantity = $2,
                    labor_hours = $3,
                    labor_cost = $4,
                    material_cost = $5,
                    overhead_cost = $6,
                    total_cost = $7,
                    cost_per_unit = $8,
                    notes = CASE WHEN $9::text IS NULL THEN notes
                                 WHEN notes IS NULL OR notes = '' THEN $9
                                 ELSE notes || E'\n' || $9 END,
                    completed_at = now()
                WHERE id = $1
                "#,
            )
            .bind(run_id)
            .bind(quantity_produced)
            .bind(total_hours)
            .bind(total_labor)
            .bind(material_cost)
            .bind(total_overhead)
            .bind(total_cost)
            .bind(cost_per_unit)
            .bind(&input.note)
            .execute(&mut *tx)
            .await?;
        } else if let Some(note) = &input.note {
            sqlx::query(
                "UPDATE production_runs \
                 SET notes = CASE WHEN notes IS NULL OR notes = '' THEN $2 \
                                  ELSE notes || E'\n' || $2 END \
                 WHERE id = $1",
            )
            .bind(run_id)
            .bind(note)
            .execute(&mut *tx)
            .await?;
        }

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;

        Ok(RunCompleted {
            run: detail,
            warnings,
        })
    }

    /// Append to the run's note trail. Works on terminal runs too; the note
    /// field is the one thing that stays writable after completion.
    pub async fn append_note(&self, org_id: Uuid, run_id: Uuid, note: &str) -> AppResult<RunDetail> {
        if note.trim().is_empty() {
            return Err(AppError::Validation {
                field: "note".to_string(),
                message: "Note cannot be empty".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        Self::load_run(&mut tx, org_id, run_id).await?;

        sqlx::query(
            "UPDATE production_runs \
             SET notes = CASE WHEN notes IS NULL OR notes = '' THEN $2 \
                              ELSE notes || E'\n' || $2 END \
             WHERE id = $1",
        )
        .bind(run_id)
        .bind(note.trim())
        .execute(&mut *tx)
        .await?;

        let detail = Self::load_detail(&mut *tx, org_id, run_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Get a run with its material lines and stages
    pub async fn get_run(&self, org_id: Uuid, run_id: Uuid) -> AppResult<RunDetail> {
        let mut conn = self.db.acquire().await?;
        Self::load_detail(&mut *conn, org_id, run_id).await
    }

    /// List runs, optionally filtered by status and product, newest first
    pub async fn list_runs(
        &self,
        org_id: Uuid,
        filter: RunFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ProductionRun>> {
        let status = filter.status.map(|s| s.as_str().to_string());

        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM production_runs
            WHERE org_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR product_item_id = $3)
            "#,
        )
        .bind(org_id)
        .bind(&status)
        .bind(filter.product_item_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS} FROM production_runs
            WHERE org_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR product_item_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(org_id)
        .bind(&status)
        .bind(filter.product_item_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(RunRow::into_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }

    // ---- internals ----

    fn require_transition(current: RunStatus, next: RunStatus) -> AppResult<()> {
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "{} -> {}",
                current.as_str(),
                next.as_str()
            )))
        }
    }

    async fn load_run(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        run_id: Uuid,
    ) -> AppResult<ProductionRun> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM production_runs WHERE id = $1 AND org_id = $2 FOR UPDATE"
        ))
        .bind(run_id)
        .bind(org_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Production run".to_string()))?;
        row.into_model()
    }

    async fn load_stage(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        run_id: Uuid,
        stage_id: Uuid,
    ) -> AppResult<RunStage> {
        let row = sqlx::query_as::<_, StageRow>(&format!(
            "SELECT {STAGE_COLUMNS} FROM run_stages WHERE id = $1 AND run_id = $2"
        ))
        .bind(stage_id)
        .bind(run_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Run stage".to_string()))?;
        row.into_model()
    }

    async fn load_detail(
        conn: &mut PgConnection,
        org_id: Uuid,
        run_id: Uuid,
    ) -> AppResult<RunDetail> {
        let run = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM production_runs WHERE id = $1 AND org_id = $2"
        ))
        .bind(run_id)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Production run".to_string()))?
        .into_model()?;

        let materials = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM run_materials WHERE run_id = $1 ORDER BY position"
        ))
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(RunMaterial::from)
        .collect();

        let stages = sqlx::query_as::<_, StageRow>(&format!(
            "SELECT {STAGE_COLUMNS} FROM run_stages WHERE run_id = $1 ORDER BY position"
        ))
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(StageRow::into_model)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(RunDetail {
            run,
            materials,
            stages,
        })
    }

    async fn insert_material_line(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        run_id: Uuid,
        stage_id: Option<Uuid>,
        position: i32,
        material: &RunMaterialInput,
    ) -> AppResult<Uuid> {
        validate_positive_quantity(material.planned_quantity).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;

        let item = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            "SELECT id, org_id, unit FROM items WHERE id = $1",
        )
        .bind(material.material_item_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        if item.1 != org_id {
            return Err(AppError::CrossTenant("Item".to_string()));
        }

        let unit = material.unit.clone().unwrap_or(item.2);

        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO run_materials (run_id, stage_id, position, material_item_id, planned_quantity, unit) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(run_id)
        .bind(stage_id)
        .bind(position)
        .bind(material.material_item_id)
        .bind(material.planned_quantity)
        .bind(&unit)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Consume the given actual lines against the ledger, fixing each line's
    /// unit cost at consumption. A planned line can be consumed at most once
    /// across all stages of a run. Returns (quantity, unit_cost) pairs for
    /// the cost breakdown plus any stock warnings.
    async fn consume_lines(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        user_id: Uuid,
        run_id: Uuid,
        stage_id: Option<Uuid>,
        lines: &[ActualLine],
    ) -> AppResult<(Vec<(Decimal, Decimal)>, Vec<StockWarning>)> {
        let mut consumed = Vec::with_capacity(lines.len());
        let mut warnings = Vec::new();

        for line in lines {
            validate_positive_quantity(line.actual_quantity).map_err(|e| {
                AppError::InvalidQuantity(e.to_string())
            })?;

            let (line_id, material_item_id, preset_lot_id) = match line.run_material_id {
                Some(id) => {
                    let row = sqlx::query_as::<_, (Uuid, Uuid, Option<Uuid>, Option<Decimal>)>(
                        "SELECT id, material_item_id, lot_id, actual_quantity FROM run_materials \
                         WHERE id = $1 AND run_id = $2",
                    )
                    .bind(id)
                    .bind(run_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Run material".to_string()))?;
                    // A line is consumed at most once; a second consumption
                    // would hit the ledger again while the aggregation at
                    // completion counts the line's actual_quantity only once.
                    // Reads inside the transaction see earlier writes, so this
                    // also rejects duplicate ids within one request.
                    if row.3.is_some() {
                        return Err(AppError::Validation {
                            field: "run_material_id".to_string(),
                            message: "Material line has already been consumed".to_string(),
                        });
                    }
                    (row.0, row.1, row.2)
                }
                None => {
                    let material_item_id =
                        line.material_item_id.ok_or_else(|| AppError::Validation {
                            field: "material_item_id".to_string(),
                            message: "Ad-hoc lines need a material item".to_string(),
                        })?;
                    let position = sqlx::query_scalar::<_, Option<i32>>(
                        "SELECT MAX(position) FROM run_materials WHERE run_id = $1",
                    )
                    .bind(run_id)
                    .fetch_one(&mut **tx)
                    .await?
                    .map_or(0, |max| max + 1);
                    let id = Self::insert_material_line(
                        tx,
                        org_id,
                        run_id,
                        stage_id,
                        position,
                        &RunMaterialInput {
                            material_item_id,
                            planned_quantity: line.actual_quantity,
                            unit: None,
                            stage_position: None,
                        },
                    )
                    .await?;
                    (id, material_item_id, None)
                }
            };

            let lot_id = line.lot_id.or(preset_lot_id);

            let (unit_cost, lot_number) = match lot_id {
                Some(lot_id) => {
                    let (lot, lot_warnings) = LotService::consume_in_tx(
                        tx,
                        org_id,
                        user_id,
                        lot_id,
                        line.actual_quantity,
                        "production_run",
                        run_id,
                    )
                    .await?;
                    if lot.material_item_id != material_item_id {
                        return Err(AppError::Validation {
                            field: "lot_id".to_string(),
                            message: "Lot belongs to a different material".to_string(),
                        });
                    }
                    warnings.extend(lot_warnings);
                    (lot.unit_cost, Some(lot.lot_number))
                }
                None => {
                    // No tracked lot: caller-supplied cost, else the item's
                    // last-known cost, else zero
                    let unit_cost = match line.unit_cost {
                        Some(cost) => cost,
                        None => sqlx::query_scalar::<_, Option<Decimal>>(
                            "SELECT unit_cost FROM items WHERE id = $1",
                        )
                        .bind(material_item_id)
                        .fetch_one(&mut **tx)
                        .await?
                        .unwrap_or(Decimal::ZERO),
                    };
                    let (_, line_warnings) = LedgerService::record_in_tx(
                        tx,
                        org_id,
                        user_id,
                        RecordTransactionInput {
                            item_id: material_item_id,
                            kind: TransactionKind::ProductionConsume,
                            quantity: -line.actual_quantity,
                            unit_cost: Some(unit_cost),
                            lot_id: None,
                            lot_number: line.lot_number.clone(),
                            reference_type: Some("production_run".to_string()),
                            reference_id: Some(run_id),
                            note: None,
                        },
                    )
                    .await?;
                    warnings.extend(line_warnings);
                    (unit_cost, line.lot_number.clone())
                }
            };

            sqlx::query(
                "UPDATE run_materials \
                 SET actual_quantity = $2, unit_cost = $3, lot_id = $4, lot_number = $5, \
                     stage_id = COALESCE(stage_id, $6) \
                 WHERE id = $1",
            )
            .bind(line_id)
            .bind(line.actual_quantity)
            .bind(unit_cost)
            .bind(lot_id)
            .bind(&lot_number)
            .bind(stage_id)
            .execute(&mut **tx)
            .await?;

            consumed.push((line.actual_quantity, unit_cost));
        }

        Ok((consumed, warnings))
    }
}
