//! Lot tracking service
//!
//! A lot is a traceable batch of a raw material received at a known cost.
//! Receiving a lot and recording its purchase on the ledger happen in one
//! database transaction; the remaining quantity is then maintained entirely
//! by ledger writes that reference the lot.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{begin_serializable, LedgerService, RecordTransactionInput};
use shared::{
    generate_lot_number, validate_lot_number, validate_positive_quantity, Lot, LotMutation,
    LotStatus, PaginatedResponse, Pagination, PaginationMeta, StockWarning, TransactionKind,
};

/// Service for raw-material lot tracking
#[derive(Clone)]
pub struct LotService {
    db: PgPool,
}

/// Input for receiving a new lot
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLotInput {
    pub material_item_id: Uuid,
    /// Generated as L-YYYYMMDD-NNN when omitted
    pub lot_number: Option<String>,
    pub quantity_received: Decimal,
    pub unit_cost: Decimal,
    /// Defaults to today
    pub received_date: Option<NaiveDate>,
    pub source_type: Option<String>,
    pub source_id: Option<Uuid>,
    pub note: Option<String>,
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFilter {
    pub material_item_id: Option<Uuid>,
    pub status: Option<LotStatus>,
}

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: Uuid,
    org_id: Uuid,
    material_item_id: Uuid,
    lot_number: String,
    quantity_received: Decimal,
    quantity_remaining: Decimal,
    unit_cost: Decimal,
    received_date: NaiveDate,
    source_type: Option<String>,
    source_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LotRow {
    fn into_model(self) -> AppResult<Lot> {
        let status = LotStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown lot status: {}", self.status)))?;
        Ok(Lot {
            id: self.id,
            org_id: self.org_id,
            material_item_id: self.material_item_id,
            lot_number: self.lot_number,
            quantity_received: self.quantity_received,
            quantity_remaining: self.quantity_remaining,
            unit_cost: self.unit_cost,
            received_date: self.received_date,
            source_type: self.source_type,
            source_id: self.source_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const LOT_COLUMNS: &str = "id, org_id, material_item_id, lot_number, quantity_received, \
     quantity_remaining, unit_cost, received_date, source_type, source_id, status, \
     created_at, updated_at";

impl LotService {
    /// Create a new LotService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive a new lot. Inserts the lot row and records the matching
    /// `purchase_receive` ledger transaction in the same database
    /// transaction, so item stock and lot remainder move together.
    pub async fn create_lot(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        input: CreateLotInput,
    ) -> AppResult<LotMutation> {
        validate_positive_quantity(input.quantity_received).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;
        if let Some(lot_number) = &input.lot_number {
            validate_lot_number(lot_number).map_err(|e| AppError::Validation {
                field: "lot_number".to_string(),
                message: e.to_string(),
            })?;
        }
        if input.unit_cost < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "unit_cost".to_string(),
                message: "Unit cost cannot be negative".to_string(),
            });
        }

        let mut tx = begin_serializable(&self.db).await?;

        let material = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            "SELECT id, org_id, item_type FROM items WHERE id = $1",
        )
        .bind(input.material_item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        if material.1 != org_id {
            return Err(AppError::CrossTenant("Item".to_string()));
        }
        if material.2 != "raw_material" {
            return Err(AppError::Validation {
                field: "material_item_id".to_string(),
                message: "Lots can only be created for raw materials".to_string(),
            });
        }

        let received_date = input
            .received_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let lot_number = match input.lot_number {
            Some(n) => n,
            None => {
                let sequence = next_sequence(&mut tx, org_id, "lot", received_date).await?;
                generate_lot_number(received_date, sequence)
            }
        };

        // quantity_remaining starts at zero; the purchase_receive ledger
        // write below brings it to the received quantity, keeping the ledger
        // the sole writer of that counter.
        let lot_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO lots (org_id, material_item_id, lot_number, quantity_received,
                              quantity_remaining, unit_cost, received_date, source_type, source_id)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(input.material_item_id)
        .bind(&lot_number)
        .bind(input.quantity_received)
        .bind(input.unit_cost)
        .bind(received_date)
        .bind(&input.source_type)
        .bind(input.source_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateLot(lot_number.clone())
            }
            _ => AppError::DatabaseError(e),
        })?;

        let (_, warnings) = LedgerService::record_in_tx(
            &mut tx,
            org_id,
            user_id,
            RecordTransactionInput {
                item_id: input.material_item_id,
                kind: TransactionKind::PurchaseReceive,
                quantity: input.quantity_received,
                unit_cost: Some(input.unit_cost),
                lot_id: Some(lot_id),
                lot_number: None,
                reference_type: input.source_type.clone(),
                reference_id: input.source_id,
                note: input.note,
            },
        )
        .await?;

        let row = Self::fetch_in_tx(&mut tx, org_id, lot_id).await?;
        tx.commit().await?;

        Ok(LotMutation {
            lot: row,
            warnings,
        })
    }

    /// Consume from a lot inside an open transaction. Production-engine
    /// internal: there is no direct HTTP surface for this.
    pub(crate) async fn consume_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        user_id: Uuid,
        lot_id: Uuid,
        quantity: Decimal,
        reference_type: &str,
        reference_id: Uuid,
    ) -> AppResult<(Lot, Vec<StockWarning>)> {
        validate_positive_quantity(quantity).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;

        let (lot_org, material_item_id, unit_cost) =
            sqlx::query_as::<_, (Uuid, Uuid, Decimal)>(
                "SELECT org_id, material_item_id, unit_cost FROM lots WHERE id = $1",
            )
            .bind(lot_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        if lot_org != org_id {
            return Err(AppError::CrossTenant("Lot".to_string()));
        }

        // The lot's receipt cost is authoritative for costing this consumption
        let (_, warnings) = LedgerService::record_in_tx(
            tx,
            org_id,
            user_id,
            RecordTransactionInput {
                item_id: material_item_id,
                kind: TransactionKind::ProductionConsume,
                quantity: -quantity,
                unit_cost: Some(unit_cost),
                lot_id: Some(lot_id),
                lot_number: None,
                reference_type: Some(reference_type.to_string()),
                reference_id: Some(reference_id),
                note: None,
            },
        )
        .await?;

        let lot = Self::fetch_in_tx(tx, org_id, lot_id).await?;
        Ok((lot, warnings))
    }

    /// Get a lot by id
    pub async fn get_lot(&self, org_id: Uuid, lot_id: Uuid) -> AppResult<Lot> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE id = $1 AND org_id = $2"
        ))
        .bind(lot_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        row.into_model()
    }

    /// List lots, optionally filtered by material and status, newest first
    pub async fn list_lots(
        &self,
        org_id: Uuid,
        filter: LotFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Lot>> {
        let status = filter.status.map(|s| s.as_str().to_string());

        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM lots
            WHERE org_id = $1
              AND ($2::uuid IS NULL OR material_item_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
            "#,
        )
        .bind(org_id)
        .bind(filter.material_item_id)
        .bind(&status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {LOT_COLUMNS} FROM lots
            WHERE org_id = $1
              AND ($2::uuid IS NULL OR material_item_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY received_date DESC, lot_number DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(org_id)
        .bind(filter.material_item_id)
        .bind(&status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(LotRow::into_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }

    async fn fetch_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        lot_id: Uuid,
    ) -> AppResult<Lot> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE id = $1 AND org_id = $2"
        ))
        .bind(lot_id)
        .bind(org_id)
        .fetch_one(&mut **tx)
        .await?;
        row.into_model()
    }
}

/// Next per-day per-org sequence value for a scope ("lot" or "run")
pub(crate) async fn next_sequence(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    org_id: Uuid,
    scope: &str,
    date: NaiveDate,
) -> AppResult<i32> {
    let value = sqlx::query_scalar::<_, i32>("SELECT next_daily_sequence($1, $2, $3)")
        .bind(org_id)
        .bind(scope)
        .bind(date)
        .fetch_one(&mut **tx)
        .await?;
    Ok(value)
}
