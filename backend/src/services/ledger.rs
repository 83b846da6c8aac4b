//! Transaction ledger service: the append-only log of stock-changing events
//!
//! This service is the single source of truth for stock levels. Every
//! mutation of `items.current_stock` and `lots.quantity_remaining` happens
//! here, inside the same database transaction as the ledger insert, so the
//! cached counters can never drift from the transaction history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{
    validate_non_zero_quantity, InventoryTransaction, PaginatedResponse, Pagination,
    PaginationMeta, StockWarning, TransactionKind, TransactionRecorded,
};

/// Ledger service for recording and querying inventory transactions
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for recording a transaction
#[derive(Debug, Clone, Deserialize)]
pub struct RecordTransactionInput {
    pub item_id: Uuid,
    pub kind: TransactionKind,
    /// Signed delta; consumption is negative. Zero is rejected.
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub lot_id: Option<Uuid>,
    /// Free-text lot identifier recorded when no tracked lot is linked
    pub lot_number: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
}

/// Filters for transaction history queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub kind: Option<TransactionKind>,
    pub lot_number: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

/// Cached balance together with the live ledger sum, for consistency audits
#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceView {
    pub item_id: Uuid,
    pub current_stock: Decimal,
    pub ledger_sum: Decimal,
}

/// Database row for a ledger transaction
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    org_id: Uuid,
    item_id: Uuid,
    kind: String,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    lot_id: Option<Uuid>,
    lot_number: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    note: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_model(self) -> AppResult<InventoryTransaction> {
        let kind = TransactionKind::from_str(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown transaction kind: {}", self.kind)))?;
        Ok(InventoryTransaction {
            id: self.id,
            org_id: self.org_id,
            item_id: self.item_id,
            kind,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost,
            lot_id: self.lot_id,
            lot_number: self.lot_number,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            note: self.note,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

const TRANSACTION_COLUMNS: &str = "id, org_id, item_id, kind, quantity, unit_cost, total_cost, \
     lot_id, lot_number, reference_type, reference_id, note, created_by, created_at";

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a single transaction as one atomic unit: insert the immutable
    /// row, bump the item's cached stock, and bump the referenced lot's
    /// remaining quantity. Negative resulting balances are allowed and
    /// surfaced as warnings.
    pub async fn record_transaction(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        input: RecordTransactionInput,
    ) -> AppResult<TransactionRecorded> {
        let mut tx = begin_serializable(&self.db).await?;
        let (transaction, warnings) =
            Self::record_in_tx(&mut tx, org_id, user_id, input).await?;
        tx.commit().await?;

        Ok(TransactionRecorded {
            transaction,
            warnings,
        })
    }

    /// Core write path, shared with the lot tracker and the production run
    /// engine so their multi-step operations commit in a single database
    /// transaction. Callers own the transaction lifecycle.
    pub(crate) async fn record_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
        user_id: Uuid,
        input: RecordTransactionInput,
    ) -> AppResult<(InventoryTransaction, Vec<StockWarning>)> {
        validate_non_zero_quantity(input.quantity).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;

        // Resolve the item without an org filter so a cross-tenant id can be
        // told apart from a missing one at this level.
        let item = sqlx::query_as::<_, (Uuid, Uuid)>("SELECT id, org_id FROM items WHERE id = $1")
            .bind(input.item_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        if item.1 != org_id {
            return Err(AppError::CrossTenant("Item".to_string()));
        }

        if let Some(lot_id) = input.lot_id {
            let lot = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
                "SELECT id, org_id, material_item_id FROM lots WHERE id = $1",
            )
            .bind(lot_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

            if lot.1 != org_id {
                return Err(AppError::CrossTenant("Lot".to_string()));
            }
            if lot.2 != input.item_id {
                return Err(AppError::Validation {
                    field: "lot_id".to_string(),
                    message: "Lot belongs to a different material".to_string(),
                });
            }
        }

        let total_cost = input.unit_cost.map(|uc| input.quantity.abs() * uc);

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO inventory_transactions (
                org_id, item_id, kind, quantity, unit_cost, total_cost,
                lot_id, lot_number, reference_type, reference_id, note, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(org_id)
        .bind(input.item_id)
        .bind(input.kind.as_str())
        .bind(input.quantity)
        .bind(input.unit_cost)
        .bind(total_cost)
        .bind(input.lot_id)
        .bind(&input.lot_number)
        .bind(&input.reference_type)
        .bind(input.reference_id)
        .bind(&input.note)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        let mut warnings = Vec::new();

        let new_stock = sqlx::query_scalar::<_, Decimal>(
            "UPDATE items SET current_stock = current_stock + $1 WHERE id = $2 RETURNING current_stock",
        )
        .bind(input.quantity)
        .bind(input.item_id)
        .fetch_one(&mut **tx)
        .await?;

        if new_stock < Decimal::ZERO {
            warnings.push(StockWarning::NegativeStock {
                item_id: input.item_id,
                resulting_stock: new_stock,
            });
        }

        // Inbound events carry the latest known cost for the item.
        if matches!(
            input.kind,
            TransactionKind::PurchaseReceive | TransactionKind::ProductionOutput
        ) {
            if let Some(unit_cost) = input.unit_cost {
                sqlx::query("UPDATE items SET unit_cost = $1 WHERE id = $2")
                    .bind(unit_cost)
                    .bind(input.item_id)
                    .execute(&mut **tx)
                    .await?;
            }
        }

        if let Some(lot_id) = input.lot_id {
            let remaining = sqlx::query_scalar::<_, Decimal>(
                r#"
                UPDATE lots
                SET quantity_remaining = quantity_remaining + $1,
                    status = CASE WHEN quantity_remaining + $1 <= 0 THEN 'depleted' ELSE 'active' END
                WHERE id = $2
                RETURNING quantity_remaining
                "#,
            )
            .bind(input.quantity)
            .bind(lot_id)
            .fetch_one(&mut **tx)
            .await?;

            if remaining < Decimal::ZERO {
                warnings.push(StockWarning::NegativeLotRemainder {
                    lot_id,
                    quantity_remaining: remaining,
                });
            }
        }

        Ok((row.into_model()?, warnings))
    }

    /// Get the cached balance for an item, alongside the live ledger sum.
    /// The two are equal whenever the system is healthy.
    pub async fn get_balance(&self, org_id: Uuid, item_id: Uuid) -> AppResult<BalanceView> {
        let current_stock = sqlx::query_scalar::<_, Decimal>(
            "SELECT current_stock FROM items WHERE id = $1 AND org_id = $2",
        )
        .bind(item_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        let ledger_sum = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_transactions \
             WHERE item_id = $1 AND org_id = $2",
        )
        .bind(item_id)
        .bind(org_id)
        .fetch_one(&self.db)
        .await?;

        Ok(BalanceView {
            item_id,
            current_stock,
            ledger_sum,
        })
    }

    /// Get transaction history for an item, newest first, paginated.
    /// The page size is honored exactly as requested.
    pub async fn get_history(
        &self,
        org_id: Uuid,
        item_id: Uuid,
        filter: HistoryFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryTransaction>> {
        let item_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM items WHERE id = $1 AND org_id = $2)",
        )
        .bind(item_id)
        .bind(org_id)
        .fetch_one(&self.db)
        .await?;

        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        let kind = filter.kind.map(|k| k.as_str().to_string());

        let where_clause = r#"
            WHERE t.org_id = $1 AND t.item_id = $2
              AND ($3::varchar IS NULL OR t.kind = $3)
              AND ($4::varchar IS NULL OR t.lot_number = $4
                   OR t.lot_id IN (SELECT id FROM lots WHERE org_id = $1 AND lot_number = $4))
              AND ($5::date IS NULL OR t.created_at >= $5::date)
              AND ($6::date IS NULL OR t.created_at < $6::date + 1)
              AND ($7::varchar IS NULL OR t.reference_type = $7)
              AND ($8::uuid IS NULL OR t.reference_id = $8)
        "#;

        let total_items = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM inventory_transactions t {where_clause}"
        ))
        .bind(org_id)
        .bind(item_id)
        .bind(&kind)
        .bind(&filter.lot_number)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.reference_type)
        .bind(filter.reference_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM inventory_transactions t
            {where_clause}
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $9 OFFSET $10
            "#
        ))
        .bind(org_id)
        .bind(item_id)
        .bind(&kind)
        .bind(&filter.lot_number)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.reference_type)
        .bind(filter.reference_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(TransactionRow::into_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }

    /// List recent transactions across the organization, newest first
    pub async fn list_transactions(
        &self,
        org_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryTransaction>> {
        let total_items = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM inventory_transactions WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM inventory_transactions
            WHERE org_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(org_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(TransactionRow::into_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }
}

/// Begin a serializable transaction. Mutations read a cached counter,
/// compute the new value, and write both the ledger row and the counter;
/// serializable isolation prevents lost updates when two of them race on
/// the same item or lot.
pub(crate) async fn begin_serializable(
    db: &PgPool,
) -> AppResult<sqlx::Transaction<'_, Postgres>> {
    let mut tx = db.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}
