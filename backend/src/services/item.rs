//! Item catalog service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{
    validate_metadata, validate_sku, validate_unit, Item, ItemStatus, ItemType,
    PaginatedResponse, Pagination, PaginationMeta,
};

/// Service for catalog item management
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
}

/// Input for creating an item
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemInput {
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub unit: String,
    pub reorder_point: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Input for updating an item's descriptive fields. Absent fields are left
/// unchanged; `reorder_point` and `unit_cost` additionally accept an
/// explicit null to clear the stored value. Stock is never writable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItemInput {
    pub name: Option<String>,
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub reorder_point: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub unit_cost: Option<Option<Decimal>>,
    pub status: Option<ItemStatus>,
    pub metadata: Option<serde_json::Value>,
}

/// Distinguishes an absent field (None) from an explicit null (Some(None))
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    org_id: Uuid,
    sku: String,
    name: String,
    item_type: String,
    unit: String,
    reorder_point: Option<Decimal>,
    unit_cost: Option<Decimal>,
    current_stock: Decimal,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_model(self) -> AppResult<Item> {
        let item_type = ItemType::from_str(&self.item_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown item type: {}", self.item_type)))?;
        let status = ItemStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown item status: {}", self.status)))?;
        Ok(Item {
            id: self.id,
            org_id: self.org_id,
            sku: self.sku,
            name: self.name,
            item_type,
            unit: self.unit,
            reorder_point: self.reorder_point,
            unit_cost: self.unit_cost,
            current_stock: self.current_stock,
            status,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ITEM_COLUMNS: &str = "id, org_id, sku, name, item_type, unit, reorder_point, unit_cost, \
     current_stock, status, metadata, created_at, updated_at";

impl ItemService {
    /// Create a new ItemService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a new catalog item
    pub async fn create_item(&self, org_id: Uuid, input: CreateItemInput) -> AppResult<Item> {
        validate_sku(&input.sku).map_err(|e| AppError::Validation {
            field: "sku".to_string(),
            message: e.to_string(),
        })?;
        validate_unit(&input.unit).map_err(|e| AppError::Validation {
            field: "unit".to_string(),
            message: e.to_string(),
        })?;
        validate_metadata(&input.metadata).map_err(|e| AppError::Validation {
            field: "metadata".to_string(),
            message: e.to_string(),
        })?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO items (org_id, sku, name, item_type, unit, reorder_point, unit_cost, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(org_id)
        .bind(&input.sku)
        .bind(&input.name)
        .bind(input.item_type.as_str())
        .bind(&input.unit)
        .bind(input.reorder_point)
        .bind(input.unit_cost)
        .bind(&input.metadata)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Validation {
                    field: "sku".to_string(),
                    message: format!("SKU '{}' already exists", input.sku),
                }
            }
            _ => AppError::DatabaseError(e),
        })?;

        row.into_model()
    }

    /// Get an item by id
    pub async fn get_item(&self, org_id: Uuid, item_id: Uuid) -> AppResult<Item> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 AND org_id = $2"
        ))
        .bind(item_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        row.into_model()
    }

    /// List items, optionally filtered by type and status
    pub async fn list_items(
        &self,
        org_id: Uuid,
        filter: ItemFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Item>> {
        let item_type = filter.item_type.map(|t| t.as_str().to_string());
        let status = filter.status.map(|s| s.as_str().to_string());

        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM items
            WHERE org_id = $1
              AND ($2::varchar IS NULL OR item_type = $2)
              AND ($3::varchar IS NULL OR status = $3)
            "#,
        )
        .bind(org_id)
        .bind(&item_type)
        .bind(&status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE org_id = $1
              AND ($2::varchar IS NULL OR item_type = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY sku
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(org_id)
        .bind(&item_type)
        .bind(&status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(ItemRow::into_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }

    /// Update descriptive fields and status. Status moves freely between the
    /// three states; there is no hard delete.
    pub async fn update_item(
        &self,
        org_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> AppResult<Item> {
        if let Some(unit) = &input.unit {
            validate_unit(unit).map_err(|e| AppError::Validation {
                field: "unit".to_string(),
                message: e.to_string(),
            })?;
        }
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata).map_err(|e| AppError::Validation {
                field: "metadata".to_string(),
                message: e.to_string(),
            })?;
        }

        let status = input.status.map(|s| s.as_str().to_string());

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE items
            SET name = COALESCE($3, name),
                unit = COALESCE($4, unit),
                reorder_point = CASE WHEN $5 THEN $6 ELSE reorder_point END,
                unit_cost = CASE WHEN $7 THEN $8 ELSE unit_cost END,
                status = COALESCE($9, status),
                metadata = COALESCE($10, metadata)
            WHERE id = $1 AND org_id = $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id)
        .bind(org_id)
        .bind(&input.name)
        .bind(&input.unit)
        .bind(input.reorder_point.is_some())
        .bind(input.reorder_point.flatten())
        .bind(input.unit_cost.is_some())
        .bind(input.unit_cost.flatten())
        .bind(&status)
        .bind(&input.metadata)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        row.into_model()
    }

    /// List active items whose cached stock is at or below their reorder
    /// point. Items without a reorder point never appear.
    pub async fn list_below_reorder(&self, org_id: Uuid) -> AppResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE org_id = $1
              AND status = 'active'
              AND reorder_point IS NOT NULL
              AND current_stock <= reorder_point
            ORDER BY sku
            "#
        ))
        .bind(org_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ItemRow::into_model).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn update_input_distinguishes_absent_from_explicit_null() {
        let absent: UpdateItemInput = serde_json::from_str(r#"{"name": "Sugar"}"#).unwrap();
        assert_eq!(absent.reorder_point, None);
        assert_eq!(absent.unit_cost, None);

        let cleared: UpdateItemInput =
            serde_json::from_str(r#"{"reorder_point": null, "unit_cost": null}"#).unwrap();
        assert_eq!(cleared.reorder_point, Some(None));
        assert_eq!(cleared.unit_cost, Some(None));

        let set: UpdateItemInput = serde_json::from_str(r#"{"unit_cost": "2.50"}"#).unwrap();
        assert_eq!(set.unit_cost, Some(Some(Decimal::from_str("2.50").unwrap())));
    }
}
