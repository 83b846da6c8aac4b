//! Bill-of-materials template service
//!
//! BOMs are pure templates: a run snapshots a BOM's component list at
//! creation time and never looks back. Editing or deactivating a version
//! therefore never touches historical runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{
    validate_positive_quantity, validate_unit, validate_version_label, Bom, BomComponent,
    BomWithComponents, PaginatedResponse, Pagination, PaginationMeta,
};

/// Service for BOM template management
#[derive(Clone)]
pub struct BomService {
    db: PgPool,
}

/// A component line in a create/update request
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentInput {
    pub material_item_id: Uuid,
    pub quantity: Decimal,
    pub unit: String,
}

/// Input for creating a BOM version
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBomInput {
    pub product_item_id: Uuid,
    pub version_label: String,
    pub output_quantity: Decimal,
    pub output_unit: String,
    pub components: Vec<ComponentInput>,
    pub notes: Option<String>,
    /// Activate immediately, deactivating any sibling version
    #[serde(default)]
    pub activate: bool,
}

/// Input for updating a BOM version. A supplied component list replaces the
/// existing one wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBomInput {
    pub version_label: Option<String>,
    pub output_quantity: Option<Decimal>,
    pub output_unit: Option<String>,
    pub components: Option<Vec<ComponentInput>>,
    pub notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct BomRow {
    id: Uuid,
    org_id: Uuid,
    product_item_id: Uuid,
    version_label: String,
    is_active: bool,
    output_quantity: Decimal,
    output_unit: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BomRow> for Bom {
    fn from(row: BomRow) -> Self {
        Bom {
            id: row.id,
            org_id: row.org_id,
            product_item_id: row.product_item_id,
            version_label: row.version_label,
            is_active: row.is_active,
            output_quantity: row.output_quantity,
            output_unit: row.output_unit,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ComponentRow {
    id: Uuid,
    bom_id: Uuid,
    position: i32,
    material_item_id: Uuid,
    quantity: Decimal,
    unit: String,
}

impl From<ComponentRow> for BomComponent {
    fn from(row: ComponentRow) -> Self {
        BomComponent {
            id: row.id,
            bom_id: row.bom_id,
            position: row.position,
            material_item_id: row.material_item_id,
            quantity: row.quantity,
            unit: row.unit,
        }
    }
}

const BOM_COLUMNS: &str = "id, org_id, product_item_id, version_label, is_active, \
     output_quantity, output_unit, notes, created_at, updated_at";

impl BomService {
    /// Create a new BomService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a BOM version with its components in one transaction
    pub async fn create_bom(&self, org_id: Uuid, input: CreateBomInput) -> AppResult<BomWithComponents> {
        validate_version_label(&input.version_label).map_err(|e| AppError::Validation {
            field: "version_label".to_string(),
            message: e.to_string(),
        })?;
        validate_positive_quantity(input.output_quantity).map_err(|e| {
            AppError::InvalidQuantity(e.to_string())
        })?;
        Self::validate_components(&input.components)?;

        let mut tx = self.db.begin().await?;

        let product = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, org_id FROM items WHERE id = $1",
        )
        .bind(input.product_item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        if product.1 != org_id {
            return Err(AppError::CrossTenant("Item".to_string()));
        }

        if input.activate {
            sqlx::query(
                "UPDATE boms SET is_active = false WHERE org_id = $1 AND product_item_id = $2 AND is_active",
            )
            .bind(org_id)
            .bind(input.product_item_id)
            .execute(&mut *tx)
            .await?;
        }

        let bom_row = sqlx::query_as::<_, BomRow>(&format!(
            r#"
            INSERT INTO boms (org_id, product_item_id, version_label, is_active,
                              output_quantity, output_unit, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {BOM_COLUMNS}
            "#
        ))
        .bind(org_id)
        .bind(input.product_item_id)
        .bind(&input.version_label)
        .bind(input.activate)
        .bind(input.output_quantity)
        .bind(&input.output_unit)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Validation {
                    field: "version_label".to_string(),
                    message: format!(
                        "Version '{}' already exists for this product",
                        input.version_label
                    ),
                }
            }
            _ => AppError::DatabaseError(e),
        })?;

        let components =
            Self::insert_components(&mut tx, bom_row.id, &input.components).await?;

        tx.commit().await?;

        Ok(BomWithComponents {
            bom: bom_row.into(),
            components,
        })
    }

    /// Get a BOM with its ordered components
    pub async fn get_bom(&self, org_id: Uuid, bom_id: Uuid) -> AppResult<BomWithComponents> {
        let bom_row = sqlx::query_as::<_, BomRow>(&format!(
            "SELECT {BOM_COLUMNS} FROM boms WHERE id = $1 AND org_id = $2"
        ))
        .bind(bom_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("BOM".to_string()))?;

        let components = self.fetch_components(bom_id).await?;

        Ok(BomWithComponents {
            bom: bom_row.into(),
            components,
        })
    }

    /// List BOM versions, optionally for one product
    pub async fn list_boms(
        &self,
        org_id: Uuid,
        product_item_id: Option<Uuid>,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Bom>> {
        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM boms
            WHERE org_id = $1 AND ($2::uuid IS NULL OR product_item_id = $2)
            "#,
        )
        .bind(org_id)
        .bind(product_item_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, BomRow>(&format!(
            r#"
            SELECT {BOM_COLUMNS} FROM boms
            WHERE org_id = $1 AND ($2::uuid IS NULL OR product_item_id = $2)
            ORDER BY product_item_id, created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(org_id)
        .bind(product_item_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data: rows.into_iter().map(Bom::from).collect(),
            pagination: PaginationMeta::new(&pagination, total_items.max(0) as u64),
        })
    }

    /// Update a BOM version. A supplied component list replaces the current
    /// one; runs that already snapshotted the old list are unaffected.
    pub async fn update_bom(
        &self,
        org_id: Uuid,
        bom_id: Uuid,
        input: UpdateBomInput,
    ) -> AppResult<BomWithComponents> {
        if let Some(label) = &input.version_label {
            validate_version_label(label).map_err(|e| AppError::Validation {
                field: "version_label".to_string(),
                message: e.to_string(),
            })?;
        }
        if let Some(qty) = input.output_quantity {
            validate_positive_quantity(qty).map_err(|e| {
                AppError::InvalidQuantity(e.to_string())
            })?;
        }
        if let Some(components) = &input.components {
            Self::validate_components(components)?;
        }

        let mut tx = self.db.begin().await?;

        let bom_row = sqlx::query_as::<_, BomRow>(&format!(
            r#"
            UPDATE boms
            SET version_label = COALESCE($3, version_label),
                output_quantity = COALESCE($4, output_quantity),
                output_unit = COALESCE($5, output_unit),
                notes = COALESCE($6, notes)
            WHERE id = $1 AND org_id = $2
            RETURNING {BOM_COLUMNS}
            "#
        ))
        .bind(bom_id)
        .bind(org_id)
        .bind(&input.version_label)
        .bind(input.output_quantity)
        .bind(&input.output_unit)
        .bind(&input.notes)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("BOM".to_string()))?;

        let components = match &input.components {
            Some(list) => {
                sqlx::query("DELETE FROM bom_components WHERE bom_id = $1")
                    .bind(bom_id)
                    .execute(&mut *tx)
                    .await?;
                Self::insert_components(&mut tx, bom_id, list).await?
            }
            None => {
                let rows = sqlx::query_as::<_, ComponentRow>(
                    "SELECT id, bom_id, position, material_item_id, quantity, unit \
                     FROM bom_components WHERE bom_id = $1 ORDER BY position",
                )
                .bind(bom_id)
                .fetch_all(&mut *tx)
                .await?;
                rows.into_iter().map(BomComponent::from).collect()
            }
        };

        tx.commit().await?;

        Ok(BomWithComponents {
            bom: bom_row.into(),
            components,
        })
    }

    /// Activate a version, deactivating any sibling version of the same
    /// product in the same transaction
    pub async fn activate_bom(&self, org_id: Uuid, bom_id: Uuid) -> AppResult<Bom> {
        let mut tx = self.db.begin().await?;

        let product_item_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT product_item_id FROM boms WHERE id = $1 AND org_id = $2",
        )
        .bind(bom_id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("BOM".to_string()))?;

        sqlx::query(
            "UPDATE boms SET is_active = false \
             WHERE org_id = $1 AND product_item_id = $2 AND is_active AND id <> $3",
        )
        .bind(org_id)
        .bind(product_item_id)
        .bind(bom_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, BomRow>(&format!(
            "UPDATE boms SET is_active = true WHERE id = $1 RETURNING {BOM_COLUMNS}"
        ))
        .bind(bom_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Snapshot a BOM's ordered component list for run pre-fill
    pub async fn instantiate(&self, org_id: Uuid, bom_id: Uuid) -> AppResult<Vec<BomComponent>> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM boms WHERE id = $1 AND org_id = $2)",
        )
        .bind(bom_id)
        .bind(org_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("BOM".to_string()));
        }

        self.fetch_components(bom_id).await
    }

    fn validate_components(components: &[ComponentInput]) -> AppResult<()> {
        if components.is_empty() {
            return Err(AppError::Validation {
                field: "components".to_string(),
                message: "A BOM needs at least one component".to_string(),
            });
        }
        for component in components {
            validate_positive_quantity(component.quantity).map_err(|e| {
                AppError::InvalidQuantity(e.to_string())
            })?;
            validate_unit(&component.unit).map_err(|e| AppError::Validation {
                field: "unit".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn insert_components(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        bom_id: Uuid,
        components: &[ComponentInput],
    ) -> AppResult<Vec<BomComponent>> {
        let mut inserted = Vec::with_capacity(components.len());
        for (position, component) in components.iter().enumerate() {
            let row = sqlx::query_as::<_, ComponentRow>(
                r#"
                INSERT INTO bom_components (bom_id, position, material_item_id, quantity, unit)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, bom_id, position, material_item_id, quantity, unit
                "#,
            )
            .bind(bom_id)
            .bind(position as i32)
            .bind(component.material_item_id)
            .bind(component.quantity)
            .bind(&component.unit)
            .fetch_one(&mut **tx)
            .await?;
            inserted.push(row.into());
        }
        Ok(inserted)
    }

    async fn fetch_components(&self, bom_id: Uuid) -> AppResult<Vec<BomComponent>> {
        let rows = sqlx::query_as::<_, ComponentRow>(
            "SELECT id, bom_id, position, material_item_id, quantity, unit \
             FROM bom_components WHERE bom_id = $1 ORDER BY position",
        )
        .bind(bom_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(BomComponent::from).collect())
    }
}
