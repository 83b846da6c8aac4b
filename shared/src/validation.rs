//! Boundary validation utilities for the CraftCost platform

use rust_decimal::Decimal;

/// Validate SKU format (1-64 chars, no whitespace)
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.trim().is_empty() {
        return Err("SKU cannot be empty");
    }
    if sku.len() > 64 {
        return Err("SKU must be at most 64 characters");
    }
    if sku.chars().any(|c| c.is_whitespace()) {
        return Err("SKU cannot contain whitespace");
    }
    Ok(())
}

/// Validate a unit of measure label
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    if unit.trim().is_empty() {
        return Err("Unit of measure cannot be empty");
    }
    if unit.len() > 32 {
        return Err("Unit of measure must be at most 32 characters");
    }
    Ok(())
}

/// Validate a metadata map: a flat JSON object whose values are scalars.
/// Metadata is stored opaquely and never interpreted by engine logic, so the
/// only contract is its shape.
pub fn validate_metadata(metadata: &serde_json::Value) -> Result<(), &'static str> {
    let obj = metadata
        .as_object()
        .ok_or("Metadata must be a JSON object")?;

    for value in obj.values() {
        match value {
            serde_json::Value::String(_)
            | serde_json::Value::Number(_)
            | serde_json::Value::Bool(_)
            | serde_json::Value::Null => {}
            _ => return Err("Metadata values must be scalars"),
        }
    }
    Ok(())
}

/// Ledger quantities are signed deltas; zero is meaningless and rejected.
pub fn validate_non_zero_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.is_zero() {
        return Err("Quantity cannot be zero");
    }
    Ok(())
}

/// Quantities that must be strictly positive (receipts, produced output)
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a BOM version label (non-empty, at most 32 chars)
pub fn validate_version_label(label: &str) -> Result<(), &'static str> {
    if label.trim().is_empty() {
        return Err("Version label cannot be empty");
    }
    if label.len() > 32 {
        return Err("Version label must be at most 32 characters");
    }
    Ok(())
}

/// Validate a user-entered lot number (non-empty, at most 64 chars)
pub fn validate_lot_number(lot_number: &str) -> Result<(), &'static str> {
    if lot_number.trim().is_empty() {
        return Err("Lot number cannot be empty");
    }
    if lot_number.len() > 64 {
        return Err("Lot number must be at most 64 characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_sku_valid() {
        assert!(validate_sku("SUGAR-001").is_ok());
        assert!(validate_sku("bar_choc_70").is_ok());
    }

    #[test]
    fn test_validate_sku_invalid() {
        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_unit() {
        assert!(validate_unit("kg").is_ok());
        assert!(validate_unit("").is_err());
        assert!(validate_unit(&"u".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_metadata_scalars_ok() {
        let metadata = json!({
            "supplier_code": "ACME",
            "shelf_life_days": 90,
            "organic": true,
            "notes": null
        });
        assert!(validate_metadata(&metadata).is_ok());
    }

    #[test]
    fn test_validate_metadata_rejects_nested() {
        assert!(validate_metadata(&json!({"nested": {"a": 1}})).is_err());
        assert!(validate_metadata(&json!({"list": [1, 2]})).is_err());
        assert!(validate_metadata(&json!("just a string")).is_err());
    }

    #[test]
    fn test_validate_quantities() {
        assert!(validate_non_zero_quantity(Decimal::from(-5)).is_ok());
        assert!(validate_non_zero_quantity(Decimal::ZERO).is_err());

        assert!(validate_positive_quantity(Decimal::from(1)).is_ok());
        assert!(validate_positive_quantity(Decimal::ZERO).is_err());
        assert!(validate_positive_quantity(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_validate_version_label() {
        assert!(validate_version_label("v2").is_ok());
        assert!(validate_version_label("").is_err());
        assert!(validate_version_label(&"v".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_lot_number() {
        assert!(validate_lot_number("L-20260824-001").is_ok());
        assert!(validate_lot_number("SUPPLIER-BATCH-42").is_ok());
        assert!(validate_lot_number(" ").is_err());
    }
}
