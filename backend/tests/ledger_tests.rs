//! Transaction ledger tests
//!
//! Covers the core ledger invariants:
//! - Cached balance always equals the sum of transaction deltas
//! - Zero-quantity transactions are rejected
//! - Negative resulting balances warn instead of failing
//! - Corrections are offsetting appends, never edits

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{validate_non_zero_quantity, StockWarning, TransactionKind};
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_zero_quantity_rejected() {
        assert!(validate_non_zero_quantity(Decimal::ZERO).is_err());
        assert!(validate_non_zero_quantity(dec("0.000")).is_err());
        assert!(validate_non_zero_quantity(dec("0.001")).is_ok());
        assert!(validate_non_zero_quantity(dec("-5")).is_ok());
    }

    #[test]
    fn test_signed_deltas_accumulate() {
        // Receipts positive, consumption negative, all on one axis
        let deltas = vec![dec("500"), dec("-50"), dec("-600"), dec("25")];
        let balance: Decimal = deltas.iter().sum();
        assert_eq!(balance, dec("-125"));
    }

    #[test]
    fn test_total_cost_uses_absolute_quantity() {
        // Consumption is a negative delta but its cost is positive
        let quantity = dec("-50");
        let unit_cost = dec("2.50");
        let total_cost = quantity.abs() * unit_cost;
        assert_eq!(total_cost, dec("125.00"));
    }

    /// Scenario: adjust by more than is on hand. The ledger records it and
    /// warns; it never throws.
    #[test]
    fn test_negative_balance_warns_not_errors() {
        let item_id = Uuid::new_v4();
        let current = dec("450");
        let adjustment = dec("-600");
        let resulting = current + adjustment;

        assert_eq!(resulting, dec("-150"));

        let warning = if resulting < Decimal::ZERO {
            Some(StockWarning::NegativeStock {
                item_id,
                resulting_stock: resulting,
            })
        } else {
            None
        };
        assert!(warning.is_some());
    }

    #[test]
    fn test_no_warning_at_exactly_zero() {
        let resulting = dec("100") + dec("-100");
        assert_eq!(resulting, Decimal::ZERO);
        assert!(resulting >= Decimal::ZERO);
    }

    /// Corrections append an offsetting transaction; the net effect is zero
    /// but both rows remain in history.
    #[test]
    fn test_correction_is_offsetting_append() {
        let mut history = vec![dec("500"), dec("-50")];

        // Mistaken entry and its correction
        history.push(dec("-30"));
        history.push(dec("30"));

        let balance: Decimal = history.iter().sum();
        assert_eq!(balance, dec("450"));
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_adjustment_kinds_are_distinct() {
        let kinds = [
            TransactionKind::AdjustmentCount,
            TransactionKind::AdjustmentWaste,
            TransactionKind::AdjustmentOther,
        ];
        for kind in kinds {
            assert!(kind.as_str().starts_with("adjustment_"));
        }
        assert_ne!(
            TransactionKind::AdjustmentCount.as_str(),
            TransactionKind::AdjustmentWaste.as_str()
        );
    }

    #[test]
    fn test_history_page_windows() {
        let pagination = shared::Pagination {
            page: 2,
            per_page: 20,
        };
        assert_eq!(pagination.limit(), 20);
        assert_eq!(pagination.offset(), 20);

        let meta = shared::PaginationMeta::new(&pagination, 45);
        assert_eq!(meta.total_pages, 3);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for signed quantity deltas, excluding zero
    fn delta_strategy() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 2)),
            (1i64..=100_000i64).prop_map(|n| -Decimal::new(n, 2)),
        ]
    }

    fn unit_cost_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 4))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The cached counter equals the fold of deltas regardless of how
        /// they interleave or how negative the balance swings.
        #[test]
        fn prop_cached_balance_equals_ledger_sum(
            deltas in prop::collection::vec(delta_strategy(), 1..50)
        ) {
            let mut cached = Decimal::ZERO;
            for delta in &deltas {
                cached += delta;
            }
            let ledger_sum: Decimal = deltas.iter().sum();
            prop_assert_eq!(cached, ledger_sum);
        }

        /// Every generated delta passes the non-zero check
        #[test]
        fn prop_deltas_never_zero(delta in delta_strategy()) {
            prop_assert!(validate_non_zero_quantity(delta).is_ok());
        }

        /// total_cost is non-negative for any signed delta
        #[test]
        fn prop_total_cost_non_negative(
            delta in delta_strategy(),
            unit_cost in unit_cost_strategy()
        ) {
            let total = delta.abs() * unit_cost;
            prop_assert!(total >= Decimal::ZERO);
        }

        /// An entry followed by its offset restores the prior balance while
        /// the history keeps growing
        #[test]
        fn prop_offsetting_append_restores_balance(
            history in prop::collection::vec(delta_strategy(), 1..20),
            mistake in delta_strategy()
        ) {
            let before: Decimal = history.iter().sum();

            let mut corrected = history.clone();
            corrected.push(mistake);
            corrected.push(-mistake);

            let after: Decimal = corrected.iter().sum();
            prop_assert_eq!(before, after);
            prop_assert_eq!(corrected.len(), history.len() + 2);
        }

        /// Warnings appear exactly when the resulting balance is negative
        #[test]
        fn prop_warning_iff_negative(
            start in (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 1)),
            delta in delta_strategy()
        ) {
            let resulting = start + delta;
            let warned = resulting < Decimal::ZERO;
            if warned {
                prop_assert!(resulting < Decimal::ZERO);
            } else {
                prop_assert!(resulting >= Decimal::ZERO);
            }
        }
    }
}
