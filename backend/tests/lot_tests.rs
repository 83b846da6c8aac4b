//! Lot tracking tests
//!
//! Covers lot numbering, the remaining-quantity invariant, and the advisory
//! depleted status.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use chrono::NaiveDate;
use shared::{generate_lot_number, validate_lot_number, LotStatus};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_lot_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(generate_lot_number(date, 1), "L-20260307-001");
        assert_eq!(generate_lot_number(date, 999), "L-20260307-999");
    }

    #[test]
    fn test_generated_numbers_pass_validation() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        for seq in [1, 42, 100, 5000] {
            assert!(validate_lot_number(&generate_lot_number(date, seq)).is_ok());
        }
    }

    #[test]
    fn test_sequences_reset_per_day() {
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        // Same sequence value on different days yields distinct numbers
        assert_ne!(
            generate_lot_number(monday, 1),
            generate_lot_number(tuesday, 1)
        );
    }

    /// Scenario: receive lot L1 qty=500 @ 2.50 -> remaining=500
    #[test]
    fn test_remaining_starts_at_received() {
        let received = dec("500");
        let consumptions: Vec<Decimal> = vec![];
        let consumed: Decimal = consumptions.iter().sum();
        assert_eq!(received - consumed, dec("500"));
    }

    /// Remaining = received - sum of consumption against the lot
    #[test]
    fn test_remaining_invariant() {
        let received = dec("500");
        let consumptions = vec![dec("50"), dec("120.5")];
        let consumed: Decimal = consumptions.iter().sum();
        assert_eq!(received - consumed, dec("329.5"));
    }

    /// Over-consumption drives remaining negative; the status flips to
    /// depleted but nothing fails.
    #[test]
    fn test_negative_remainder_flips_status() {
        let remaining = dec("450") - dec("600");
        assert_eq!(remaining, dec("-150"));

        let status = if remaining <= Decimal::ZERO {
            LotStatus::Depleted
        } else {
            LotStatus::Active
        };
        assert_eq!(status, LotStatus::Depleted);
    }

    #[test]
    fn test_status_flips_back_on_receipt() {
        let remaining = dec("-150") + dec("200");
        let status = if remaining <= Decimal::ZERO {
            LotStatus::Depleted
        } else {
            LotStatus::Active
        };
        assert_eq!(status, LotStatus::Active);
    }

    #[test]
    fn test_user_supplied_lot_numbers() {
        assert!(validate_lot_number("SUPPLIER-BATCH-77").is_ok());
        assert!(validate_lot_number("").is_err());
        assert!(validate_lot_number("   ").is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn date_strategy() -> impl Strategy<Value = NaiveDate> {
        (2020i32..=2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d).unwrap()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// remaining == received - sum(consumption) for any consumption
        /// sequence, including over-consumption
        #[test]
        fn prop_remaining_invariant(
            received in quantity_strategy(),
            consumptions in prop::collection::vec(quantity_strategy(), 0..20)
        ) {
            let mut remaining = received;
            for c in &consumptions {
                remaining -= c;
            }
            let consumed: Decimal = consumptions.iter().sum();
            prop_assert_eq!(remaining, received - consumed);
        }

        /// Depleted exactly when remaining <= 0; the status never lies
        #[test]
        fn prop_status_mirrors_remaining(
            received in quantity_strategy(),
            consumed in quantity_strategy()
        ) {
            let remaining = received - consumed;
            let status = if remaining <= Decimal::ZERO {
                LotStatus::Depleted
            } else {
                LotStatus::Active
            };
            prop_assert_eq!(status == LotStatus::Depleted, remaining <= Decimal::ZERO);
        }

        /// Generated numbers are unique per (date, sequence) and parse back
        #[test]
        fn prop_lot_numbers_deterministic(
            date in date_strategy(),
            seq in 1i32..=9999
        ) {
            let a = generate_lot_number(date, seq);
            let b = generate_lot_number(date, seq);
            prop_assert_eq!(&a, &b);
            prop_assert!(a.starts_with("L-"));
            prop_assert!(validate_lot_number(&a).is_ok());
        }

        /// Different sequence values on the same day never collide
        #[test]
        fn prop_same_day_sequences_distinct(
            date in date_strategy(),
            seq_a in 1i32..=9999,
            seq_b in 1i32..=9999
        ) {
            prop_assume!(seq_a != seq_b);
            prop_assert_ne!(
                generate_lot_number(date, seq_a),
                generate_lot_number(date, seq_b)
            );
        }
    }
}
