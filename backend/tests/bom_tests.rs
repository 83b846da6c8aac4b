//! BOM template tests
//!
//! Covers the single-active-version invariant and the snapshot semantics:
//! a run's material lines are copied once and never follow later edits.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::validate_version_label;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// In-memory stand-in for a product's BOM versions
#[derive(Debug, Clone)]
struct Version {
    label: String,
    is_active: bool,
}

/// Activating one version deactivates its siblings
fn activate(versions: &mut [Version], label: &str) {
    for v in versions.iter_mut() {
        v.is_active = v.label == label;
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_activation_deactivates_siblings() {
        let mut versions = vec![
            Version { label: "v1".into(), is_active: true },
            Version { label: "v2".into(), is_active: false },
            Version { label: "v3".into(), is_active: false },
        ];

        activate(&mut versions, "v3");

        let active: Vec<_> = versions.iter().filter(|v| v.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].label, "v3");
    }

    #[test]
    fn test_at_most_one_active_after_any_sequence() {
        let mut versions = vec![
            Version { label: "v1".into(), is_active: false },
            Version { label: "v2".into(), is_active: false },
        ];

        activate(&mut versions, "v1");
        activate(&mut versions, "v2");
        activate(&mut versions, "v1");

        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
    }

    /// A run snapshots the component list once; later template edits never
    /// reach the snapshot.
    #[test]
    fn test_snapshot_survives_template_edits() {
        let mut template = vec![(dec("50"), "kg"), (dec("2"), "l")];
        let snapshot = template.clone();

        template[0].0 = dec("75");
        template.push((dec("1"), "unit"));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, dec("50"));
    }

    #[test]
    fn test_component_order_preserved() {
        let components = vec!["sugar", "flour", "butter"];
        let snapshot: Vec<_> = components.iter().copied().collect();
        assert_eq!(snapshot, components);
    }

    #[test]
    fn test_version_labels() {
        assert!(validate_version_label("v1").is_ok());
        assert!(validate_version_label("2026-summer").is_ok());
        assert!(validate_version_label("").is_err());
        assert!(validate_version_label("   ").is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// After any sequence of activations, exactly one version is active
        #[test]
        fn prop_single_active_version(
            count in 2usize..8,
            picks in prop::collection::vec(0usize..8, 1..10)
        ) {
            let mut versions: Vec<Version> = (0..count)
                .map(|i| Version { label: format!("v{i}"), is_active: false })
                .collect();

            for pick in picks {
                let label = format!("v{}", pick % count);
                activate(&mut versions, &label);
            }

            prop_assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        }

        /// Snapshots are value copies: mutating the template afterwards
        /// leaves the snapshot bit-identical
        #[test]
        fn prop_snapshot_immutable(
            quantities in prop::collection::vec(quantity_strategy(), 1..10),
            edit in quantity_strategy()
        ) {
            let mut template = quantities.clone();
            let snapshot = template.clone();

            for q in template.iter_mut() {
                *q += edit;
            }

            prop_assert_eq!(snapshot, quantities);
        }
    }
}
