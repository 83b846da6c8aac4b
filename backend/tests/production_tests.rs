//! Production run engine tests
//!
//! Covers the run state machine, strict stage sequencing, and the one-shot
//! COGS computation, including the documented end-to-end scenarios.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{
    generate_run_number, validate_positive_quantity, CostBreakdown, OverheadPolicy, RunStatus,
    StageStatus,
};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// In-memory stand-in for a run's stage list
fn can_start_stage(stages: &[StageStatus], position: usize) -> bool {
    stages[position] == StageStatus::Pending
        && stages[..position]
            .iter()
            .all(|s| *s == StageStatus::Completed)
}

/// In-memory stand-in for a planned material line
struct MaterialLine {
    actual_quantity: Option<Decimal>,
    unit_cost: Decimal,
}

/// Consuming a line records a ledger delta and fixes its actual quantity.
/// A line consumes at most once; repeats are rejected rather than letting
/// the ledger move again while the line counts once in the aggregation.
fn consume_line(
    line: &mut MaterialLine,
    quantity: Decimal,
    ledger: &mut Vec<Decimal>,
) -> Result<(), &'static str> {
    if line.actual_quantity.is_some() {
        return Err("Material line has already been consumed");
    }
    ledger.push(-quantity);
    line.actual_quantity = Some(quantity);
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_run_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(generate_run_number(date, 3), "PR-20260824-003");
    }

    #[test]
    fn test_lifecycle_happy_path() {
        assert!(RunStatus::Planning.can_transition_to(RunStatus::InProgress));
        assert!(RunStatus::InProgress.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_cancel_from_both_working_states() {
        assert!(RunStatus::Planning.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::InProgress.can_transition_to(RunStatus::Cancelled));
    }

    /// Completed runs accept no further transitions; completion is one-shot
    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RunStatus::Completed, RunStatus::Cancelled] {
            for next in [
                RunStatus::Planning,
                RunStatus::InProgress,
                RunStatus::Completed,
                RunStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_completion_requires_in_progress() {
        assert!(!RunStatus::Planning.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_non_positive_produced_rejected() {
        assert!(validate_positive_quantity(Decimal::ZERO).is_err());
        assert!(validate_positive_quantity(dec("-10")).is_err());
        assert!(validate_positive_quantity(dec("985")).is_ok());
    }

    /// Scenario: complete a run for 985 units consuming 50kg @ 2.50 with
    /// 12h of labor @ 25/h and overhead at 50% of labor
    #[test]
    fn test_cogs_scenario() {
        let breakdown = CostBreakdown::compute(
            &[(dec("50"), dec("2.50"))],
            dec("12"),
            dec("25"),
            OverheadPolicy::PercentOfLabor(dec("50")),
            dec("985"),
        );

        assert_eq!(breakdown.material_cost, dec("125.00"));
        assert_eq!(breakdown.labor_cost, dec("300"));
        assert_eq!(breakdown.overhead_cost, dec("150"));
        assert_eq!(breakdown.total_cost, dec("575.00"));
        assert!(breakdown.cost_per_unit > dec("0.5837"));
        assert!(breakdown.cost_per_unit < dec("0.5839"));
    }

    #[test]
    fn test_cogs_per_labor_hour_overhead() {
        let breakdown = CostBreakdown::compute(
            &[(dec("10"), dec("4"))],
            dec("8"),
            dec("20"),
            OverheadPolicy::PerLaborHour(dec("5")),
            dec("100"),
        );

        assert_eq!(breakdown.material_cost, dec("40"));
        assert_eq!(breakdown.labor_cost, dec("160"));
        assert_eq!(breakdown.overhead_cost, dec("40"));
        assert_eq!(breakdown.total_cost, dec("240"));
        assert_eq!(breakdown.cost_per_unit, dec("2.4"));
    }

    /// Multi-stage runs aggregate material across all stages and sum the
    /// per-stage labor and overhead accruals.
    #[test]
    fn test_multi_stage_aggregation() {
        let policy = OverheadPolicy::PercentOfLabor(dec("25"));

        // Stage 1: 30kg @ 2.00, 4h @ 30/h
        let s1_material = dec("30") * dec("2.00");
        let s1_labor = dec("4") * dec("30");
        let s1_overhead = policy.overhead_for(dec("4"), s1_labor);

        // Stage 2: 5kg @ 10.00, 2h @ 30/h
        let s2_material = dec("5") * dec("10.00");
        let s2_labor = dec("2") * dec("30");
        let s2_overhead = policy.overhead_for(dec("2"), s2_labor);

        let material = s1_material + s2_material;
        let labor = s1_labor + s2_labor;
        let overhead = s1_overhead + s2_overhead;
        let total = material + labor + overhead;

        assert_eq!(material, dec("110.00"));
        assert_eq!(labor, dec("180"));
        assert_eq!(overhead, dec("45.00"));
        assert_eq!(total, dec("335.00"));

        let cost_per_unit = total / dec("50");
        assert_eq!(cost_per_unit, dec("6.70"));
    }

    /// Scenario: starting stage 2 while stage 1 is not completed must be
    /// rejected as an ordering violation.
    #[test]
    fn test_stage_two_blocked_until_one_completes() {
        let stages = [StageStatus::InProgress, StageStatus::Pending];
        assert!(!can_start_stage(&stages, 1));

        let stages = [StageStatus::Completed, StageStatus::Pending];
        assert!(can_start_stage(&stages, 1));
    }

    #[test]
    fn test_stage_cannot_restart() {
        let stages = [StageStatus::Completed, StageStatus::Pending];
        assert!(!can_start_stage(&stages, 0));
    }

    #[test]
    fn test_only_final_stage_position_produces() {
        let positions = [0, 1, 2];
        let max = *positions.iter().max().unwrap();
        for p in positions {
            let is_final = p == max;
            assert_eq!(is_final, p == 2);
        }
    }

    /// A line consumed at stage 1 cannot be consumed again at stage 2: the
    /// second attempt fails, and the final aggregation over actual
    /// quantities matches the consumption actually put on the ledger.
    #[test]
    fn test_line_consumed_once_across_stages() {
        let mut line = MaterialLine {
            actual_quantity: None,
            unit_cost: dec("2.50"),
        };
        let mut ledger = Vec::new();

        consume_line(&mut line, dec("50"), &mut ledger).unwrap();
        assert!(consume_line(&mut line, dec("50"), &mut ledger).is_err());

        assert_eq!(ledger, vec![dec("-50")]);
        let aggregated = line.actual_quantity.unwrap() * line.unit_cost;
        let from_ledger: Decimal = ledger.iter().map(|q| -q * line.unit_cost).sum();
        assert_eq!(aggregated, from_ledger);
    }

    #[test]
    fn test_duplicate_line_in_one_request_rejected() {
        let mut line = MaterialLine {
            actual_quantity: None,
            unit_cost: dec("4"),
        };
        let mut ledger = Vec::new();

        let request = [dec("10"), dec("10")];
        let results: Vec<_> = request
            .iter()
            .map(|qty| consume_line(&mut line, *qty, &mut ledger))
            .collect();

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(ledger.len(), 1);
    }

    /// Zero-labor runs still cost their materials
    #[test]
    fn test_material_only_run() {
        let breakdown = CostBreakdown::compute(
            &[(dec("100"), dec("1.50"))],
            Decimal::ZERO,
            Decimal::ZERO,
            OverheadPolicy::PercentOfLabor(Decimal::ZERO),
            dec("10"),
        );
        assert_eq!(breakdown.total_cost, dec("150.00"));
        assert_eq!(breakdown.cost_per_unit, dec("15.00"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn cost_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 4))
    }

    fn policy_strategy() -> impl Strategy<Value = OverheadPolicy> {
        prop_oneof![
            (0i64..=200i64).prop_map(|n| OverheadPolicy::PercentOfLabor(Decimal::from(n))),
            (0i64..=10_000i64).prop_map(|n| OverheadPolicy::PerLaborHour(Decimal::new(n, 2))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// total = material + labor + overhead, and per-unit scales exactly
        #[test]
        fn prop_breakdown_components_sum(
            lines in prop::collection::vec((quantity_strategy(), cost_strategy()), 0..10),
            hours in (0i64..=1000i64).prop_map(|n| Decimal::new(n, 1)),
            rate in cost_strategy(),
            policy in policy_strategy(),
            produced in quantity_strategy()
        ) {
            let breakdown = CostBreakdown::compute(&lines, hours, rate, policy, produced);

            prop_assert_eq!(
                breakdown.total_cost,
                breakdown.material_cost + breakdown.labor_cost + breakdown.overhead_cost
            );
            prop_assert_eq!(breakdown.cost_per_unit, breakdown.total_cost / produced);
            prop_assert!(breakdown.total_cost >= Decimal::ZERO);
        }

        /// Overhead is linear in labor for percent policies
        #[test]
        fn prop_percent_overhead_scales_with_labor(
            pct in 0i64..=100,
            hours in quantity_strategy(),
            rate in cost_strategy()
        ) {
            let policy = OverheadPolicy::PercentOfLabor(Decimal::from(pct));
            let labor = hours * rate;
            let overhead = policy.overhead_for(hours, labor);
            prop_assert_eq!(overhead, labor * Decimal::from(pct) / Decimal::from(100));
        }

        /// Splitting work into stages never changes the totals: a single
        /// aggregate equals the sum of per-stage computations
        #[test]
        fn prop_stage_split_preserves_totals(
            stage_lines in prop::collection::vec(
                prop::collection::vec((quantity_strategy(), cost_strategy()), 0..4),
                1..5
            ),
            rate in cost_strategy(),
            stage_hours in prop::collection::vec((0i64..=100i64).prop_map(Decimal::from), 1..5)
        ) {
            let stages = stage_lines.len().min(stage_hours.len());

            let mut material_by_stage = Decimal::ZERO;
            let mut labor_by_stage = Decimal::ZERO;
            for i in 0..stages {
                material_by_stage += shared::material_cost(&stage_lines[i]);
                labor_by_stage += stage_hours[i] * rate;
            }

            let all_lines: Vec<_> = stage_lines[..stages].concat();
            let total_hours: Decimal = stage_hours[..stages].iter().sum();

            prop_assert_eq!(material_by_stage, shared::material_cost(&all_lines));
            prop_assert_eq!(labor_by_stage, total_hours * rate);
        }

        /// Exactly one stage ordering is ever startable: the first pending
        /// stage after an unbroken completed prefix
        #[test]
        fn prop_single_startable_stage(completed_prefix in 0usize..6, total in 1usize..7) {
            prop_assume!(completed_prefix < total);

            let stages: Vec<StageStatus> = (0..total)
                .map(|i| if i < completed_prefix {
                    StageStatus::Completed
                } else {
                    StageStatus::Pending
                })
                .collect();

            let startable: Vec<usize> = (0..total)
                .filter(|&i| can_start_stage(&stages, i))
                .collect();

            prop_assert_eq!(startable, vec![completed_prefix]);
        }

        /// However often consumption of the same lines is retried, the
        /// aggregate over actual quantities always equals the ledger total
        #[test]
        fn prop_aggregation_matches_ledger(
            quantities in prop::collection::vec(quantity_strategy(), 1..8),
            attempts in prop::collection::vec(0usize..8, 1..20)
        ) {
            let mut lines: Vec<MaterialLine> = quantities
                .iter()
                .map(|_| MaterialLine {
                    actual_quantity: None,
                    unit_cost: Decimal::ONE,
                })
                .collect();
            let mut ledger = Vec::new();

            for index in attempts {
                let i = index % lines.len();
                let _ = consume_line(&mut lines[i], quantities[i], &mut ledger);
            }

            let aggregated: Decimal = lines
                .iter()
                .filter_map(|l| l.actual_quantity)
                .sum();
            let consumed: Decimal = ledger.iter().map(|q| -q).sum();
            prop_assert_eq!(aggregated, consumed);
        }

        /// Run numbers embed the date and are stable
        #[test]
        fn prop_run_number_stable(seq in 1i32..=9999) {
            let date = chrono::NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
            let a = generate_run_number(date, seq);
            prop_assert_eq!(a.clone(), generate_run_number(date, seq));
            prop_assert!(a.starts_with("PR-20260615-"));
        }
    }
}
