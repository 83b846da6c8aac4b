//! Cost of goods sold (COGS) math for production runs
//!
//! Pure calculations with no I/O so they can be exercised directly in tests.
//! The backend computes a breakdown exactly once at run completion and
//! persists it; stored figures are never recomputed from live prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::OverheadPolicy;

/// Final cost figures persisted on a completed production run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub cost_per_unit: Decimal,
}

impl CostBreakdown {
    /// Compute the full breakdown from consumed material lines and labor
    /// inputs. `quantity_produced` must be positive; the caller validates
    /// this before reaching the math.
    pub fn compute(
        material_lines: &[(Decimal, Decimal)],
        labor_hours: Decimal,
        labor_rate: Decimal,
        overhead_policy: OverheadPolicy,
        quantity_produced: Decimal,
    ) -> Self {
        let material_cost = material_cost(material_lines);
        let labor_cost = labor_hours * labor_rate;
        let overhead_cost = overhead_policy.overhead_for(labor_hours, labor_cost);
        let total_cost = material_cost + labor_cost + overhead_cost;
        let cost_per_unit = total_cost / quantity_produced;

        Self {
            material_cost,
            labor_cost,
            overhead_cost,
            total_cost,
            cost_per_unit,
        }
    }
}

/// Sum of (actual quantity x unit cost at consumption) over material lines
pub fn material_cost(lines: &[(Decimal, Decimal)]) -> Decimal {
    lines
        .iter()
        .fold(Decimal::ZERO, |acc, (qty, unit_cost)| acc + qty * unit_cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_material_cost_sum() {
        let lines = vec![(dec("50"), dec("2.50")), (dec("10"), dec("1.25"))];
        assert_eq!(material_cost(&lines), dec("137.50"));
    }

    #[test]
    fn test_material_cost_empty() {
        assert_eq!(material_cost(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_breakdown_percent_overhead() {
        // 50kg @ 2.50, 12h @ 25/h, overhead 50% of labor, 985 units produced
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
        // 575 / 985 = 0.5838...
        assert!(breakdown.cost_per_unit > dec("0.5837"));
        assert!(breakdown.cost_per_unit < dec("0.5839"));
    }

    #[test]
    fn test_breakdown_flat_hourly_overhead() {
        let breakdown = CostBreakdown::compute(
            &[(dec("100"), dec("1.00"))],
            dec("8"),
            dec("20"),
            OverheadPolicy::PerLaborHour(dec("5")),
            dec("200"),
        );

        assert_eq!(breakdown.material_cost, dec("100.00"));
        assert_eq!(breakdown.labor_cost, dec("160"));
        assert_eq!(breakdown.overhead_cost, dec("40"));
        assert_eq!(breakdown.total_cost, dec("300.00"));
        assert_eq!(breakdown.cost_per_unit, dec("1.50"));
    }

    #[test]
    fn test_breakdown_no_labor() {
        let breakdown = CostBreakdown::compute(
            &[(dec("10"), dec("3"))],
            Decimal::ZERO,
            Decimal::ZERO,
            OverheadPolicy::PercentOfLabor(dec("50")),
            dec("10"),
        );

        assert_eq!(breakdown.labor_cost, Decimal::ZERO);
        assert_eq!(breakdown.overhead_cost, Decimal::ZERO);
        assert_eq!(breakdown.total_cost, dec("30"));
        assert_eq!(breakdown.cost_per_unit, dec("3"));
    }
}
