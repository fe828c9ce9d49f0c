//! Financial calculation tests
//!
//! Container cost derivation, realised performance and roll-up totals.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::financial::{self, CostInputs};
use shared::{ContainerFinancialSummary, FinancialPeriod, RollupTotals};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn reference_inputs() -> CostInputs {
    CostInputs {
        total_weight_kg: dec("100"),
        base_cost: dec("1000"),
        shipment_cost: dec("50"),
        amount_paid: dec("0"),
        profit_margin_percentage: dec("20"),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 100 kg at $1000 plus $50 shipping with a 20% margin
    #[test]
    fn test_reference_container() {
        let figures = reference_inputs().derive();
        assert_eq!(figures.price_per_kg, dec("10"));
        assert_eq!(figures.total_cost, dec("1050"));
        assert_eq!(figures.expected_revenue, dec("1260"));
        assert_eq!(figures.expected_profit, dec("210"));
        assert_eq!(figures.cost_per_kg, dec("10.50"));
        assert_eq!(figures.remaining_balance, dec("1050"));
    }

    #[test]
    fn test_zero_weight_does_not_divide() {
        let inputs = CostInputs {
            total_weight_kg: Decimal::ZERO,
            ..reference_inputs()
        };
        let figures = inputs.derive();
        assert_eq!(figures.price_per_kg, Decimal::ZERO);
        assert_eq!(figures.cost_per_kg, Decimal::ZERO);
        assert_eq!(figures.total_cost, dec("1050"));
    }

    #[test]
    fn test_overpaid_supplier_has_negative_balance() {
        let inputs = CostInputs {
            amount_paid: dec("1100"),
            ..reference_inputs()
        };
        assert_eq!(inputs.derive().remaining_balance, dec("-50"));
    }

    #[test]
    fn test_actual_performance_after_processing() {
        let figures = reference_inputs().derive();
        let actual = figures.actual(dec("1312.50"));
        assert_eq!(actual.actual_profit, dec("262.50"));
        assert_eq!(actual.roi_percentage, dec("25"));
    }

    #[test]
    fn test_roi_zero_without_cost_base() {
        assert_eq!(financial::roi_percentage(dec("100"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_summary_row_from_financials() {
        let figures = reference_inputs().derive();
        let summary = ContainerFinancialSummary::from_financials(Uuid::nil(), &figures, dec("1260"), Utc::now());
        assert_eq!(summary.total_all_costs, dec("1050"));
        assert_eq!(summary.expected_selling_total, dec("1260"));
        assert_eq!(summary.actual_profit, dec("210"));
        assert_eq!(summary.roi_percentage, dec("20"));
    }

    #[test]
    fn test_selling_total_of_lines() {
        let lines = vec![(dec("12.50"), 4), (dec("3.00"), 10)];
        assert_eq!(financial::selling_total(lines), dec("80"));
    }

    #[test]
    fn test_rollup_totals_finalize() {
        let totals = RollupTotals {
            container_count: 2,
            total_cost: dec("2000"),
            actual_revenue: dec("2500"),
            ..Default::default()
        }
        .finalize();
        assert_eq!(totals.actual_profit, dec("500"));
        assert_eq!(totals.roi_percentage, dec("25"));
    }

    #[test]
    fn test_period_grouping_parse() {
        assert_eq!(FinancialPeriod::parse(None), Ok(FinancialPeriod::Month));
        assert_eq!(FinancialPeriod::parse(Some("month")), Ok(FinancialPeriod::Month));
        assert_eq!(FinancialPeriod::parse(Some("weekly")), Err("group_by must be month, quarter or year"));
        assert_eq!(FinancialPeriod::parse(Some("quarter")).unwrap().date_trunc(), "quarter");
        assert_eq!(FinancialPeriod::parse(Some("year")).unwrap().label_format(), "YYYY");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Money amounts in cents up to ten million
    fn money_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..1_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    fn weight_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..100_000_000).prop_map(|grams| Decimal::new(grams, 3))
    }

    fn margin_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..100_000).prop_map(|basis| Decimal::new(basis, 2))
    }

    fn inputs_strategy() -> impl Strategy<Value = CostInputs> {
        (weight_strategy(), money_strategy(), money_strategy(), money_strategy(), margin_strategy()).prop_map(
            |(total_weight_kg, base_cost, shipment_cost, amount_paid, profit_margin_percentage)| CostInputs {
                total_weight_kg,
                base_cost,
                shipment_cost,
                amount_paid,
                profit_margin_percentage,
            },
        )
    }

    proptest! {
        /// Outstanding balance always equals total cost minus payments
        #[test]
        fn prop_remaining_balance_identity(inputs in inputs_strategy()) {
            let figures = inputs.derive();
            prop_assert_eq!(figures.remaining_balance, figures.total_cost - figures.amount_paid);
        }

        #[test]
        fn prop_total_cost_is_sum_of_parts(inputs in inputs_strategy()) {
            let figures = inputs.derive();
            prop_assert_eq!(figures.total_cost, inputs.base_cost + inputs.shipment_cost);
        }

        /// A non-negative margin never prices below cost
        #[test]
        fn prop_expected_revenue_covers_cost(inputs in inputs_strategy()) {
            let figures = inputs.derive();
            prop_assert!(figures.expected_revenue >= figures.total_cost);
            prop_assert!(figures.expected_profit >= Decimal::ZERO);
        }

        /// Selling exactly at the expected revenue realises the margin as ROI
        #[test]
        fn prop_roi_matches_margin_at_expected_revenue(
            base in 100i64..1_000_000,
            margin in 0i64..500,
        ) {
            let inputs = CostInputs {
                total_weight_kg: dec("1"),
                base_cost: Decimal::from(base),
                shipment_cost: Decimal::ZERO,
                amount_paid: Decimal::ZERO,
                profit_margin_percentage: Decimal::from(margin),
            };
            let figures = inputs.derive();
            let revenue = financial::expected_revenue(figures.total_cost, figures.profit_margin_percentage);
            let actual = figures.actual(revenue);
            let drift = (actual.roi_percentage - Decimal::from(margin)).abs();
            prop_assert!(drift <= dec("0.01"), "roi {} vs margin {}", actual.roi_percentage, margin);
        }

        /// Cost per kg times weight gives back the total cost (up to rounding)
        #[test]
        fn prop_cost_per_kg_consistent(inputs in inputs_strategy()) {
            prop_assume!(inputs.total_weight_kg >= dec("1"));
            let figures = inputs.derive();
            let rebuilt = figures.cost_per_kg * inputs.total_weight_kg;
            let tolerance = inputs.total_weight_kg * dec("0.0001");
            prop_assert!((rebuilt - figures.total_cost).abs() <= tolerance);
        }
    }
}
