//! Container cost, revenue and margin calculations
//!
//! Everything here is pure and operates on `Decimal` so the backend, the
//! browser preview (via WASM) and the tests all agree to the cent.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Scale used for persisted money columns
pub const MONEY_SCALE: u32 = 2;

/// Scale used for per-kg rates and percentages
pub const RATE_SCALE: u32 = 4;

/// Price of one weight unit: `total_price / total_weight`, 0 when weight is 0
pub fn price_per_unit(total_price: Decimal, total_weight: Decimal) -> Decimal {
    if total_weight <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        total_price / total_weight
    }
}

/// `base_cost + shipment_cost`
pub fn total_cost(base_cost: Decimal, shipment_cost: Decimal) -> Decimal {
    base_cost + shipment_cost
}

/// Revenue expected when everything sells at the configured margin
pub fn expected_revenue(total_cost: Decimal, margin_percentage: Decimal) -> Decimal {
    total_cost * (Decimal::ONE + margin_percentage / Decimal::ONE_HUNDRED)
}

pub fn expected_profit(expected_revenue: Decimal, total_cost: Decimal) -> Decimal {
    expected_revenue - total_cost
}

/// Return on investment in percent, 0 when there is no cost base
pub fn roi_percentage(actual_profit: Decimal, total_cost: Decimal) -> Decimal {
    if total_cost <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        actual_profit / total_cost * Decimal::ONE_HUNDRED
    }
}

/// Landed cost of one weight unit, 0 when weight is 0
pub fn cost_per_weight_unit(total_cost: Decimal, total_weight: Decimal) -> Decimal {
    if total_weight <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        total_cost / total_weight
    }
}

/// Outstanding supplier balance. Negative when the supplier was overpaid.
pub fn remaining_balance(total_cost: Decimal, amount_paid: Decimal) -> Decimal {
    total_cost - amount_paid
}

/// Half-cent rounds away from zero, matching Postgres `NUMERIC`
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Raw cost inputs of a container
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CostInputs {
    pub total_weight_kg: Decimal,
    /// Price charged by the supplier for the whole shipment
    pub base_cost: Decimal,
    #[serde(default)]
    pub shipment_cost: Decimal,
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default)]
    pub profit_margin_percentage: Decimal,
}

/// Everything derived from [`CostInputs`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerFinancials {
    pub price_per_kg: Decimal,
    pub base_cost: Decimal,
    pub shipment_cost: Decimal,
    pub total_cost: Decimal,
    pub amount_paid: Decimal,
    pub remaining_balance: Decimal,
    pub profit_margin_percentage: Decimal,
    pub expected_revenue: Decimal,
    pub expected_profit: Decimal,
    pub cost_per_kg: Decimal,
}

impl CostInputs {
    /// Derive the full set of container figures
    pub fn derive(&self) -> ContainerFinancials {
        let total = total_cost(self.base_cost, self.shipment_cost);
        let revenue = expected_revenue(total, self.profit_margin_percentage);

        ContainerFinancials {
            price_per_kg: round_rate(price_per_unit(self.base_cost, self.total_weight_kg)),
            base_cost: round_money(self.base_cost),
            shipment_cost: round_money(self.shipment_cost),
            total_cost: round_money(total),
            amount_paid: round_money(self.amount_paid),
            remaining_balance: round_money(remaining_balance(total, self.amount_paid)),
            profit_margin_percentage: self.profit_margin_percentage,
            expected_revenue: round_money(revenue),
            expected_profit: round_money(expected_profit(revenue, total)),
            cost_per_kg: round_rate(cost_per_weight_unit(total, self.total_weight_kg)),
        }
    }
}

/// Realised figures once stock has been committed from a container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualPerformance {
    pub actual_selling_total: Decimal,
    pub actual_profit: Decimal,
    pub roi_percentage: Decimal,
}

impl ContainerFinancials {
    pub fn actual(&self, actual_selling_total: Decimal) -> ActualPerformance {
        let profit = actual_selling_total - self.total_cost;
        ActualPerformance {
            actual_selling_total: round_money(actual_selling_total),
            actual_profit: round_money(profit),
            roi_percentage: round_rate(roi_percentage(profit, self.total_cost)),
        }
    }
}

/// Sum of `unit price × quantity` over line values
pub fn selling_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines
        .into_iter()
        .map(|(price, quantity)| price * Decimal::from(quantity))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_reference_container() {
        let inputs = CostInputs {
            total_weight_kg: dec("100"),
            base_cost: dec("1000"),
            shipment_cost: dec("50"),
            amount_paid: dec("400"),
            profit_margin_percentage: dec("20"),
        };
        let f = inputs.derive();

        assert_eq!(f.price_per_kg, dec("10"));
        assert_eq!(f.total_cost, dec("1050"));
        assert_eq!(f.expected_revenue, dec("1260"));
        assert_eq!(f.expected_profit, dec("210"));
        assert_eq!(f.cost_per_kg, dec("10.5"));
        assert_eq!(f.remaining_balance, dec("650"));
    }

    #[test]
    fn test_zero_weight_rates_are_zero() {
        assert_eq!(price_per_unit(dec("500"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(cost_per_weight_unit(dec("500"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_roi_without_cost() {
        assert_eq!(roi_percentage(dec("100"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(roi_percentage(dec("105"), dec("1050")), dec("10"));
    }

    #[test]
    fn test_actual_performance() {
        let f = CostInputs {
            total_weight_kg: dec("100"),
            base_cost: dec("1000"),
            shipment_cost: dec("50"),
            ..Default::default()
        }
        .derive();
        let actual = f.actual(dec("1365"));

        assert_eq!(actual.actual_profit, dec("315"));
        assert_eq!(actual.roi_percentage, dec("30"));
    }

    #[test]
    fn test_midpoints_round_away_from_zero() {
        assert_eq!(round_money(dec("2.345")), dec("2.35"));
        assert_eq!(round_money(dec("2.335")), dec("2.34"));
        assert_eq!(round_money(dec("-2.345")), dec("-2.35"));
        assert_eq!(round_rate(dec("0.00005")), dec("0.0001"));
    }

    #[test]
    fn test_selling_total() {
        let total = selling_total(vec![(dec("12.50"), 4), (dec("3"), 10)]);
        assert_eq!(total, dec("80"));
    }
}
