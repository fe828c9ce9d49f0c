//! Per-container financial summary and cross-container roll-ups

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::financial::{round_money, round_rate, ContainerFinancials};

/// Denormalized one-to-one companion of a container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerFinancialSummary {
    pub container_id: Uuid,
    pub base_cost: Decimal,
    pub shipment_cost: Decimal,
    pub total_all_costs: Decimal,
    pub profit_margin_percentage: Decimal,
    pub expected_selling_total: Decimal,
    pub actual_selling_total: Decimal,
    pub actual_profit: Decimal,
    pub roi_percentage: Decimal,
    pub cost_per_kg: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl ContainerFinancialSummary {
    /// Build the row to upsert from derived figures and the realised selling total
    pub fn from_financials(
        container_id: Uuid,
        financials: &ContainerFinancials,
        actual_selling_total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let actual = financials.actual(actual_selling_total);
        Self {
            container_id,
            base_cost: financials.base_cost,
            shipment_cost: financials.shipment_cost,
            total_all_costs: financials.total_cost,
            profit_margin_percentage: financials.profit_margin_percentage,
            expected_selling_total: financials.expected_revenue,
            actual_selling_total: actual.actual_selling_total,
            actual_profit: actual.actual_profit,
            roi_percentage: actual.roi_percentage,
            cost_per_kg: financials.cost_per_kg,
            updated_at,
        }
    }
}

/// Time bucket for period roll-ups
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FinancialPeriod {
    #[default]
    Month,
    Quarter,
    Year,
}

impl FinancialPeriod {
    /// Unit accepted by PostgreSQL `DATE_TRUNC`
    pub fn date_trunc(&self) -> &'static str {
        match self {
            FinancialPeriod::Month => "month",
            FinancialPeriod::Quarter => "quarter",
            FinancialPeriod::Year => "year",
        }
    }

    /// `TO_CHAR` pattern for the bucket label
    pub fn label_format(&self) -> &'static str {
        match self {
            FinancialPeriod::Month => "YYYY-MM",
            FinancialPeriod::Quarter => "YYYY-\"Q\"Q",
            FinancialPeriod::Year => "YYYY",
        }
    }

    /// Absent means monthly buckets; anything else must name a bucket
    pub fn parse(value: Option<&str>) -> Result<Self, &'static str> {
        match value.map(str::trim) {
            None | Some("") | Some("month") => Ok(FinancialPeriod::Month),
            Some("quarter") => Ok(FinancialPeriod::Quarter),
            Some("year") => Ok(FinancialPeriod::Year),
            Some(_) => Err("group_by must be month, quarter or year"),
        }
    }
}

/// Aggregate figures shared by every roll-up shape
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RollupTotals {
    pub container_count: i64,
    pub total_weight_kg: Decimal,
    pub total_cost: Decimal,
    pub amount_paid: Decimal,
    pub remaining_balance: Decimal,
    pub expected_revenue: Decimal,
    pub actual_revenue: Decimal,
    pub actual_profit: Decimal,
    pub roi_percentage: Decimal,
}

impl RollupTotals {
    /// Recompute profit and ROI from the summed revenue and cost
    pub fn finalize(mut self) -> Self {
        self.actual_profit = round_money(self.actual_revenue - self.total_cost);
        self.roi_percentage = round_rate(crate::financial::roi_percentage(
            self.actual_profit,
            self.total_cost,
        ));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialOverview {
    pub pending_containers: i64,
    pub received_containers: i64,
    pub processed_containers: i64,
    #[serde(flatten)]
    pub totals: RollupTotals,
}

/// One bucket of a period roll-up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodRollup {
    pub period: String,
    pub period_start: NaiveDate,
    #[serde(flatten)]
    pub totals: RollupTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierRollup {
    pub supplier_id: Option<Uuid>,
    pub supplier_name: String,
    #[serde(flatten)]
    pub totals: RollupTotals,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financial::CostInputs;

    #[test]
    fn test_summary_from_financials() {
        let financials = CostInputs {
            total_weight_kg: Decimal::from(100),
            base_cost: Decimal::from(1000),
            shipment_cost: Decimal::from(50),
            amount_paid: Decimal::ZERO,
            profit_margin_percentage: Decimal::from(20),
        }
        .derive();

        let summary = ContainerFinancialSummary::from_financials(
            Uuid::nil(),
            &financials,
            Decimal::from(1155),
            Utc::now(),
        );

        assert_eq!(summary.total_all_costs, Decimal::from(1050));
        assert_eq!(summary.expected_selling_total, Decimal::from(1260));
        assert_eq!(summary.actual_profit, Decimal::from(105));
        assert_eq!(summary.roi_percentage, Decimal::from(10));
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(FinancialPeriod::parse(Some("quarter")), Ok(FinancialPeriod::Quarter));
        assert!(FinancialPeriod::parse(Some("decade")).is_err());
        assert_eq!(FinancialPeriod::parse(None).unwrap().date_trunc(), "month");
    }

    #[test]
    fn test_totals_finalize() {
        let totals = RollupTotals {
            total_cost: Decimal::from(200),
            actual_revenue: Decimal::from(250),
            ..Default::default()
        }
        .finalize();
        assert_eq!(totals.actual_profit, Decimal::from(50));
        assert_eq!(totals.roi_percentage, Decimal::from(25));
    }
}
