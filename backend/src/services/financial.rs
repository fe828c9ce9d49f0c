//! Container financial summaries and cross-container roll-ups

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    financial::CostInputs, ContainerFinancialSummary, DateRange, FinancialOverview,
    FinancialPeriod, PeriodRollup, RollupTotals, SupplierRollup,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Financial service for summaries and reports
#[derive(Clone)]
pub struct FinancialService {
    db: PgPool,
}

/// Report filter parameters
#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ReportFilter {
    fn range(&self) -> AppResult<DateRange> {
        shared::validate_date_range(self.start_date, self.end_date)
            .map_err(|msg| AppError::validation("start_date", msg))?;
        Ok(DateRange::from_bounds(self.start_date, self.end_date))
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    container_id: Uuid,
    base_cost: Decimal,
    shipment_cost: Decimal,
    total_all_costs: Decimal,
    profit_margin_percentage: Decimal,
    expected_selling_total: Decimal,
    actual_selling_total: Decimal,
    actual_profit: Decimal,
    roi_percentage: Decimal,
    cost_per_kg: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for ContainerFinancialSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            container_id: row.container_id,
            base_cost: row.base_cost,
            shipment_cost: row.shipment_cost,
            total_all_costs: row.total_all_costs,
            profit_margin_percentage: row.profit_margin_percentage,
            expected_selling_total: row.expected_selling_total,
            actual_selling_total: row.actual_selling_total,
            actual_profit: row.actual_profit,
            roi_percentage: row.roi_percentage,
            cost_per_kg: row.cost_per_kg,
            updated_at: row.updated_at,
        }
    }
}

/// Summed container figures shared by every report
#[derive(Debug, FromRow)]
struct TotalsRow {
    container_count: i64,
    total_weight_kg: Decimal,
    total_cost: Decimal,
    amount_paid: Decimal,
    remaining_balance: Decimal,
    expected_revenue: Decimal,
    actual_revenue: Decimal,
}

impl From<TotalsRow> for RollupTotals {
    fn from(row: TotalsRow) -> Self {
        RollupTotals {
            container_count: row.container_count,
            total_weight_kg: row.total_weight_kg,
            total_cost: row.total_cost,
            amount_paid: row.amount_paid,
            remaining_balance: row.remaining_balance,
            expected_revenue: row.expected_revenue,
            actual_revenue: row.actual_revenue,
            ..Default::default()
        }
        .finalize()
    }
}

#[derive(Debug, FromRow)]
struct OverviewRow {
    pending_containers: i64,
    received_containers: i64,
    processed_containers: i64,
    #[sqlx(flatten)]
    totals: TotalsRow,
}

#[derive(Debug, FromRow)]
struct PeriodRow {
    period: String,
    period_start: NaiveDate,
    #[sqlx(flatten)]
    totals: TotalsRow,
}

#[derive(Debug, FromRow)]
struct SupplierRow {
    supplier_id: Option<Uuid>,
    supplier_name: String,
    #[sqlx(flatten)]
    totals: TotalsRow,
}

/// Flat CSV line for any roll-up
#[derive(Debug, Serialize)]
pub struct RollupCsvRow<'a> {
    pub label: &'a str,
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

impl<'a> RollupCsvRow<'a> {
    pub fn new(label: &'a str, totals: &RollupTotals) -> Self {
        Self {
            label,
            container_count: totals.container_count,
            total_weight_kg: totals.total_weight_kg,
            total_cost: totals.total_cost,
            amount_paid: totals.amount_paid,
            remaining_balance: totals.remaining_balance,
            expected_revenue: totals.expected_revenue,
            actual_revenue: totals.actual_revenue,
            actual_profit: totals.actual_profit,
            roi_percentage: totals.roi_percentage,
        }
    }
}

const TOTALS_COLUMNS: &str = r#"
    COUNT(c.id) AS container_count,
    COALESCE(SUM(c.total_weight_kg), 0) AS total_weight_kg,
    COALESCE(SUM(c.total_cost), 0) AS total_cost,
    COALESCE(SUM(c.amount_paid), 0) AS amount_paid,
    COALESCE(SUM(c.remaining_balance), 0) AS remaining_balance,
    COALESCE(SUM(s.expected_selling_total), 0) AS expected_revenue,
    COALESCE(SUM(s.actual_selling_total), 0) AS actual_revenue
"#;

/// Containers without an arrival date are bucketed by creation date
const REPORT_DATE: &str = "COALESCE(c.arrival_date, c.created_at::date)";

/// Selling value of everything already committed from a container.
/// Boxes carry no selling value.
async fn actual_selling_total(conn: &mut PgConnection, container_id: Uuid) -> AppResult<Decimal> {
    let total = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(ci.quantity * COALESCE(ci.selling_price, ii.selling_price, 0)), 0)
        FROM container_items ci
        LEFT JOIN inventory_items ii ON ii.id = COALESCE(ci.item_id, ci.materialized_id)
        WHERE ci.container_id = $1
          AND ci.is_processed = TRUE
          AND ci.item_type <> 'box'
        "#,
    )
    .bind(container_id)
    .fetch_one(conn)
    .await?;
    Ok(total)
}

/// Recompute and upsert the summary row of one container
pub async fn refresh_summary(
    conn: &mut PgConnection,
    container_id: Uuid,
) -> AppResult<ContainerFinancialSummary> {
    let (total_weight_kg, base_cost, shipment_cost, amount_paid, profit_margin_percentage) =
        sqlx::query_as::<_, (Decimal, Decimal, Decimal, Decimal, Decimal)>(
            r#"
            SELECT total_weight_kg, base_cost, shipment_cost, amount_paid, profit_margin_percentage
            FROM containers
            WHERE id = $1
            "#,
        )
        .bind(container_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Container".to_string()))?;

    let financials = CostInputs {
        total_weight_kg,
        base_cost,
        shipment_cost,
        amount_paid,
        profit_margin_percentage,
    }
    .derive();
    let actual = actual_selling_total(&mut *conn, container_id).await?;
    let summary =
        ContainerFinancialSummary::from_financials(container_id, &financials, actual, Utc::now());

    sqlx::query(
        r#"
        INSERT INTO container_financial_summary (
            container_id, base_cost, shipment_cost, total_all_costs, profit_margin_percentage,
            expected_selling_total, actual_selling_total, actual_profit, roi_percentage,
            cost_per_kg, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (container_id) DO UPDATE SET
            base_cost = EXCLUDED.base_cost,
            shipment_cost = EXCLUDED.shipment_cost,
            total_all_costs = EXCLUDED.total_all_costs,
            profit_margin_percentage = EXCLUDED.profit_margin_percentage,
            expected_selling_total = EXCLUDED.expected_selling_total,
            actual_selling_total = EXCLUDED.actual_selling_total,
            actual_profit = EXCLUDED.actual_profit,
            roi_percentage = EXCLUDED.roi_percentage,
            cost_per_kg = EXCLUDED.cost_per_kg,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(summary.container_id)
    .bind(summary.base_cost)
    .bind(summary.shipment_cost)
    .bind(summary.total_all_costs)
    .bind(summary.profit_margin_percentage)
    .bind(summary.expected_selling_total)
    .bind(summary.actual_selling_total)
    .bind(summary.actual_profit)
    .bind(summary.roi_percentage)
    .bind(summary.cost_per_kg)
    .bind(summary.updated_at)
    .execute(conn)
    .await?;

    Ok(summary)
}

impl FinancialService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Stored summary of a container; computed on the fly if the row is missing
    pub async fn get_summary(&self, container_id: Uuid) -> AppResult<ContainerFinancialSummary> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT * FROM container_financial_summary WHERE container_id = $1",
        )
        .bind(container_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => self.recalculate(container_id).await,
        }
    }

    pub async fn recalculate(&self, container_id: Uuid) -> AppResult<ContainerFinancialSummary> {
        let mut tx = self.db.begin().await?;
        let summary = refresh_summary(&mut *tx, container_id).await?;
        tx.commit().await?;

        tracing::info!(%container_id, actual = %summary.actual_selling_total, "Financial summary recalculated");
        Ok(summary)
    }

    pub async fn get_overview(&self, filter: &ReportFilter) -> AppResult<FinancialOverview> {
        let range = filter.range()?;
        let query = format!(
            r#"
            SELECT
                COUNT(c.id) FILTER (WHERE c.status = 'pending') AS pending_containers,
                COUNT(c.id) FILTER (WHERE c.status = 'received') AS received_containers,
                COUNT(c.id) FILTER (WHERE c.status = 'processed') AS processed_containers,
                {totals}
            FROM containers c
            LEFT JOIN container_financial_summary s ON s.container_id = c.id
            WHERE {date} BETWEEN $1 AND $2
            "#,
            totals = TOTALS_COLUMNS,
            date = REPORT_DATE,
        );

        let row = sqlx::query_as::<_, OverviewRow>(&query)
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&self.db)
            .await?;

        Ok(FinancialOverview {
            pending_containers: row.pending_containers,
            received_containers: row.received_containers,
            processed_containers: row.processed_containers,
            totals: row.totals.into(),
        })
    }

    pub async fn get_period_rollup(
        &self,
        filter: &ReportFilter,
        period: FinancialPeriod,
    ) -> AppResult<Vec<PeriodRollup>> {
        let range = filter.range()?;
        let query = format!(
            r#"
            SELECT
                TO_CHAR(DATE_TRUNC('{unit}', {date}), '{label}') AS period,
                DATE_TRUNC('{unit}', {date})::date AS period_start,
                {totals}
            FROM containers c
            LEFT JOIN container_financial_summary s ON s.container_id = c.id
            WHERE {date} BETWEEN $1 AND $2
            GROUP BY 1, 2
            ORDER BY period_start ASC
            "#,
            unit = period.date_trunc(),
            label = period.label_format(),
            date = REPORT_DATE,
            totals = TOTALS_COLUMNS,
        );

        let rows = sqlx::query_as::<_, PeriodRow>(&query)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PeriodRollup {
                period: row.period,
                period_start: row.period_start,
                totals: row.totals.into(),
            })
            .collect())
    }

    pub async fn get_supplier_rollup(&self, filter: &ReportFilter) -> AppResult<Vec<SupplierRollup>> {
        let range = filter.range()?;
        let query = format!(
            r#"
            SELECT
                c.supplier_id,
                COALESCE(sp.name, 'Unassigned') AS supplier_name,
                {totals}
            FROM containers c
            LEFT JOIN suppliers sp ON sp.id = c.supplier_id
            LEFT JOIN container_financial_summary s ON s.container_id = c.id
            WHERE {date} BETWEEN $1 AND $2
            GROUP BY c.supplier_id, sp.name
            ORDER BY total_cost DESC
            "#,
            totals = TOTALS_COLUMNS,
            date = REPORT_DATE,
        );

        let rows = sqlx::query_as::<_, SupplierRow>(&query)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| SupplierRollup {
                supplier_id: row.supplier_id,
                supplier_name: row.supplier_name,
                totals: row.totals.into(),
            })
            .collect())
    }

    /// Export report rows as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_export_of_rollups() {
        let totals = RollupTotals {
            container_count: 2,
            total_cost: Decimal::from(1050),
            actual_revenue: Decimal::from(1260),
            ..Default::default()
        }
        .finalize();
        let rows = vec![RollupCsvRow::new("2024-01", &totals)];

        let csv = FinancialService::export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("label,container_count,total_weight_kg,total_cost,amount_paid,remaining_balance,expected_revenue,actual_revenue,actual_profit,roi_percentage")
        );
        let record = lines.next().unwrap();
        assert!(record.starts_with("2024-01,2,0,1050,"));
        assert!(record.contains(",210,"));
    }

    #[test]
    fn test_report_filter_rejects_inverted_range() {
        let filter = ReportFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        assert!(filter.range().is_err());
        assert!(ReportFilter::default().range().is_ok());
    }
}
