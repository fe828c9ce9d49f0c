//! HTTP handlers for financial roll-ups

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use shared::FinancialPeriod;

use crate::error::{AppError, AppResult};
use crate::middleware::{Access, CurrentUser};
use crate::response::{ApiQuery, ApiResponse};
use crate::services::financial::{FinancialService, ReportFilter, RollupCsvRow};
use crate::AppState;

/// Query parameters for roll-up endpoints
#[derive(Debug, Deserialize)]
pub struct FinancialReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `month` (default), `quarter` or `year`
    pub group_by: Option<String>,
    pub format: Option<String>, // "json" or "csv"
}

impl FinancialReportQuery {
    fn filter(&self) -> ReportFilter {
        ReportFilter {
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    fn wants_csv(&self) -> bool {
        self.format.as_deref() == Some("csv")
    }
}

fn csv_attachment(filename: &'static str, csv: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        csv,
    )
        .into_response()
}

/// Totals across all containers
pub async fn get_financial_overview(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(query): ApiQuery<FinancialReportQuery>,
) -> AppResult<Response> {
    current_user.0.require(Access::Admin)?;
    let service = FinancialService::new(state.db);
    let overview = service.get_overview(&query.filter()).await?;

    if query.wants_csv() {
        let row = RollupCsvRow::new("all", &overview.totals);
        let csv = FinancialService::export_to_csv(&[row])?;
        return Ok(csv_attachment("financial_overview.csv", csv));
    }

    Ok(ApiResponse::new("Financial overview retrieved", overview).into_response())
}

/// Roll-up by month, quarter or year of arrival
pub async fn get_period_rollup(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(query): ApiQuery<FinancialReportQuery>,
) -> AppResult<Response> {
    current_user.0.require(Access::Admin)?;
    let period =
        FinancialPeriod::parse(query.group_by.as_deref()).map_err(|msg| AppError::validation("group_by", msg))?;
    let service = FinancialService::new(state.db);
    let data = service.get_period_rollup(&query.filter(), period).await?;

    if query.wants_csv() {
        let rows: Vec<RollupCsvRow<'_>> =
            data.iter().map(|r| RollupCsvRow::new(&r.period, &r.totals)).collect();
        let csv = FinancialService::export_to_csv(&rows)?;
        return Ok(csv_attachment("financial_periods.csv", csv));
    }

    Ok(ApiResponse::new(
        "Period roll-up retrieved",
        json!({ "group_by": period, "periods": data }),
    )
    .into_response())
}

/// Roll-up per supplier
pub async fn get_supplier_rollup(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(query): ApiQuery<FinancialReportQuery>,
) -> AppResult<Response> {
    current_user.0.require(Access::Admin)?;
    let service = FinancialService::new(state.db);
    let data = service.get_supplier_rollup(&query.filter()).await?;

    if query.wants_csv() {
        let rows: Vec<RollupCsvRow<'_>> = data
            .iter()
            .map(|r| RollupCsvRow::new(&r.supplier_name, &r.totals))
            .collect();
        let csv = FinancialService::export_to_csv(&rows)?;
        return Ok(csv_attachment("financial_suppliers.csv", csv));
    }

    Ok(ApiResponse::new("Supplier roll-up retrieved", json!({ "suppliers": data })).into_response())
}
