//! Container service: intake records, line items and the processing run

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use shared::{
    financial::{ContainerFinancials, CostInputs},
    plan_processing, BoxSpec, Container, ContainerFinancialSummary, ContainerLineItem,
    ContainerStatus, LineItemKind, NewBoxSpec, NewItemSpec, PaginatedResponse, Pagination,
    PaginationMeta, ProcessingPlanError, ProcessingSummary, ProcessingTally,
};
use sqlx::{Connection, FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::financial::refresh_summary;
use super::materializer::{self, MaterializeContext};
use super::stock;
use crate::error::{AppError, AppResult};

/// Container service for intake and processing
#[derive(Clone)]
pub struct ContainerService {
    db: PgPool,
}

/// Line item as submitted by the UI
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    #[serde(flatten)]
    pub kind: LineItemKind,
    pub quantity: i32,
}

/// Input for creating a container
#[derive(Debug, Deserialize)]
pub struct CreateContainerInput {
    pub container_number: String,
    pub supplier_id: Option<Uuid>,
    pub arrival_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub costs: CostInputs,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
}

/// Input for updating container metadata and cost fields.
///
/// Allowed at every status. An absent field keeps its value; an explicit
/// `null` clears the nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateContainerInput {
    pub container_number: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub supplier_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub arrival_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub total_weight_kg: Option<Decimal>,
    pub base_cost: Option<Decimal>,
    pub shipment_cost: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub profit_margin_percentage: Option<Decimal>,
}

/// `null` becomes `Some(None)`; `#[serde(default)]` covers the absent case
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// List filter
#[derive(Debug, Default, Deserialize)]
pub struct ContainerFilter {
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub arrival_from: Option<NaiveDate>,
    pub arrival_to: Option<NaiveDate>,
    /// Substring of the container number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A container with its line items and financial summary
#[derive(Debug, Serialize)]
pub struct ContainerDetail {
    pub container: Container,
    pub items: Vec<ContainerLineItem>,
    pub financial_summary: ContainerFinancialSummary,
}

/// Result of a successful processing run
#[derive(Debug, Serialize)]
pub struct ProcessOutcome {
    pub container_id: Uuid,
    pub status: ContainerStatus,
    #[serde(flatten)]
    pub summary: ProcessingSummary,
    pub financial_summary: ContainerFinancialSummary,
}

/// Live calculation without persistence
#[derive(Debug, Serialize)]
pub struct CostPreview {
    #[serde(flatten)]
    pub financials: ContainerFinancials,
    pub line_items_selling_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PreviewInput {
    #[serde(flatten)]
    pub costs: CostInputs,
    /// `(selling_price, quantity)` pairs of line items entered so far
    #[serde(default)]
    pub lines: Vec<PreviewLine>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewLine {
    pub selling_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, FromRow)]
struct ContainerRow {
    id: Uuid,
    container_number: String,
    supplier_id: Option<Uuid>,
    supplier_name: Option<String>,
    total_weight_kg: Decimal,
    base_cost: Decimal,
    price_per_kg: Decimal,
    shipment_cost: Decimal,
    total_cost: Decimal,
    amount_paid: Decimal,
    remaining_balance: Decimal,
    profit_margin_percentage: Decimal,
    arrival_date: Option<NaiveDate>,
    notes: Option<String>,
    status: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    received_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    processed_by: Option<Uuid>,
}

impl TryFrom<ContainerRow> for Container {
    type Error = AppError;

    fn try_from(row: ContainerRow) -> Result<Self, Self::Error> {
        Ok(Container {
            id: row.id,
            container_number: row.container_number,
            supplier_id: row.supplier_id,
            supplier_name: row.supplier_name,
            total_weight_kg: row.total_weight_kg,
            base_cost: row.base_cost,
            price_per_kg: row.price_per_kg,
            shipment_cost: row.shipment_cost,
            total_cost: row.total_cost,
            amount_paid: row.amount_paid,
            remaining_balance: row.remaining_balance,
            profit_margin_percentage: row.profit_margin_percentage,
            arrival_date: row.arrival_date,
            notes: row.notes,
            status: row.status.parse().map_err(AppError::Internal)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            received_at: row.received_at,
            processed_at: row.processed_at,
            processed_by: row.processed_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    id: Uuid,
    container_id: Uuid,
    item_type: String,
    quantity: i32,
    item_id: Option<Uuid>,
    item_name: Option<String>,
    item_code: Option<String>,
    description: Option<String>,
    category_id: Option<Uuid>,
    brand: Option<String>,
    size: Option<String>,
    color: Option<String>,
    material: Option<String>,
    unit_cost: Option<Decimal>,
    selling_price: Option<Decimal>,
    box_source: Option<String>,
    box_id: Option<Uuid>,
    box_number: Option<String>,
    box_name: Option<String>,
    box_type: Option<String>,
    box_unit_cost: Option<Decimal>,
    materialized_id: Option<Uuid>,
    is_processed: bool,
    processed_at: Option<DateTime<Utc>>,
    processed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LineItemRow> for ContainerLineItem {
    type Error = AppError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| AppError::Internal(format!("Line item {} is missing {}", row.id, what));

        let kind = match row.item_type.as_str() {
            "existing_item" => LineItemKind::ExistingItem {
                item_id: row.item_id.ok_or_else(|| corrupt("item_id"))?,
            },
            "new_item" => LineItemKind::NewItem(NewItemSpec {
                name: row.item_name.clone().ok_or_else(|| corrupt("item_name"))?,
                item_code: row.item_code.clone().ok_or_else(|| corrupt("item_code"))?,
                description: row.description.clone(),
                category_id: row.category_id,
                brand: row.brand.clone(),
                size: row.size.clone(),
                color: row.color.clone(),
                material: row.material.clone(),
                unit_cost: row.unit_cost.unwrap_or_default(),
                selling_price: row.selling_price.unwrap_or_default(),
            }),
            "box" => match row.box_source.as_deref() {
                Some("existing") => LineItemKind::Box(BoxSpec::Existing {
                    box_id: row.box_id.ok_or_else(|| corrupt("box_id"))?,
                }),
                Some("new") => LineItemKind::Box(BoxSpec::New(NewBoxSpec {
                    box_number: row.box_number.clone().ok_or_else(|| corrupt("box_number"))?,
                    box_name: row.box_name.clone().ok_or_else(|| corrupt("box_name"))?,
                    box_type: row.box_type.clone(),
                    unit_cost: row.box_unit_cost.unwrap_or_default(),
                })),
                _ => return Err(corrupt("box_source")),
            },
            other => {
                return Err(AppError::Internal(format!(
                    "Line item {} has unknown type '{}'",
                    row.id, other
                )))
            }
        };

        Ok(ContainerLineItem {
            id: row.id,
            container_id: row.container_id,
            kind,
            quantity: row.quantity,
            is_processed: row.is_processed,
            materialized_id: row.materialized_id,
            processed_at: row.processed_at,
            processed_by: row.processed_by,
            created_at: row.created_at,
        })
    }
}

const CONTAINER_COLUMNS: &str = r#"
    c.id, c.container_number, c.supplier_id, sp.name AS supplier_name,
    c.total_weight_kg, c.base_cost, c.price_per_kg, c.shipment_cost, c.total_cost,
    c.amount_paid, c.remaining_balance, c.profit_margin_percentage, c.arrival_date,
    c.notes, c.status, c.created_by, c.created_at, c.updated_at, c.received_at,
    c.processed_at, c.processed_by
"#;

fn plan_error(err: ProcessingPlanError) -> AppError {
    match err {
        ProcessingPlanError::InvalidTransition(_) => AppError::InvalidStateTransition(err.to_string()),
        ProcessingPlanError::NothingToProcess => AppError::ValidationError(err.to_string()),
    }
}

fn validate_items(items: &[LineItemInput]) -> AppResult<()> {
    for (index, item) in items.iter().enumerate() {
        shared::validate_line_item(&item.kind, item.quantity).map_err(|e| {
            AppError::validation(&format!("items[{}].{}", index, e.field), e.message)
        })?;
    }
    Ok(())
}

async fn fetch_container(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<Container> {
    let query = format!(
        "SELECT {} FROM containers c LEFT JOIN suppliers sp ON sp.id = c.supplier_id WHERE c.id = $1{}",
        CONTAINER_COLUMNS,
        if lock { " FOR UPDATE OF c" } else { "" }
    );
    sqlx::query_as::<_, ContainerRow>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Container".to_string()))?
        .try_into()
}

async fn fetch_items(conn: &mut PgConnection, container_id: Uuid) -> AppResult<Vec<ContainerLineItem>> {
    sqlx::query_as::<_, LineItemRow>(
        "SELECT * FROM container_items WHERE container_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(container_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(ContainerLineItem::try_from)
    .collect()
}

async fn insert_item(
    conn: &mut PgConnection,
    container_id: Uuid,
    item: &LineItemInput,
) -> AppResult<ContainerLineItem> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        INSERT INTO container_items (
            container_id, item_type, quantity, item_id,
            item_name, item_code, description, category_id, brand, size, color, material,
            unit_cost, selling_price,
            box_source, box_id, box_number, box_name, box_type, box_unit_cost
        )
        "#,
    );

    let no_item: Option<&NewItemSpec> = None;
    let no_box: Option<&NewBoxSpec> = None;
    let (item_id, new_item, box_source, box_id, new_box) = match &item.kind {
        LineItemKind::ExistingItem { item_id } => (Some(*item_id), no_item, None, None, no_box),
        LineItemKind::NewItem(spec) => (None, Some(spec), None, None, no_box),
        LineItemKind::Box(BoxSpec::Existing { box_id }) => {
            (None, no_item, Some("existing"), Some(*box_id), no_box)
        }
        LineItemKind::Box(BoxSpec::New(spec)) => (None, no_item, Some("new"), None, Some(spec)),
    };

    builder.push_values(std::iter::once(()), |mut row, _| {
        row.push_bind(container_id)
            .push_bind(item.kind.type_tag())
            .push_bind(item.quantity)
            .push_bind(item_id)
            .push_bind(new_item.map(|s| s.name.trim().to_string()))
            .push_bind(new_item.map(|s| s.item_code.trim().to_string()))
            .push_bind(new_item.and_then(|s| s.description.clone()))
            .push_bind(new_item.and_then(|s| s.category_id))
            .push_bind(new_item.and_then(|s| s.brand.clone()))
            .push_bind(new_item.and_then(|s| s.size.clone()))
            .push_bind(new_item.and_then(|s| s.color.clone()))
            .push_bind(new_item.and_then(|s| s.material.clone()))
            .push_bind(new_item.map(|s| s.unit_cost))
            .push_bind(new_item.map(|s| s.selling_price))
            .push_bind(box_source)
            .push_bind(box_id)
            .push_bind(new_box.map(|s| s.box_number.trim().to_string()))
            .push_bind(new_box.map(|s| s.box_name.trim().to_string()))
            .push_bind(new_box.and_then(|s| s.box_type.clone()))
            .push_bind(new_box.map(|s| s.unit_cost));
    });
    builder.push(" RETURNING *");

    builder
        .build_query_as::<LineItemRow>()
        .fetch_one(conn)
        .await?
        .try_into()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ContainerFilter, status: Option<ContainerStatus>) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND c.status = ").push_bind(status.as_str());
    }
    if let Some(supplier_id) = filter.supplier_id {
        builder.push(" AND c.supplier_id = ").push_bind(supplier_id);
    }
    if let Some(from) = filter.arrival_from {
        builder.push(" AND c.arrival_date >= ").push_bind(from);
    }
    if let Some(to) = filter.arrival_to {
        builder.push(" AND c.arrival_date <= ").push_bind(to);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND c.container_number ILIKE ")
            .push_bind(format!("%{}%", search.replace('%', "\\%").replace('_', "\\_")));
    }
}

impl ContainerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a container with its initial line items
    pub async fn create(&self, user_id: Uuid, input: CreateContainerInput) -> AppResult<ContainerDetail> {
        shared::validate_container_number(&input.container_number)
            .map_err(|msg| AppError::validation("container_number", msg))?;
        shared::validate_cost_inputs(&input.costs)?;
        validate_items(&input.items)?;

        let financials = input.costs.derive();
        let mut tx = self.db.begin().await?;

        let container_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO containers (
                container_number, supplier_id, total_weight_kg, base_cost, price_per_kg,
                shipment_cost, total_cost, amount_paid, remaining_balance,
                profit_margin_percentage, arrival_date, notes, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending', $13)
            RETURNING id
            "#,
        )
        .bind(input.container_number.trim())
        .bind(input.supplier_id)
        .bind(input.costs.total_weight_kg)
        .bind(financials.base_cost)
        .bind(financials.price_per_kg)
        .bind(financials.shipment_cost)
        .bind(financials.total_cost)
        .bind(financials.amount_paid)
        .bind(financials.remaining_balance)
        .bind(financials.profit_margin_percentage)
        .bind(input.arrival_date)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::unique_violation(e, "container_number"))?;

        let mut items = Vec::with_capacity(input.items.len());
        for item in &input.items {
            items.push(insert_item(&mut *tx, container_id, item).await?);
        }

        let summary = refresh_summary(&mut *tx, container_id).await?;
        let container = fetch_container(&mut *tx, container_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            %container_id,
            container_number = %container.container_number,
            line_items = items.len(),
            "Container created"
        );

        Ok(ContainerDetail {
            container,
            items,
            financial_summary: summary,
        })
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ContainerDetail> {
        let mut conn = self.db.acquire().await?;
        let container = fetch_container(&mut *conn, id, false).await?;
        let items = fetch_items(&mut *conn, id).await?;
        drop(conn);

        let financial_summary = super::FinancialService::new(self.db.clone()).get_summary(id).await?;

        Ok(ContainerDetail {
            container,
            items,
            financial_summary,
        })
    }

    pub async fn list(
        &self,
        filter: &ContainerFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Container>> {
        let status = filter
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ContainerStatus>())
            .transpose()
            .map_err(|msg| AppError::validation("status", msg))?;
        shared::validate_date_range(filter.arrival_from, filter.arrival_to)
            .map_err(|msg| AppError::validation("arrival_from", msg))?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM containers c");
        push_filters(&mut count, filter, status);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM containers c LEFT JOIN suppliers sp ON sp.id = c.supplier_id",
            CONTAINER_COLUMNS
        ));
        push_filters(&mut select, filter, status);
        select
            .push(" ORDER BY c.created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let data = select
            .build_query_as::<ContainerRow>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Container::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, u64::try_from(total).unwrap_or(0)),
        })
    }

    /// Update metadata and cost inputs; derived figures and the summary follow
    pub async fn update(&self, id: Uuid, input: UpdateContainerInput) -> AppResult<ContainerDetail> {
        if let Some(number) = &input.container_number {
            shared::validate_container_number(number)
                .map_err(|msg| AppError::validation("container_number", msg))?;
        }

        let mut tx = self.db.begin().await?;
        let current = fetch_container(&mut *tx, id, true).await?;

        let costs = CostInputs {
            total_weight_kg: input.total_weight_kg.unwrap_or(current.total_weight_kg),
            base_cost: input.base_cost.unwrap_or(current.base_cost),
            shipment_cost: input.shipment_cost.unwrap_or(current.shipment_cost),
            amount_paid: input.amount_paid.unwrap_or(current.amount_paid),
            profit_margin_percentage: input
                .profit_margin_percentage
                .unwrap_or(current.profit_margin_percentage),
        };
        shared::validate_cost_inputs(&costs)?;
        let financials = costs.derive();

        sqlx::query(
            r#"
            UPDATE containers SET
                container_number = $2,
                supplier_id = $3,
                arrival_date = $4,
                notes = $5,
                total_weight_kg = $6,
                base_cost = $7,
                price_per_kg = $8,
                shipment_cost = $9,
                total_cost = $10,
                amount_paid = $11,
                remaining_balance = $12,
                profit_margin_percentage = $13,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.container_number.as_deref().map(str::trim).unwrap_or(&current.container_number))
        .bind(input.supplier_id.unwrap_or(current.supplier_id))
        .bind(input.arrival_date.unwrap_or(current.arrival_date))
        .bind(input.notes.unwrap_or(current.notes))
        .bind(costs.total_weight_kg)
        .bind(financials.base_cost)
        .bind(financials.price_per_kg)
        .bind(financials.shipment_cost)
        .bind(financials.total_cost)
        .bind(financials.amount_paid)
        .bind(financials.remaining_balance)
        .bind(financials.profit_margin_percentage)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::unique_violation(e, "container_number"))?;

        let summary = refresh_summary(&mut *tx, id).await?;
        let container = fetch_container(&mut *tx, id, false).await?;
        let items = fetch_items(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(container_id = %id, status = %container.status, "Container updated");

        Ok(ContainerDetail {
            container,
            items,
            financial_summary: summary,
        })
    }

    /// Add a line item; rejected once the container is processed
    pub async fn add_item(&self, id: Uuid, input: LineItemInput) -> AppResult<ContainerLineItem> {
        validate_items(std::slice::from_ref(&input))?;

        let mut tx = self.db.begin().await?;
        let container = fetch_container(&mut *tx, id, true).await?;
        if !container.status.allows_structural_edits() {
            tracing::warn!(container_id = %id, "Rejected line item on processed container");
            return Err(AppError::InvalidStateTransition(
                "Line items cannot be added to a processed container".to_string(),
            ));
        }

        let item = insert_item(&mut *tx, id, &input).await?;
        tx.commit().await?;

        tracing::info!(container_id = %id, line_item_id = %item.id, item_type = item.kind.type_tag(), "Line item added");
        Ok(item)
    }

    pub async fn remove_item(&self, id: Uuid, item_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let container = fetch_container(&mut *tx, id, true).await?;
        if !container.status.allows_structural_edits() {
            return Err(AppError::InvalidStateTransition(
                "Line items cannot be removed from a processed container".to_string(),
            ));
        }

        let result = sqlx::query(
            "DELETE FROM container_items WHERE id = $1 AND container_id = $2 AND is_processed = FALSE",
        )
        .bind(item_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Unprocessed line item".to_string()));
        }

        refresh_summary(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(container_id = %id, line_item_id = %item_id, "Line item removed");
        Ok(())
    }

    /// Delete a container that has not committed any stock
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let container = fetch_container(&mut *tx, id, true).await?;

        let processed_items = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM container_items WHERE container_id = $1 AND is_processed = TRUE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if container.status == ContainerStatus::Processed || processed_items > 0 {
            return Err(AppError::InvalidStateTransition(
                "A container with processed stock cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM containers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(container_id = %id, container_number = %container.container_number, "Container deleted");
        Ok(())
    }

    /// `pending -> received`; no side effects besides the timestamp
    pub async fn receive(&self, id: Uuid) -> AppResult<Container> {
        let mut tx = self.db.begin().await?;
        let container = fetch_container(&mut *tx, id, true).await?;

        container
            .status
            .transition(ContainerStatus::Received)
            .map_err(|e| AppError::InvalidStateTransition(format!("Container {}", e)))?;

        sqlx::query(
            "UPDATE containers SET status = 'received', received_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let container = fetch_container(&mut *tx, id, false).await?;
        tx.commit().await?;

        tracing::info!(container_id = %id, "Container received");
        Ok(container)
    }

    /// `received -> processed`: materialize every unprocessed line item.
    ///
    /// Each item runs inside its own savepoint so all failures are
    /// collected; any failure rolls back the whole run.
    pub async fn process(&self, id: Uuid, user_id: Uuid, barcode_prefix: &str) -> AppResult<ProcessOutcome> {
        let mut tx = self.db.begin().await?;
        let container = fetch_container(&mut *tx, id, true).await?;
        let items = fetch_items(&mut *tx, id).await?;

        let pending = plan_processing(container.status, &items).map_err(|e| {
            tracing::warn!(container_id = %id, status = %container.status, "Processing rejected: {}", e);
            plan_error(e)
        })?;

        let ctx = MaterializeContext {
            container_id: id,
            warehouse_id: stock::warehouse_store_id(&mut *tx).await?,
            user_id,
            barcode_prefix,
        };

        let mut tally = ProcessingTally::new();
        for item in pending {
            let mut savepoint = tx.begin().await?;
            match materializer::materialize(&mut *savepoint, item, &ctx).await {
                Ok(outcome) => {
                    savepoint.commit().await?;
                    tally.record(item, outcome);
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    tracing::warn!(container_id = %id, line_item_id = %item.id, "Materialization failed: {}", err);
                    tally.record_failure(item, &err);
                }
            }
        }

        let summary = tally.finish().map_err(|errors| {
            tracing::warn!(container_id = %id, failures = errors.len(), "Container processing rolled back");
            AppError::ProcessingFailed { errors }
        })?;

        sqlx::query(
            r#"
            UPDATE containers
            SET status = 'processed', processed_at = NOW(), processed_by = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let financial_summary = refresh_summary(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            container_id = %id,
            items = summary.items_processed,
            boxes = summary.boxes_processed,
            skipped = summary.skipped,
            selling_value = %summary.selling_value,
            "Container processed"
        );

        Ok(ProcessOutcome {
            container_id: id,
            status: ContainerStatus::Processed,
            summary,
            financial_summary,
        })
    }

    /// Financial figures for a form that has not been saved yet
    pub fn preview(input: &PreviewInput) -> AppResult<CostPreview> {
        shared::validate_cost_inputs(&input.costs)?;
        for (index, line) in input.lines.iter().enumerate() {
            shared::validate_quantity(line.quantity)
                .map_err(|msg| AppError::validation(&format!("lines[{}].quantity", index), msg))?;
            shared::validate_money(line.selling_price)
                .map_err(|msg| AppError::validation(&format!("lines[{}].selling_price", index), msg))?;
        }

        Ok(CostPreview {
            financials: input.costs.derive(),
            line_items_selling_total: shared::financial::round_money(shared::financial::selling_total(
                input.lines.iter().map(|l| (l.selling_price, l.quantity)),
            )),
        })
    }
}
