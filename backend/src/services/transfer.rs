//! Transfer shipments between the warehouse and stores
//!
//! One state machine drives both flows: a staged transfer is shipped and
//! received by separate requests, an immediate one runs every step inside
//! the creating transaction.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    aggregate_requests, check_availability, check_box_coverage, generate_shipment_number,
    receive_movements, resolve_lines, ship_movements, shipment_total, CancelEffect, DispatchMode,
    PaginatedResponse, Pagination, PaginationMeta, ReferenceType, StockKey, TransferBox,
    TransferItem, TransferLine, TransferLineRequest, TransferShipment, TransferStatus,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::stock::{self, LedgerReference, StockPricing};
use crate::error::{AppError, AppResult};

/// Transfer service
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

/// One requested line, optionally packed into a named box
#[derive(Debug, Clone, Deserialize)]
pub struct TransferItemInput {
    #[serde(flatten)]
    pub line: TransferLineRequest,
    pub box_number: Option<String>,
}

/// A shipping box; a warehouse source may draw it from a warehouse box
#[derive(Debug, Clone, Deserialize)]
pub struct TransferBoxInput {
    pub box_number: String,
    pub warehouse_box_id: Option<Uuid>,
    #[serde(default)]
    pub packed_quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub source_store_id: Uuid,
    /// Default for items without their own destination
    pub destination_store_id: Option<Uuid>,
    pub notes: Option<String>,
    #[serde(default)]
    pub dispatch: DispatchMode,
    pub items: Vec<TransferItemInput>,
    #[serde(default)]
    pub boxes: Vec<TransferBoxInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferFilter {
    pub status: Option<String>,
    pub source_store_id: Option<Uuid>,
    /// Matches the shipment default or any item destination
    pub destination_store_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TransferDetail {
    pub shipment: TransferShipment,
    pub boxes: Vec<TransferBox>,
    pub items: Vec<TransferItem>,
}

#[derive(Debug, FromRow)]
struct ShipmentRow {
    id: Uuid,
    shipment_number: String,
    source_store_id: Uuid,
    destination_store_id: Option<Uuid>,
    status: String,
    notes: Option<String>,
    total_items: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    received_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
}

impl TryFrom<ShipmentRow> for TransferShipment {
    type Error = AppError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(TransferShipment {
            id: row.id,
            shipment_number: row.shipment_number,
            source_store_id: row.source_store_id,
            destination_store_id: row.destination_store_id,
            status: row.status.parse().map_err(AppError::Internal)?,
            notes: row.notes,
            total_items: row.total_items,
            created_by: row.created_by,
            created_at: row.created_at,
            shipped_at: row.shipped_at,
            received_at: row.received_at,
            received_by: row.received_by,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct BoxRow {
    id: Uuid,
    shipment_id: Uuid,
    box_number: String,
    warehouse_box_id: Option<Uuid>,
    packed_quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<BoxRow> for TransferBox {
    fn from(row: BoxRow) -> Self {
        TransferBox {
            id: row.id,
            shipment_id: row.shipment_id,
            box_number: row.box_number,
            warehouse_box_id: row.warehouse_box_id,
            packed_quantity: row.packed_quantity,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    shipment_id: Uuid,
    box_id: Option<Uuid>,
    item_id: Uuid,
    barcode_id: Uuid,
    destination_store_id: Uuid,
    requested_quantity: i32,
    packed_quantity: i32,
    received_quantity: i32,
    unit_cost: Decimal,
    selling_price: Decimal,
}

impl From<ItemRow> for TransferItem {
    fn from(row: ItemRow) -> Self {
        TransferItem {
            id: row.id,
            shipment_id: row.shipment_id,
            box_id: row.box_id,
            item_id: row.item_id,
            barcode_id: row.barcode_id,
            destination_store_id: row.destination_store_id,
            requested_quantity: row.requested_quantity,
            packed_quantity: row.packed_quantity,
            received_quantity: row.received_quantity,
            unit_cost: row.unit_cost,
            selling_price: row.selling_price,
        }
    }
}

fn transition_error(shipment: &TransferShipment, err: impl std::fmt::Display) -> AppError {
    tracing::warn!(shipment_id = %shipment.id, status = %shipment.status, "Transfer transition rejected: {}", err);
    AppError::InvalidStateTransition(format!("Transfer {}", err))
}

/// Lines moved by a shipment, at their packed quantity
fn packed_lines(items: &[TransferItem]) -> Vec<TransferLine> {
    items
        .iter()
        .map(|item| TransferLine {
            item_id: item.item_id,
            barcode_id: item.barcode_id,
            destination_store_id: item.destination_store_id,
            quantity: item.packed_quantity,
        })
        .collect()
}

fn pricing_of(item: &TransferItem) -> StockPricing {
    StockPricing {
        selling_price: item.selling_price,
        cost_price: item.unit_cost,
    }
}

/// Warehouse box draws, keyed like stock rows so shortfalls share one shape
fn box_requests(boxes: &[TransferBoxInput]) -> BTreeMap<StockKey, i64> {
    let mut totals = BTreeMap::new();
    for b in boxes {
        if let Some(box_id) = b.warehouse_box_id {
            *totals.entry((box_id, Uuid::nil())).or_insert(0) += i64::from(b.packed_quantity);
        }
    }
    totals
}

fn validate_boxes(
    boxes: &[TransferBoxInput],
    items: &[TransferItemInput],
    source_is_warehouse: bool,
) -> AppResult<()> {
    for (index, b) in boxes.iter().enumerate() {
        if b.box_number.trim().is_empty() {
            return Err(AppError::validation(&format!("boxes[{}].box_number", index), "Box number is required"));
        }
        if b.packed_quantity < 0 {
            return Err(AppError::validation(
                &format!("boxes[{}].packed_quantity", index),
                "Packed quantity cannot be negative",
            ));
        }
        if b.warehouse_box_id.is_some() && !source_is_warehouse {
            return Err(AppError::validation(
                &format!("boxes[{}].warehouse_box_id", index),
                "Warehouse boxes can only ship from the warehouse",
            ));
        }
        if boxes[..index].iter().any(|other| other.box_number.trim() == b.box_number.trim()) {
            return Err(AppError::validation(&format!("boxes[{}].box_number", index), "Duplicate box number"));
        }
    }

    for (index, item) in items.iter().enumerate() {
        if let Some(number) = item.box_number.as_deref() {
            if !boxes.iter().any(|b| b.box_number.trim() == number.trim()) {
                return Err(AppError::validation(
                    &format!("items[{}].box_number", index),
                    "Item refers to an unknown box",
                ));
            }
        }
    }
    Ok(())
}

async fn fetch_shipment(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<TransferShipment> {
    let query = if lock {
        "SELECT * FROM transfer_shipments WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM transfer_shipments WHERE id = $1"
    };
    sqlx::query_as::<_, ShipmentRow>(query)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?
        .try_into()
}

async fn fetch_items(conn: &mut PgConnection, shipment_id: Uuid) -> AppResult<Vec<TransferItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT * FROM transfer_items WHERE shipment_id = $1 ORDER BY item_id, barcode_id, destination_store_id",
    )
    .bind(shipment_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_boxes(conn: &mut PgConnection, shipment_id: Uuid) -> AppResult<Vec<TransferBox>> {
    let rows = sqlx::query_as::<_, BoxRow>(
        "SELECT * FROM transfer_boxes WHERE shipment_id = $1 ORDER BY box_number",
    )
    .bind(shipment_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Check that every destination exists
async fn ensure_stores_exist(conn: &mut PgConnection, store_ids: &[Uuid]) -> AppResult<()> {
    let mut wanted = store_ids.to_vec();
    wanted.sort();
    wanted.dedup();

    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM stores WHERE id = ANY($1)")
        .bind(&wanted)
        .fetch_all(conn)
        .await?;

    match wanted.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(AppError::NotFound(format!("Store {}", missing))),
        None => Ok(()),
    }
}

/// Unit cost and selling price of a barcode, checking it belongs to the item
async fn line_pricing(conn: &mut PgConnection, item_id: Uuid, barcode_id: Uuid) -> AppResult<StockPricing> {
    let (cost_price, selling_price) = sqlx::query_as::<_, (Decimal, Decimal)>(
        r#"
        SELECT i.base_price, COALESCE(b.price, i.selling_price)
        FROM inventory_items i
        JOIN barcodes b ON b.item_id = i.id AND b.id = $2
        WHERE i.id = $1
        "#,
    )
    .bind(item_id)
    .bind(barcode_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Item {} with barcode {}", item_id, barcode_id)))?;

    Ok(StockPricing {
        selling_price,
        cost_price,
    })
}

/// `pending -> in_transit`: take the packed quantities out of the source
async fn ship_shipment(conn: &mut PgConnection, id: Uuid, user_id: Uuid) -> AppResult<()> {
    let shipment = fetch_shipment(&mut *conn, id, true).await?;
    shipment
        .status
        .transition(TransferStatus::InTransit)
        .map_err(|e| transition_error(&shipment, e))?;

    sqlx::query("UPDATE transfer_items SET packed_quantity = requested_quantity WHERE shipment_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let items = fetch_items(&mut *conn, id).await?;
    let source_is_warehouse = stock::store_is_warehouse(&mut *conn, shipment.source_store_id).await?;
    let reference = LedgerReference {
        reference_type: ReferenceType::Shipment,
        reference_id: Some(id),
        user_id,
        notes: Some(shipment.shipment_number.as_str()),
    };

    for movement in ship_movements(shipment.source_store_id, source_is_warehouse, &packed_lines(&items)) {
        stock::apply_movement(&mut *conn, &movement, StockPricing::default(), &reference).await?;
    }

    for b in fetch_boxes(&mut *conn, id).await? {
        if let Some(box_id) = b.warehouse_box_id {
            stock::deduct_box(&mut *conn, box_id, b.packed_quantity).await?;
        }
    }

    sqlx::query(
        r#"
        UPDATE transfer_shipments
        SET status = 'in_transit', shipped_at = NOW(), shipped_by = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(shipment_id = %id, shipment_number = %shipment.shipment_number, lines = items.len(), "Transfer shipped");
    Ok(())
}

/// `in_transit -> received`: credit every line at its own destination
async fn receive_shipment(conn: &mut PgConnection, id: Uuid, user_id: Uuid) -> AppResult<()> {
    let shipment = fetch_shipment(&mut *conn, id, true).await?;
    shipment
        .status
        .transition(TransferStatus::Received)
        .map_err(|e| transition_error(&shipment, e))?;

    let items = fetch_items(&mut *conn, id).await?;
    let reference = LedgerReference {
        reference_type: ReferenceType::Shipment,
        reference_id: Some(id),
        user_id,
        notes: Some(shipment.shipment_number.as_str()),
    };

    let movements = receive_movements(&packed_lines(&items));
    for (item, movement) in items.iter().zip(&movements) {
        stock::apply_movement(&mut *conn, movement, pricing_of(item), &reference).await?;
        if stock::ensure_assignment(&mut *conn, movement.store_id, movement.item_id).await? {
            tracing::debug!(store_id = %movement.store_id, item_id = %movement.item_id, "Store item assignment created");
        }
    }

    sqlx::query("UPDATE transfer_items SET received_quantity = packed_quantity WHERE shipment_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        UPDATE transfer_shipments
        SET status = 'received', received_at = NOW(), received_by = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(shipment_id = %id, shipment_number = %shipment.shipment_number, lines = items.len(), "Transfer received");
    Ok(())
}

/// Cancel; a shipment in transit puts its packed stock back at the source
async fn cancel_shipment(conn: &mut PgConnection, id: Uuid, user_id: Uuid) -> AppResult<CancelEffect> {
    let shipment = fetch_shipment(&mut *conn, id, true).await?;
    let effect = shipment
        .status
        .cancel_effect()
        .map_err(|e| transition_error(&shipment, e))?;

    if effect == CancelEffect::RestoreSource {
        let items = fetch_items(&mut *conn, id).await?;
        let source_is_warehouse = stock::store_is_warehouse(&mut *conn, shipment.source_store_id).await?;
        let reference = LedgerReference {
            reference_type: ReferenceType::ShipmentCancel,
            reference_id: Some(id),
            user_id,
            notes: Some(shipment.shipment_number.as_str()),
        };

        let movements = shared::cancel_movements(
            effect,
            shipment.source_store_id,
            source_is_warehouse,
            &packed_lines(&items),
        );
        for (item, movement) in items.iter().zip(&movements) {
            stock::apply_movement(&mut *conn, movement, pricing_of(item), &reference).await?;
        }

        for b in fetch_boxes(&mut *conn, id).await? {
            if let Some(box_id) = b.warehouse_box_id {
                stock::credit_box(&mut *conn, box_id, b.packed_quantity, None).await?;
            }
        }
    }

    sqlx::query(
        r#"
        UPDATE transfer_shipments
        SET status = 'cancelled', cancelled_at = NOW(), cancelled_by = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        shipment_id = %id,
        from = %shipment.status,
        effect = ?effect,
        "Transfer cancelled"
    );
    Ok(effect)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransferFilter, status: Option<TransferStatus>) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND s.status = ").push_bind(status.as_str());
    }
    if let Some(source) = filter.source_store_id {
        builder.push(" AND s.source_store_id = ").push_bind(source);
    }
    if let Some(destination) = filter.destination_store_id {
        builder
            .push(" AND (s.destination_store_id = ")
            .push_bind(destination)
            .push(" OR EXISTS (SELECT 1 FROM transfer_items ti WHERE ti.shipment_id = s.id AND ti.destination_store_id = ")
            .push_bind(destination)
            .push("))");
    }
}

impl TransferService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a transfer after checking source stock for every line
    pub async fn create(&self, user_id: Uuid, input: CreateTransferInput) -> AppResult<TransferDetail> {
        let requests: Vec<TransferLineRequest> = input.items.iter().map(|i| i.line.clone()).collect();
        let lines = resolve_lines(input.source_store_id, input.destination_store_id, &requests)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        let total_items = shipment_total(&lines).map_err(|e| AppError::validation("items", e.to_string()))?;

        let mut tx = self.db.begin().await?;

        let source_is_warehouse = stock::store_is_warehouse(&mut *tx, input.source_store_id).await?;
        validate_boxes(&input.boxes, &input.items, source_is_warehouse)?;
        let destinations: Vec<Uuid> = lines.iter().map(|l| l.destination_store_id).collect();
        ensure_stores_exist(&mut *tx, &destinations).await?;

        // Lock before checking so the shortfall report and the insert agree.
        // The warehouse is checked per unit too; only its deduction goes
        // through boxes.
        let requested = aggregate_requests(&lines);
        let keys: Vec<StockKey> = requested.keys().copied().collect();
        let locked = stock::lock_stock(&mut *tx, input.source_store_id, &keys).await?;
        check_availability(&requested, &locked).map_err(|shortfalls| {
            tracing::warn!(source = %input.source_store_id, count = shortfalls.len(), "Transfer stock shortfall");
            AppError::InsufficientStock(shortfalls)
        })?;

        if source_is_warehouse {
            let drawn = box_requests(&input.boxes);
            check_box_coverage(&lines, drawn.values().sum())
                .map_err(|e| AppError::validation("boxes", e.to_string()))?;

            let box_ids: Vec<Uuid> = drawn.keys().map(|(id, _)| *id).collect();
            let boxes = stock::lock_boxes(&mut *tx, &box_ids).await?;
            if let Some(missing) = box_ids.iter().find(|id| !boxes.contains_key(id)) {
                return Err(AppError::NotFound(format!("Warehouse box {}", missing)));
            }
            let available: HashMap<StockKey, i32> =
                boxes.into_iter().map(|(id, qty)| ((id, Uuid::nil()), qty)).collect();
            check_availability(&drawn, &available).map_err(|shortfalls| {
                tracing::warn!(source = %input.source_store_id, count = shortfalls.len(), "Warehouse box shortfall");
                AppError::InsufficientStock(shortfalls)
            })?;
        }

        let shipment_id = Uuid::new_v4();
        let shipment_number = generate_shipment_number(Utc::now().date_naive(), shipment_id);

        sqlx::query(
            r#"
            INSERT INTO transfer_shipments (
                id, shipment_number, source_store_id, destination_store_id, status,
                notes, total_items, created_by
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
            "#,
        )
        .bind(shipment_id)
        .bind(&shipment_number)
        .bind(input.source_store_id)
        .bind(input.destination_store_id)
        .bind(&input.notes)
        .bind(total_items)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::unique_violation(e, "shipment_number"))?;

        let mut box_ids: HashMap<String, Uuid> = HashMap::new();
        for b in &input.boxes {
            let box_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO transfer_boxes (shipment_id, box_number, warehouse_box_id, packed_quantity)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(shipment_id)
            .bind(b.box_number.trim())
            .bind(b.warehouse_box_id)
            .bind(b.packed_quantity)
            .fetch_one(&mut *tx)
            .await?;
            box_ids.insert(b.box_number.trim().to_string(), box_id);
        }

        for (line, input_item) in lines.iter().zip(&input.items) {
            let pricing = line_pricing(&mut *tx, line.item_id, line.barcode_id).await?;
            let box_id = input_item
                .box_number
                .as_deref()
                .and_then(|number| box_ids.get(number.trim()).copied());

            sqlx::query(
                r#"
                INSERT INTO transfer_items (
                    shipment_id, box_id, item_id, barcode_id, destination_store_id,
                    requested_quantity, unit_cost, selling_price
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(shipment_id)
            .bind(box_id)
            .bind(line.item_id)
            .bind(line.barcode_id)
            .bind(line.destination_store_id)
            .bind(line.quantity)
            .bind(pricing.cost_price)
            .bind(pricing.selling_price)
            .execute(&mut *tx)
            .await?;
        }

        tracing::info!(
            %shipment_id,
            %shipment_number,
            source = %input.source_store_id,
            lines = lines.len(),
            total_items,
            "Transfer created"
        );

        if input.dispatch == DispatchMode::Immediate {
            ship_shipment(&mut *tx, shipment_id, user_id).await?;
            receive_shipment(&mut *tx, shipment_id, user_id).await?;
        }

        let detail = self.detail(&mut *tx, shipment_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn ship(&self, id: Uuid, user_id: Uuid) -> AppResult<TransferDetail> {
        let mut tx = self.db.begin().await?;
        ship_shipment(&mut *tx, id, user_id).await?;
        let detail = self.detail(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn receive(&self, id: Uuid, user_id: Uuid) -> AppResult<TransferDetail> {
        let mut tx = self.db.begin().await?;
        receive_shipment(&mut *tx, id, user_id).await?;
        let detail = self.detail(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn cancel(&self, id: Uuid, user_id: Uuid) -> AppResult<TransferDetail> {
        let mut tx = self.db.begin().await?;
        cancel_shipment(&mut *tx, id, user_id).await?;
        let detail = self.detail(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<TransferDetail> {
        let mut conn = self.db.acquire().await?;
        self.detail(&mut *conn, id).await
    }

    pub async fn list(
        &self,
        filter: &TransferFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<TransferShipment>> {
        let status = filter
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<TransferStatus>())
            .transpose()
            .map_err(|msg| AppError::validation("status", msg))?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM transfer_shipments s");
        push_filters(&mut count, filter, status);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new("SELECT s.* FROM transfer_shipments s");
        push_filters(&mut select, filter, status);
        select
            .push(" ORDER BY s.created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let data = select
            .build_query_as::<ShipmentRow>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(TransferShipment::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, u64::try_from(total).unwrap_or(0)),
        })
    }

    async fn detail(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<TransferDetail> {
        Ok(TransferDetail {
            shipment: fetch_shipment(&mut *conn, id, false).await?,
            boxes: fetch_boxes(&mut *conn, id).await?,
            items: fetch_items(&mut *conn, id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_input(number: &str, warehouse_box_id: Option<Uuid>, packed_quantity: i32) -> TransferBoxInput {
        TransferBoxInput {
            box_number: number.to_string(),
            warehouse_box_id,
            packed_quantity,
        }
    }

    fn item_input(box_number: Option<&str>) -> TransferItemInput {
        TransferItemInput {
            line: TransferLineRequest {
                item_id: Uuid::new_v4(),
                barcode_id: Uuid::new_v4(),
                quantity: 1,
                destination_store_id: None,
            },
            box_number: box_number.map(str::to_string),
        }
    }

    #[test]
    fn test_create_input_accepts_flat_items() {
        let input: CreateTransferInput = serde_json::from_value(serde_json::json!({
            "source_store_id": Uuid::nil(),
            "destination_store_id": Uuid::nil(),
            "dispatch": "immediate",
            "items": [{
                "item_id": Uuid::nil(),
                "barcode_id": Uuid::nil(),
                "quantity": 3,
                "destination_store_id": null,
                "box_number": "B1"
            }]
        }))
        .unwrap();
        assert_eq!(input.dispatch, DispatchMode::Immediate);
        assert_eq!(input.items[0].line.quantity, 3);
        assert_eq!(input.items[0].box_number.as_deref(), Some("B1"));
        assert!(input.boxes.is_empty());
    }

    #[test]
    fn test_box_requests_sum_per_warehouse_box() {
        let shared_box = Uuid::new_v4();
        let boxes = vec![
            box_input("B1", Some(shared_box), 2),
            box_input("B2", Some(shared_box), 3),
            box_input("B3", None, 7),
        ];
        let requested = box_requests(&boxes);
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[&(shared_box, Uuid::nil())], 5);
    }

    #[test]
    fn test_validate_boxes_rejects_warehouse_box_from_store() {
        let boxes = vec![box_input("B1", Some(Uuid::new_v4()), 1)];
        assert!(validate_boxes(&boxes, &[], false).is_err());
        assert!(validate_boxes(&boxes, &[], true).is_ok());
    }

    #[test]
    fn test_validate_boxes_rejects_unknown_box_reference() {
        let boxes = vec![box_input("B1", None, 0)];
        assert!(validate_boxes(&boxes, &[item_input(Some("B1"))], false).is_ok());
        match validate_boxes(&boxes, &[item_input(Some("B9"))], false) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "items[0].box_number"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validate_boxes_rejects_duplicates() {
        let boxes = vec![box_input("B1", None, 0), box_input(" B1 ", None, 0)];
        assert!(validate_boxes(&boxes, &[], false).is_err());
    }

    #[test]
    fn test_packed_lines_use_packed_quantity() {
        let item = TransferItem {
            id: Uuid::new_v4(),
            shipment_id: Uuid::new_v4(),
            box_id: None,
            item_id: Uuid::new_v4(),
            barcode_id: Uuid::new_v4(),
            destination_store_id: Uuid::new_v4(),
            requested_quantity: 10,
            packed_quantity: 8,
            received_quantity: 0,
            unit_cost: Decimal::ONE,
            selling_price: Decimal::from(2),
        };
        let lines = packed_lines(std::slice::from_ref(&item));
        assert_eq!(lines[0].quantity, 8);
        assert_eq!(pricing_of(&item).selling_price, Decimal::from(2));
    }

    #[test]
    fn test_destination_filter_checks_items() {
        let filter = TransferFilter {
            destination_store_id: Some(Uuid::nil()),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM transfer_shipments s");
        push_filters(&mut builder, &filter, Some(TransferStatus::InTransit));
        let sql = builder.sql();
        assert!(sql.contains("s.status = $1"));
        assert!(sql.contains("s.destination_store_id = $2"));
        assert!(sql.contains("ti.destination_store_id = $3"));
    }
}
