//! Turns container line items into catalog, barcode and warehouse stock rows

use rust_decimal::Decimal;
use shared::{
    generate_barcode, BarcodeAssignment, BoxSpec, ContainerLineItem, ItemOutcome, LineItemKind,
    NewBoxSpec, NewItemSpec, ReferenceType, StockDirection, StockMovement,
};
use sqlx::PgConnection;
use uuid::Uuid;

use super::stock::{self, LedgerReference, StockPricing};
use crate::error::{AppError, AppResult};

const MAX_MINT_ATTEMPTS: usize = 5;

/// Where and by whom a container is being processed
#[derive(Debug, Clone, Copy)]
pub struct MaterializeContext<'a> {
    pub container_id: Uuid,
    pub warehouse_id: Uuid,
    pub user_id: Uuid,
    pub barcode_prefix: &'a str,
}

impl MaterializeContext<'_> {
    fn ledger_reference(&self) -> LedgerReference<'static> {
        LedgerReference {
            reference_type: ReferenceType::Container,
            reference_id: Some(self.container_id),
            user_id: self.user_id,
            notes: Some("Received from container"),
        }
    }
}

/// Materialize one line item.
///
/// The row is claimed first with a conditional update, so a line item that
/// was already processed is reported as skipped and touches no stock.
pub async fn materialize(
    conn: &mut PgConnection,
    item: &ContainerLineItem,
    ctx: &MaterializeContext<'_>,
) -> AppResult<ItemOutcome> {
    if !claim(&mut *conn, item.id, ctx.user_id).await? {
        tracing::debug!(line_item_id = %item.id, "Line item already processed, skipping");
        return Ok(ItemOutcome::Skipped);
    }

    let selling_value = match &item.kind {
        LineItemKind::ExistingItem { item_id } => {
            existing_item(&mut *conn, *item_id, item.quantity, ctx).await?
        }
        LineItemKind::NewItem(spec) => {
            let (item_id, value) = new_item(&mut *conn, spec, item.quantity, ctx).await?;
            link(&mut *conn, item.id, item_id).await?;
            value
        }
        LineItemKind::Box(BoxSpec::Existing { box_id }) => {
            stock::credit_box(&mut *conn, *box_id, item.quantity, Some(ctx.container_id)).await?;
            link(&mut *conn, item.id, *box_id).await?;
            Decimal::ZERO
        }
        LineItemKind::Box(BoxSpec::New(spec)) => {
            let box_id = new_box(&mut *conn, spec, item.quantity, ctx.container_id).await?;
            link(&mut *conn, item.id, box_id).await?;
            Decimal::ZERO
        }
    };

    tracing::debug!(
        line_item_id = %item.id,
        item_type = item.kind.type_tag(),
        quantity = item.quantity,
        %selling_value,
        "Line item materialized"
    );

    Ok(ItemOutcome::Committed { selling_value })
}

async fn claim(conn: &mut PgConnection, line_item_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE container_items
        SET is_processed = TRUE, processed_at = NOW(), processed_by = $2
        WHERE id = $1 AND is_processed = FALSE
        "#,
    )
    .bind(line_item_id)
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn link(conn: &mut PgConnection, line_item_id: Uuid, materialized_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE container_items SET materialized_id = $2 WHERE id = $1")
        .bind(line_item_id)
        .bind(materialized_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn existing_item(
    conn: &mut PgConnection,
    item_id: Uuid,
    quantity: i32,
    ctx: &MaterializeContext<'_>,
) -> AppResult<Decimal> {
    let (base_price, selling_price) = sqlx::query_as::<_, (Decimal, Decimal)>(
        "SELECT base_price, selling_price FROM inventory_items WHERE id = $1",
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Catalog item {}", item_id)))?;

    let existing_barcode = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM barcodes WHERE item_id = $1 ORDER BY created_at ASC LIMIT 1",
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    let barcode_id = match existing_barcode {
        Some(id) => id,
        None => assign_barcode(&mut *conn, item_id, selling_price, ctx.barcode_prefix).await?,
    };

    let movement = StockMovement {
        store_id: ctx.warehouse_id,
        item_id,
        barcode_id,
        direction: StockDirection::In,
        quantity,
    };
    let pricing = StockPricing {
        selling_price,
        cost_price: base_price,
    };
    stock::apply_movement(&mut *conn, &movement, pricing, &ctx.ledger_reference()).await?;

    sqlx::query(
        "UPDATE inventory_items SET container_id = $2, updated_at = NOW() WHERE id = $1 AND container_id IS NULL",
    )
    .bind(item_id)
    .bind(ctx.container_id)
    .execute(&mut *conn)
    .await?;

    Ok(selling_price * Decimal::from(quantity))
}

async fn new_item(
    conn: &mut PgConnection,
    spec: &NewItemSpec,
    quantity: i32,
    ctx: &MaterializeContext<'_>,
) -> AppResult<(Uuid, Decimal)> {
    let item_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO inventory_items (
            item_code, name, description, category_id, base_price, selling_price,
            brand, size, color, material, status, container_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', $11)
        RETURNING id
        "#,
    )
    .bind(spec.item_code.trim())
    .bind(spec.name.trim())
    .bind(&spec.description)
    .bind(spec.category_id)
    .bind(spec.unit_cost)
    .bind(spec.selling_price)
    .bind(&spec.brand)
    .bind(&spec.size)
    .bind(&spec.color)
    .bind(&spec.material)
    .bind(ctx.container_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::unique_violation(e, "item_code"))?;

    let barcode_id = assign_barcode(&mut *conn, item_id, spec.selling_price, ctx.barcode_prefix).await?;

    let movement = StockMovement {
        store_id: ctx.warehouse_id,
        item_id,
        barcode_id,
        direction: StockDirection::In,
        quantity,
    };
    let pricing = StockPricing {
        selling_price: spec.selling_price,
        cost_price: spec.unit_cost,
    };
    stock::apply_movement(&mut *conn, &movement, pricing, &ctx.ledger_reference()).await?;

    Ok((item_id, spec.selling_price * Decimal::from(quantity)))
}

async fn new_box(
    conn: &mut PgConnection,
    spec: &NewBoxSpec,
    quantity: i32,
    container_id: Uuid,
) -> AppResult<Uuid> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO warehouse_boxes (box_number, box_name, box_type, quantity, unit_cost, container_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(spec.box_number.trim())
    .bind(spec.box_name.trim())
    .bind(&spec.box_type)
    .bind(quantity)
    .bind(spec.unit_cost)
    .bind(container_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::unique_violation(e, "box_number"))
}

/// Give `item_id` a barcode at `price`, taking over the code of any
/// identically priced barcode and marking every row with it as shared.
pub async fn assign_barcode(
    conn: &mut PgConnection,
    item_id: Uuid,
    price: Decimal,
    prefix: &str,
) -> AppResult<Uuid> {
    let same_price = sqlx::query_scalar::<_, String>(
        "SELECT barcode FROM barcodes WHERE price = $1 ORDER BY created_at ASC LIMIT 1",
    )
    .bind(price)
    .fetch_optional(&mut *conn)
    .await?;

    let mut assignment = None;
    for _ in 0..MAX_MINT_ATTEMPTS {
        let candidate = BarcodeAssignment::choose(same_price.clone(), || mint(prefix))?;
        if candidate.is_shared() || !barcode_exists(&mut *conn, candidate.code()).await? {
            assignment = Some(candidate);
            break;
        }
        tracing::debug!(code = candidate.code(), "Minted barcode collides, retrying");
    }
    let assignment = assignment
        .ok_or_else(|| AppError::Internal("Could not mint a unique barcode".to_string()))?;

    if assignment.is_shared() {
        sqlx::query("UPDATE barcodes SET is_shared = TRUE WHERE barcode = $1")
            .bind(assignment.code())
            .execute(&mut *conn)
            .await?;
    }

    let barcode_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO barcodes (barcode, item_id, price, is_shared)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(assignment.code())
    .bind(item_id)
    .bind(price)
    .bind(assignment.is_shared())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(%item_id, code = assignment.code(), shared = assignment.is_shared(), "Barcode assigned");
    Ok(barcode_id)
}

fn mint(prefix: &str) -> AppResult<String> {
    generate_barcode(prefix, Uuid::new_v4().as_u128())
        .ok_or_else(|| AppError::Internal(format!("Invalid barcode prefix '{}'", prefix)))
}

async fn barcode_exists(conn: &mut PgConnection, code: &str) -> AppResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM barcodes WHERE barcode = $1)")
        .bind(code)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}
