//! Stock ledger primitive shared by container processing and transfers
//!
//! Every function runs on a connection borrowed from the caller's
//! transaction, so a failure anywhere rolls back the whole unit of work.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::{ReferenceType, StockDirection, StockKey, StockMovement, StockShortfall};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// What a ledger row points back to
#[derive(Debug, Clone, Copy)]
pub struct LedgerReference<'a> {
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub user_id: Uuid,
    pub notes: Option<&'a str>,
}

/// Prices used when a stock row has to be created
#[derive(Debug, Clone, Copy, Default)]
pub struct StockPricing {
    pub selling_price: Decimal,
    pub cost_price: Decimal,
}

/// Id of the central warehouse store
pub async fn warehouse_store_id(conn: &mut PgConnection) -> AppResult<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM stores WHERE is_warehouse = TRUE")
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse store".to_string()))
}

/// Fetch a store and whether it is the warehouse
pub async fn store_is_warehouse(conn: &mut PgConnection, store_id: Uuid) -> AppResult<bool> {
    sqlx::query_scalar::<_, bool>("SELECT is_warehouse FROM stores WHERE id = $1")
        .bind(store_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Store {}", store_id)))
}

/// Lock the source rows for `keys` and return their current quantities.
///
/// Keys without a row are simply absent from the map.
pub async fn lock_stock(
    conn: &mut PgConnection,
    store_id: Uuid,
    keys: &[StockKey],
) -> AppResult<HashMap<StockKey, i32>> {
    let item_ids: Vec<Uuid> = keys.iter().map(|(item, _)| *item).collect();

    let rows = sqlx::query_as::<_, (Uuid, Uuid, i32)>(
        r#"
        SELECT item_id, barcode_id, current_stock
        FROM store_inventory
        WHERE store_id = $1 AND item_id = ANY($2)
        ORDER BY item_id, barcode_id
        FOR UPDATE
        "#,
    )
    .bind(store_id)
    .bind(&item_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|(item, barcode, _)| keys.contains(&(*item, *barcode)))
        .map(|(item, barcode, stock)| ((item, barcode), stock))
        .collect())
}

/// Conditional deduction. Zero affected rows means another request took
/// the stock first.
pub async fn deduct(
    conn: &mut PgConnection,
    store_id: Uuid,
    item_id: Uuid,
    barcode_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE store_inventory
        SET current_stock = current_stock - $4, updated_at = NOW()
        WHERE store_id = $1 AND item_id = $2 AND barcode_id = $3
          AND current_stock >= $4
        "#,
    )
    .bind(store_id)
    .bind(item_id)
    .bind(barcode_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let available = sqlx::query_scalar::<_, i32>(
            "SELECT current_stock FROM store_inventory WHERE store_id = $1 AND item_id = $2 AND barcode_id = $3",
        )
        .bind(store_id)
        .bind(item_id)
        .bind(barcode_id)
        .fetch_optional(&mut *conn)
        .await?
        .unwrap_or(0);

        tracing::warn!(%store_id, %item_id, %barcode_id, quantity, available, "Stock deduction lost");
        return Err(AppError::InsufficientStock(vec![StockShortfall {
            item_id,
            barcode_id,
            requested: i64::from(quantity),
            available: i64::from(available),
        }]));
    }

    Ok(())
}

/// Increment a stock row, creating it from `pricing` when absent
pub async fn credit(
    conn: &mut PgConnection,
    store_id: Uuid,
    item_id: Uuid,
    barcode_id: Uuid,
    quantity: i32,
    pricing: StockPricing,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO store_inventory (store_id, item_id, barcode_id, current_stock, selling_price, cost_price)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (store_id, item_id, barcode_id)
        DO UPDATE SET current_stock = store_inventory.current_stock + EXCLUDED.current_stock,
                      updated_at = NOW()
        "#,
    )
    .bind(store_id)
    .bind(item_id)
    .bind(barcode_id)
    .bind(quantity)
    .bind(pricing.selling_price)
    .bind(pricing.cost_price)
    .execute(conn)
    .await?;

    Ok(())
}

/// Append one ledger row
pub async fn record_transaction(
    conn: &mut PgConnection,
    movement: &StockMovement,
    reference: &LedgerReference<'_>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            store_id, item_id, barcode_id, transaction_type, quantity,
            reference_type, reference_id, user_id, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(movement.store_id)
    .bind(movement.item_id)
    .bind(movement.barcode_id)
    .bind(movement.direction.as_str())
    .bind(movement.quantity)
    .bind(reference.reference_type.as_str())
    .bind(reference.reference_id)
    .bind(reference.user_id)
    .bind(reference.notes)
    .execute(conn)
    .await?;

    Ok(())
}

/// Deduct or credit, then log
pub async fn apply_movement(
    conn: &mut PgConnection,
    movement: &StockMovement,
    pricing: StockPricing,
    reference: &LedgerReference<'_>,
) -> AppResult<()> {
    match movement.direction {
        StockDirection::Out => {
            deduct(
                &mut *conn,
                movement.store_id,
                movement.item_id,
                movement.barcode_id,
                movement.quantity,
            )
            .await?
        }
        StockDirection::In => {
            credit(
                &mut *conn,
                movement.store_id,
                movement.item_id,
                movement.barcode_id,
                movement.quantity,
                pricing,
            )
            .await?
        }
    }
    record_transaction(conn, movement, reference).await
}

/// Make sure the store carries the item. Returns `true` when created.
pub async fn ensure_assignment(conn: &mut PgConnection, store_id: Uuid, item_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO store_item_assignments (store_id, item_id)
        VALUES ($1, $2)
        ON CONFLICT (store_id, item_id) DO NOTHING
        "#,
    )
    .bind(store_id)
    .bind(item_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Lock warehouse boxes and return their quantities
pub async fn lock_boxes(conn: &mut PgConnection, box_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i32>> {
    let rows = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT id, quantity FROM warehouse_boxes WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(box_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Conditional deduction of a warehouse box
pub async fn deduct_box(conn: &mut PgConnection, box_id: Uuid, quantity: i32) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE warehouse_boxes
        SET quantity = quantity - $2, updated_at = NOW()
        WHERE id = $1 AND quantity >= $2
        "#,
    )
    .bind(box_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let available = sqlx::query_scalar::<_, i32>("SELECT quantity FROM warehouse_boxes WHERE id = $1")
            .bind(box_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warehouse box {}", box_id)))?;

        tracing::warn!(%box_id, quantity, available, "Warehouse box deduction lost");
        // Boxes are keyed by their own id; there is no barcode
        return Err(AppError::InsufficientStock(vec![StockShortfall {
            item_id: box_id,
            barcode_id: Uuid::nil(),
            requested: i64::from(quantity),
            available: i64::from(available),
        }]));
    }
    Ok(())
}

/// Add to a warehouse box, optionally stamping the container it came from
pub async fn credit_box(
    conn: &mut PgConnection,
    box_id: Uuid,
    quantity: i32,
    container_id: Option<Uuid>,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE warehouse_boxes
        SET quantity = quantity + $2,
            container_id = COALESCE($3, container_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(box_id)
    .bind(quantity)
    .bind(container_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Warehouse box {}", box_id)));
    }
    Ok(())
}
