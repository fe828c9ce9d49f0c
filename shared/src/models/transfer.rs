//! Stock transfers between the warehouse and stores

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::container::TransitionError;
use super::stock::StockDirection;

/// Lifecycle of a transfer shipment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Received,
    Cancelled,
}

/// Stock consequence of cancelling a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelEffect {
    /// Nothing has left the source yet
    NoStockChange,
    /// Packed quantities go back onto the source
    RestoreSource,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Received => "received",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, target: TransferStatus) -> bool {
        matches!(
            (self, target),
            (TransferStatus::Pending, TransferStatus::InTransit)
                | (TransferStatus::InTransit, TransferStatus::Received)
                | (TransferStatus::Pending, TransferStatus::Cancelled)
                | (TransferStatus::InTransit, TransferStatus::Cancelled)
        )
    }

    pub fn transition(self, target: TransferStatus) -> Result<TransferStatus, TransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    pub fn cancel_effect(&self) -> Result<CancelEffect, TransitionError> {
        self.transition(TransferStatus::Cancelled)?;
        Ok(match self {
            TransferStatus::InTransit => CancelEffect::RestoreSource,
            _ => CancelEffect::NoStockChange,
        })
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "in_transit" => Ok(TransferStatus::InTransit),
            "received" => Ok(TransferStatus::Received),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(format!("unknown transfer status '{}'", other)),
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a new transfer is driven in the creating request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Created as `pending`; shipped and received by later requests
    #[default]
    Staged,
    /// Shipped and received in the creating transaction
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferShipment {
    pub id: Uuid,
    pub shipment_number: String,
    pub source_store_id: Uuid,
    pub destination_store_id: Option<Uuid>,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub total_items: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferBox {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub box_number: String,
    pub warehouse_box_id: Option<Uuid>,
    pub packed_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub box_id: Option<Uuid>,
    pub item_id: Uuid,
    pub barcode_id: Uuid,
    pub destination_store_id: Uuid,
    pub requested_quantity: i32,
    pub packed_quantity: i32,
    pub received_quantity: i32,
    pub unit_cost: Decimal,
    pub selling_price: Decimal,
}

/// Human readable shipment number, e.g. `TRF-20240115-3FA85F`
pub fn generate_shipment_number(date: NaiveDate, id: Uuid) -> String {
    let suffix: String = id.simple().to_string().chars().take(6).collect();
    format!("TRF-{}-{}", date.format("%Y%m%d"), suffix.to_uppercase())
}

/// Requested line before destinations are resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferLineRequest {
    pub item_id: Uuid,
    pub barcode_id: Uuid,
    pub quantity: i32,
    pub destination_store_id: Option<Uuid>,
}

/// A validated line with its resolved destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLine {
    pub item_id: Uuid,
    pub barcode_id: Uuid,
    pub destination_store_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferLineError {
    #[error("At least one item is required")]
    Empty,

    #[error("Item #{0}: quantity must be positive")]
    NonPositiveQuantity(usize),

    #[error("Item #{0}: no destination store given")]
    MissingDestination(usize),

    #[error("Item #{0}: destination must differ from the source store")]
    SameAsSource(usize),

    #[error("Shipment total exceeds {} units", i32::MAX)]
    TooManyUnits,

    #[error("Warehouse boxes pack {packed} units but the items request {requested}")]
    UncoveredByBoxes { packed: i64, requested: i64 },
}

/// Resolve per-item destinations against the shipment default and check
/// quantities. Item numbers in errors are 1-based.
pub fn resolve_lines(
    source_store_id: Uuid,
    default_destination: Option<Uuid>,
    requests: &[TransferLineRequest],
) -> Result<Vec<TransferLine>, TransferLineError> {
    if requests.is_empty() {
        return Err(TransferLineError::Empty);
    }

    requests
        .iter()
        .enumerate()
        .map(|(index, request)| {
            let number = index + 1;
            if request.quantity <= 0 {
                return Err(TransferLineError::NonPositiveQuantity(number));
            }
            let destination = request
                .destination_store_id
                .or(default_destination)
                .ok_or(TransferLineError::MissingDestination(number))?;
            if destination == source_store_id {
                return Err(TransferLineError::SameAsSource(number));
            }
            Ok(TransferLine {
                item_id: request.item_id,
                barcode_id: request.barcode_id,
                destination_store_id: destination,
                quantity: request.quantity,
            })
        })
        .collect()
}

/// Units in the whole shipment, as stored in `total_items`
pub fn shipment_total(lines: &[TransferLine]) -> Result<i32, TransferLineError> {
    let total: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
    i32::try_from(total).map_err(|_| TransferLineError::TooManyUnits)
}

/// A warehouse shipment leaves as boxes, so the units drawn from
/// warehouse boxes must cover every unit sent.
pub fn check_box_coverage(lines: &[TransferLine], packed: i64) -> Result<(), TransferLineError> {
    let requested: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
    if packed < requested {
        return Err(TransferLineError::UncoveredByBoxes { packed, requested });
    }
    Ok(())
}

/// `(item_id, barcode_id)`
pub type StockKey = (Uuid, Uuid);

/// Requested quantity that the source cannot cover
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("item {item_id} (barcode {barcode_id}): requested {requested}, available {available}")]
pub struct StockShortfall {
    pub item_id: Uuid,
    pub barcode_id: Uuid,
    pub requested: i64,
    pub available: i64,
}

impl StockShortfall {
    pub fn missing(&self) -> i64 {
        self.requested - self.available
    }
}

/// Total requested quantity per stock key. Several lines may draw on the
/// same source row (e.g. one item sent to two stores).
pub fn aggregate_requests(lines: &[TransferLine]) -> BTreeMap<StockKey, i64> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry((line.item_id, line.barcode_id)).or_insert(0) += i64::from(line.quantity);
    }
    totals
}

/// Compare aggregated demand with locked source stock. Every shortfall is
/// reported, not just the first.
pub fn check_availability(
    requested: &BTreeMap<StockKey, i64>,
    available: &HashMap<StockKey, i32>,
) -> Result<(), Vec<StockShortfall>> {
    let shortfalls: Vec<StockShortfall> = requested
        .iter()
        .filter_map(|(&(item_id, barcode_id), &quantity)| {
            let on_hand = available
                .get(&(item_id, barcode_id))
                .copied()
                .map(i64::from)
                .unwrap_or(0);
            (on_hand < quantity).then_some(StockShortfall {
                item_id,
                barcode_id,
                requested: quantity,
                available: on_hand,
            })
        })
        .collect();

    if shortfalls.is_empty() {
        Ok(())
    } else {
        Err(shortfalls)
    }
}

/// One row-level stock change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub store_id: Uuid,
    pub item_id: Uuid,
    pub barcode_id: Uuid,
    pub direction: StockDirection,
    pub quantity: i32,
}

/// Deductions from the source when a shipment leaves. The warehouse is
/// tracked through boxes, so a warehouse source yields no per-unit moves.
pub fn ship_movements(
    source_store_id: Uuid,
    source_is_warehouse: bool,
    lines: &[TransferLine],
) -> Vec<StockMovement> {
    if source_is_warehouse {
        return Vec::new();
    }
    lines
        .iter()
        .map(|line| StockMovement {
            store_id: source_store_id,
            item_id: line.item_id,
            barcode_id: line.barcode_id,
            direction: StockDirection::Out,
            quantity: line.quantity,
        })
        .collect()
}

/// Credits at each line's own destination
pub fn receive_movements(lines: &[TransferLine]) -> Vec<StockMovement> {
    lines
        .iter()
        .map(|line| StockMovement {
            store_id: line.destination_store_id,
            item_id: line.item_id,
            barcode_id: line.barcode_id,
            direction: StockDirection::In,
            quantity: line.quantity,
        })
        .collect()
}

/// Reversal of [`ship_movements`] for a cancelled shipment
pub fn cancel_movements(
    effect: CancelEffect,
    source_store_id: Uuid,
    source_is_warehouse: bool,
    lines: &[TransferLine],
) -> Vec<StockMovement> {
    match effect {
        CancelEffect::NoStockChange => Vec::new(),
        CancelEffect::RestoreSource => ship_movements(source_store_id, source_is_warehouse, lines)
            .into_iter()
            .map(|movement| StockMovement {
                direction: StockDirection::In,
                ..movement
            })
            .collect(),
    }
}
