//! Supplier containers and the line items waiting to be taken into stock

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a container
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Pending,
    Received,
    Processed,
}

/// A state change the lifecycle does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Pending => "pending",
            ContainerStatus::Received => "received",
            ContainerStatus::Processed => "processed",
        }
    }

    /// Only single forward steps are allowed
    pub fn can_transition_to(&self, target: ContainerStatus) -> bool {
        matches!(
            (self, target),
            (ContainerStatus::Pending, ContainerStatus::Received)
                | (ContainerStatus::Received, ContainerStatus::Processed)
        )
    }

    pub fn transition(self, target: ContainerStatus) -> Result<ContainerStatus, TransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    /// Line items and boxes may only change before processing
    pub fn allows_structural_edits(&self) -> bool {
        !matches!(self, ContainerStatus::Processed)
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContainerStatus::Pending),
            "received" => Ok(ContainerStatus::Received),
            "processed" => Ok(ContainerStatus::Processed),
            other => Err(format!("unknown container status '{}'", other)),
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A supplier shipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: Uuid,
    pub container_number: String,
    pub supplier_id: Option<Uuid>,
    pub supplier_name: Option<String>,
    pub total_weight_kg: Decimal,
    pub base_cost: Decimal,
    pub price_per_kg: Decimal,
    pub shipment_cost: Decimal,
    pub total_cost: Decimal,
    pub amount_paid: Decimal,
    pub remaining_balance: Decimal,
    pub profit_margin_percentage: Decimal,
    pub arrival_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: ContainerStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
}

/// Descriptive and pricing fields of an item that does not exist in the catalog yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewItemSpec {
    pub name: String,
    pub item_code: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
    pub unit_cost: Decimal,
    pub selling_price: Decimal,
}

/// Fields for a warehouse box created from a container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBoxSpec {
    pub box_number: String,
    pub box_name: String,
    pub box_type: Option<String>,
    #[serde(default)]
    pub unit_cost: Decimal,
}

/// Box line items either top up an existing warehouse box or create one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "box_source", rename_all = "snake_case")]
pub enum BoxSpec {
    Existing { box_id: Uuid },
    New(NewBoxSpec),
}

/// What a line item turns into when the container is processed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum LineItemKind {
    ExistingItem { item_id: Uuid },
    NewItem(NewItemSpec),
    Box(BoxSpec),
}

impl LineItemKind {
    /// Value stored in the `item_type` column
    pub fn type_tag(&self) -> &'static str {
        match self {
            LineItemKind::ExistingItem { .. } => "existing_item",
            LineItemKind::NewItem(_) => "new_item",
            LineItemKind::Box(_) => "box",
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self, LineItemKind::Box(_))
    }
}

/// One entry of a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerLineItem {
    pub id: Uuid,
    pub container_id: Uuid,
    #[serde(flatten)]
    pub kind: LineItemKind,
    pub quantity: i32,
    pub is_processed: bool,
    /// Catalog item or warehouse box created from this line
    pub materialized_id: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Why a container cannot be processed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingPlanError {
    #[error("Container cannot be processed: {0}")]
    InvalidTransition(TransitionError),

    #[error("No items or boxes found in container to process")]
    NothingToProcess,
}

/// Select the line items a processing run has to materialize.
///
/// The container must be `received`; already processed rows are skipped.
pub fn plan_processing(
    status: ContainerStatus,
    items: &[ContainerLineItem],
) -> Result<Vec<&ContainerLineItem>, ProcessingPlanError> {
    status
        .transition(ContainerStatus::Processed)
        .map_err(ProcessingPlanError::InvalidTransition)?;

    let pending: Vec<&ContainerLineItem> = items.iter().filter(|i| !i.is_processed).collect();
    if pending.is_empty() {
        return Err(ProcessingPlanError::NothingToProcess);
    }
    Ok(pending)
}

/// Result of one materialization attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Committed { selling_value: Decimal },
    /// The row was already processed by an earlier run
    Skipped,
}

/// Collects per-item results of a processing run.
///
/// A run commits only when no item failed.
#[derive(Debug, Default)]
pub struct ProcessingTally {
    items_processed: u32,
    boxes_processed: u32,
    skipped: u32,
    selling_value: Decimal,
    errors: Vec<String>,
}

/// Counts reported back after a successful processing run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSummary {
    pub items_processed: u32,
    pub boxes_processed: u32,
    pub skipped: u32,
    pub selling_value: Decimal,
}

impl ProcessingTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, item: &ContainerLineItem, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Committed { selling_value } => {
                if item.kind.is_box() {
                    self.boxes_processed += 1;
                } else {
                    self.items_processed += 1;
                }
                self.selling_value += selling_value;
            }
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self, item: &ContainerLineItem, message: impl std::fmt::Display) {
        self.errors
            .push(format!("{} {}: {}", item.kind.type_tag(), item.id, message));
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All-or-nothing: any failure discards every success
    pub fn finish(self) -> Result<ProcessingSummary, Vec<String>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(ProcessingSummary {
            items_processed: self.items_processed,
            boxes_processed: self.boxes_processed,
            skipped: self.skipped,
            selling_value: self.selling_value,
        })
    }
}
