//! Validation utilities for container intake and transfers

use rust_decimal::Decimal;

use crate::financial::CostInputs;
use crate::models::{BoxSpec, LineItemKind, NewBoxSpec, NewItemSpec};

/// A failed check tied to the input field it concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn on(field: &'static str, result: Result<(), &'static str>) -> Result<(), FieldError> {
    result.map_err(|message| FieldError::new(field, message))
}

// ============================================================================
// Identifiers
// ============================================================================

/// Container numbers: 1-50 characters of letters, digits, `-`, `_`, `/` or `.`
pub fn validate_container_number(number: &str) -> Result<(), &'static str> {
    let number = number.trim();
    if number.is_empty() {
        return Err("Container number is required");
    }
    if number.len() > 50 {
        return Err("Container number must be at most 50 characters");
    }
    if !number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
    {
        return Err("Container number contains invalid characters");
    }
    Ok(())
}

/// Item codes are unique catalog keys without whitespace
pub fn validate_item_code(code: &str) -> Result<(), &'static str> {
    if code.trim().is_empty() {
        return Err("Item code is required");
    }
    if code.len() > 50 {
        return Err("Item code must be at most 50 characters");
    }
    if code.chars().any(char::is_whitespace) {
        return Err("Item code cannot contain whitespace");
    }
    Ok(())
}

pub fn validate_box_number(number: &str) -> Result<(), &'static str> {
    if number.trim().is_empty() {
        return Err("Box number is required");
    }
    if number.len() > 50 {
        return Err("Box number must be at most 50 characters");
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name is required");
    }
    if name.len() > 255 {
        return Err("Name must be at most 255 characters");
    }
    Ok(())
}

// ============================================================================
// Quantities and money
// ============================================================================

pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Largest amount a `NUMERIC(14, 2)` column holds
pub fn max_money() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Largest weight a `NUMERIC(14, 3)` column holds
pub fn max_weight() -> Decimal {
    Decimal::new(99_999_999_999_999, 3)
}

pub fn validate_money(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    if amount > max_money() {
        return Err("Amount is too large");
    }
    if amount.scale() > 2 && amount != amount.round_dp(2) {
        return Err("Amount cannot have more than two decimal places");
    }
    Ok(())
}

pub fn validate_weight(weight: Decimal) -> Result<(), &'static str> {
    if weight < Decimal::ZERO {
        return Err("Weight cannot be negative");
    }
    if weight > max_weight() {
        return Err("Weight is too large");
    }
    if weight.scale() > 3 && weight != weight.round_dp(3) {
        return Err("Weight cannot have more than three decimal places");
    }
    Ok(())
}

/// Margins above 1000% are almost certainly a typo
pub fn validate_profit_margin(margin: Decimal) -> Result<(), &'static str> {
    if margin < Decimal::ZERO || margin > Decimal::from(1000) {
        return Err("Profit margin must be between 0 and 1000%");
    }
    Ok(())
}

// ============================================================================
// Composite inputs
// ============================================================================

pub fn validate_cost_inputs(inputs: &CostInputs) -> Result<(), FieldError> {
    on("total_weight_kg", validate_weight(inputs.total_weight_kg))?;
    on("base_cost", validate_money(inputs.base_cost))?;
    on("shipment_cost", validate_money(inputs.shipment_cost))?;
    on("amount_paid", validate_money(inputs.amount_paid))?;
    on("profit_margin_percentage", validate_profit_margin(inputs.profit_margin_percentage))?;

    // Each input fits its column; the derived totals must as well
    let figures = inputs.derive();
    if figures.total_cost > max_money() || figures.expected_revenue > max_money() {
        return Err(FieldError::new("base_cost", "Total costs are too large"));
    }
    Ok(())
}

pub fn validate_new_item(spec: &NewItemSpec) -> Result<(), FieldError> {
    on("name", validate_name(&spec.name))?;
    on("item_code", validate_item_code(&spec.item_code))?;
    on("unit_cost", validate_money(spec.unit_cost))?;
    on("selling_price", validate_money(spec.selling_price))
}

pub fn validate_new_box(spec: &NewBoxSpec) -> Result<(), FieldError> {
    on("box_number", validate_box_number(&spec.box_number))?;
    on("box_name", validate_name(&spec.box_name))?;
    on("unit_cost", validate_money(spec.unit_cost))
}

/// Check a line item before it is stored on a container
pub fn validate_line_item(kind: &LineItemKind, quantity: i32) -> Result<(), FieldError> {
    on("quantity", validate_quantity(quantity))?;
    match kind {
        LineItemKind::ExistingItem { .. } => Ok(()),
        LineItemKind::NewItem(spec) => validate_new_item(spec),
        LineItemKind::Box(BoxSpec::Existing { .. }) => Ok(()),
        LineItemKind::Box(BoxSpec::New(spec)) => validate_new_box(spec),
    }
}

pub fn validate_date_range(
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
) -> Result<(), &'static str> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err("Start date must not be after end date"),
        _ => Ok(()),
    }
}
