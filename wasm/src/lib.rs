//! WebAssembly module for the POS inventory UI
//!
//! Runs the same calculator and validators as the backend so the container
//! form can show live figures before anything is saved. Money crosses the
//! boundary as decimal strings to keep cents exact.

use rust_decimal::Decimal;
use shared::financial::{self, CostInputs};
use std::str::FromStr;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(message: String) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&message));
    js_sys::Error::new(&message).into()
}

/// Parse a form field and apply its range check so the arithmetic below
/// cannot overflow
fn parse_field(
    field: &str,
    value: &str,
    check: fn(Decimal) -> Result<(), &'static str>,
) -> Result<Decimal, JsValue> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let amount = Decimal::from_str(trimmed).map_err(|e| js_error(format!("Invalid {}: {}", field, e)))?;
    check(amount).map_err(|msg| js_error(format!("{}: {}", field, msg)))?;
    Ok(amount)
}

fn parse_amount(field: &str, value: &str) -> Result<Decimal, JsValue> {
    parse_field(field, value, validate_money)
}

/// Derive every container figure from the form's cost inputs.
///
/// Takes and returns JSON; decimal fields are strings.
#[wasm_bindgen]
pub fn calculate_container_financials(inputs_json: &str) -> Result<String, JsValue> {
    let inputs: CostInputs = serde_json::from_str(inputs_json)
        .map_err(|e| js_error(format!("Invalid cost inputs JSON: {}", e)))?;
    validate_cost_inputs(&inputs).map_err(|e| js_error(e.to_string()))?;

    serde_json::to_string(&inputs.derive())
        .map_err(|e| js_error(format!("Could not serialize figures: {}", e)))
}

/// `base_cost / total_weight_kg`, `"0"` for an empty weight
#[wasm_bindgen]
pub fn calculate_price_per_kg(base_cost: &str, total_weight_kg: &str) -> Result<String, JsValue> {
    let price = financial::price_per_unit(
        parse_amount("base_cost", base_cost)?,
        parse_field("total_weight_kg", total_weight_kg, validate_weight)?,
    );
    Ok(financial::round_rate(price).normalize().to_string())
}

#[wasm_bindgen]
pub fn calculate_remaining_balance(
    base_cost: &str,
    shipment_cost: &str,
    amount_paid: &str,
) -> Result<String, JsValue> {
    let total = financial::total_cost(
        parse_amount("base_cost", base_cost)?,
        parse_amount("shipment_cost", shipment_cost)?,
    );
    let balance = financial::remaining_balance(total, parse_amount("amount_paid", amount_paid)?);
    Ok(financial::round_money(balance).to_string())
}

/// Selling value of one line item row
#[wasm_bindgen]
pub fn calculate_line_total(selling_price: &str, quantity: i32) -> Result<String, JsValue> {
    let price = parse_amount("selling_price", selling_price)?;
    validate_quantity(quantity).map_err(|msg| js_error(format!("quantity: {}", msg)))?;
    Ok(financial::round_money(financial::selling_total([(price, quantity)])).to_string())
}

/// `None` when valid, otherwise the message to show under the field
#[wasm_bindgen]
pub fn container_number_error(number: &str) -> Option<String> {
    validate_container_number(number).err().map(str::to_string)
}

#[wasm_bindgen]
pub fn item_code_error(code: &str) -> Option<String> {
    validate_item_code(code).err().map(str::to_string)
}

/// Check a scanned or typed EAN-13 code
#[wasm_bindgen]
pub fn is_valid_barcode(code: &str) -> bool {
    is_valid_ean13(code.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_financials_json() {
        let json = calculate_container_financials(
            r#"{"total_weight_kg":"100","base_cost":"1000","shipment_cost":"50","amount_paid":"300","profit_margin_percentage":"20"}"#,
        )
        .unwrap();
        let figures: shared::financial::ContainerFinancials = serde_json::from_str(&json).unwrap();
        assert_eq!(figures.total_cost, Decimal::from(1050));
        assert_eq!(figures.expected_revenue, Decimal::from(1260));
        assert_eq!(figures.remaining_balance, Decimal::from(750));
        assert_eq!(figures.cost_per_kg, Decimal::new(1050, 2));
    }

    #[test]
    fn test_price_per_kg() {
        assert_eq!(calculate_price_per_kg("1000", "100").unwrap(), "10");
        assert_eq!(calculate_price_per_kg("1000", "").unwrap(), "0");
        assert_eq!(calculate_price_per_kg("100", "3").unwrap(), "33.3333");
    }

    #[test]
    fn test_remaining_balance() {
        assert_eq!(calculate_remaining_balance("1000", "50", "1050").unwrap(), "0");
        assert_eq!(calculate_remaining_balance("1000.00", "50.00", "").unwrap(), "1050.00");
    }

    #[test]
    fn test_line_total() {
        assert_eq!(calculate_line_total("12.50", 4).unwrap(), "50.00");
    }

    #[test]
    fn test_field_errors() {
        assert_eq!(container_number_error("CONT-2024-001"), None);
        assert_eq!(container_number_error(""), Some("Container number is required".to_string()));
        assert!(item_code_error("has space").is_some());
    }

    #[test]
    fn test_barcode_check() {
        assert!(is_valid_barcode(" 4006381333931 "));
        assert!(!is_valid_barcode("4006381333932"));
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_invalid_json_is_js_error() {
        let err = calculate_container_financials("{").unwrap_err();
        assert!(err.is_instance_of::<js_sys::Error>());
    }

    #[wasm_bindgen_test]
    fn test_out_of_range_amounts_are_errors() {
        let huge = "79228162514264337593543950335";
        assert!(calculate_line_total(huge, 2).is_err());
        assert!(calculate_remaining_balance(huge, "1", "0").is_err());
        assert!(calculate_price_per_kg("10", "-1").is_err());
        let json = format!(
            r#"{{"total_weight_kg":"1","base_cost":"{}","shipment_cost":"1","amount_paid":"0","profit_margin_percentage":"0"}}"#,
            huge
        );
        assert!(calculate_container_financials(&json).is_err());
    }

    #[wasm_bindgen_test]
    fn test_negative_cost_rejected() {
        assert!(calculate_container_financials(
            r#"{"total_weight_kg":"1","base_cost":"-5","shipment_cost":"0","amount_paid":"0","profit_margin_percentage":"0"}"#
        )
        .is_err());
    }
}
