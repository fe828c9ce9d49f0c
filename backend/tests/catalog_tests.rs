//! Catalog, barcode and line-item validation tests

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    ean13_check_digit, generate_barcode, is_valid_ean13, validate_line_item, BarcodeAssignment,
    BoxSpec, LineItemKind, NewBoxSpec, NewItemSpec, BARCODE_LENGTH,
};
use std::cell::Cell;
use uuid::Uuid;

fn item_spec(code: &str, price: Decimal) -> NewItemSpec {
    NewItemSpec {
        name: "Linen shirt".to_string(),
        item_code: code.to_string(),
        description: None,
        category_id: None,
        brand: Some("Harbor".to_string()),
        size: Some("M".to_string()),
        color: None,
        material: Some("linen".to_string()),
        unit_cost: Decimal::new(1200, 2),
        selling_price: price,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_same_price_reuses_code_without_minting() {
        let minted = Cell::new(0);
        let assignment = BarcodeAssignment::choose::<()>(Some("2000000000015".to_string()), || {
            minted.set(minted.get() + 1);
            Ok("2999999999994".to_string())
        })
        .unwrap();
        assert!(assignment.is_shared());
        assert_eq!(assignment.code(), "2000000000015");
        assert_eq!(minted.get(), 0);
    }

    #[test]
    fn test_new_price_mints_fresh_code() {
        let assignment =
            BarcodeAssignment::choose::<&str>(None, || Ok(generate_barcode("2", 42).unwrap())).unwrap();
        assert!(!assignment.is_shared());
        assert!(is_valid_ean13(assignment.code()));
    }

    #[test]
    fn test_mint_failure_propagates() {
        let result = BarcodeAssignment::choose(None, || Err("bad prefix"));
        assert_eq!(result, Err("bad prefix"));
    }

    #[test]
    fn test_line_item_validation() {
        assert!(validate_line_item(&LineItemKind::ExistingItem { item_id: Uuid::new_v4() }, 1).is_ok());

        let err = validate_line_item(&LineItemKind::ExistingItem { item_id: Uuid::new_v4() }, 0).unwrap_err();
        assert_eq!(err.field, "quantity");

        let err = validate_line_item(&LineItemKind::NewItem(item_spec("", Decimal::ONE)), 3).unwrap_err();
        assert_eq!(err.field, "item_code");

        let err = validate_line_item(&LineItemKind::NewItem(item_spec("SH-1", Decimal::new(-1, 0))), 3)
            .unwrap_err();
        assert_eq!(err.field, "selling_price");

        let blank_box = LineItemKind::Box(BoxSpec::New(NewBoxSpec {
            box_number: " ".to_string(),
            box_name: "Carton".to_string(),
            box_type: None,
            unit_cost: Decimal::ZERO,
        }));
        assert_eq!(validate_line_item(&blank_box, 1).unwrap_err().field, "box_number");
    }

    #[test]
    fn test_sub_cent_prices_rejected() {
        let err = validate_line_item(&LineItemKind::NewItem(item_spec("SH-1", Decimal::new(10005, 3))), 1)
            .unwrap_err();
        assert_eq!(err.field, "selling_price");
        assert!(validate_line_item(&LineItemKind::NewItem(item_spec("SH-1", Decimal::new(10050, 3))), 1).is_ok());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        /// Every minted code is a valid EAN-13 carrying the prefix
        #[test]
        fn prop_minted_codes_are_valid(prefix in "2[0-9]{0,4}", seed in any::<u128>()) {
            let code = generate_barcode(&prefix, seed).unwrap();
            prop_assert_eq!(code.len(), BARCODE_LENGTH);
            prop_assert!(code.starts_with(&prefix));
            prop_assert!(is_valid_ean13(&code));
        }

        /// Changing any single digit breaks the check digit
        #[test]
        fn prop_single_digit_errors_detected(seed in any::<u128>(), position in 0usize..13, delta in 1u32..10) {
            let code = generate_barcode("2", seed).unwrap();
            let mut digits: Vec<u32> = code.chars().map(|c| c.to_digit(10).unwrap()).collect();
            digits[position] = (digits[position] + delta) % 10;
            let corrupted: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
            prop_assert!(!is_valid_ean13(&corrupted));
        }

        #[test]
        fn prop_check_digit_needs_twelve_digits(body in "[0-9]{0,11}|[0-9]{13,16}") {
            prop_assert!(ean13_check_digit(&body).is_none());
        }

        /// Positive quantities with a known catalog item always validate
        #[test]
        fn prop_existing_item_quantity(quantity in any::<i32>()) {
            let result = validate_line_item(&LineItemKind::ExistingItem { item_id: Uuid::nil() }, quantity);
            prop_assert_eq!(result.is_ok(), quantity > 0);
        }
    }
}
