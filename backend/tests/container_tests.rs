//! Container intake and processing tests
//!
//! Covers the container state machine, the processing planner and the
//! all-or-nothing tally of a processing run.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    plan_processing, BoxSpec, ContainerLineItem, ContainerStatus, ItemOutcome, LineItemKind,
    NewBoxSpec, NewItemSpec, ProcessingPlanError, ProcessingTally,
};
use uuid::Uuid;

fn line_item(kind: LineItemKind, quantity: i32, is_processed: bool) -> ContainerLineItem {
    ContainerLineItem {
        id: Uuid::new_v4(),
        container_id: Uuid::nil(),
        kind,
        quantity,
        is_processed,
        materialized_id: None,
        processed_at: None,
        processed_by: None,
        created_at: Utc::now(),
    }
}

fn new_item(code: &str, price: i64) -> LineItemKind {
    LineItemKind::NewItem(NewItemSpec {
        name: format!("Item {}", code),
        item_code: code.to_string(),
        description: None,
        category_id: None,
        brand: None,
        size: None,
        color: None,
        material: None,
        unit_cost: Decimal::from(price / 2),
        selling_price: Decimal::from(price),
    })
}

fn new_box(number: &str) -> LineItemKind {
    LineItemKind::Box(BoxSpec::New(NewBoxSpec {
        box_number: number.to_string(),
        box_name: "Carton".to_string(),
        box_type: None,
        unit_cost: Decimal::ZERO,
    }))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_status_flow_is_forward_only() {
        use ContainerStatus::*;
        assert!(Pending.can_transition_to(Received));
        assert!(Received.can_transition_to(Processed));
        assert!(!Pending.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(Received));
        assert!(!Received.can_transition_to(Pending));
        assert!(Processed.transition(Processed).is_err());
    }

    #[test]
    fn test_structural_edits_locked_after_processing() {
        assert!(ContainerStatus::Pending.allows_structural_edits());
        assert!(ContainerStatus::Received.allows_structural_edits());
        assert!(!ContainerStatus::Processed.allows_structural_edits());
    }

    /// Processing a container a second time is a transition error, not a no-op
    #[test]
    fn test_processing_twice_is_invalid_transition() {
        let items = vec![line_item(new_item("A-1", 10), 5, true)];
        assert!(matches!(
            plan_processing(ContainerStatus::Processed, &items),
            Err(ProcessingPlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_pending_container_cannot_be_processed() {
        let items = vec![line_item(new_item("A-1", 10), 5, false)];
        assert!(matches!(
            plan_processing(ContainerStatus::Pending, &items),
            Err(ProcessingPlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_received_container_without_items() {
        let err = plan_processing(ContainerStatus::Received, &[]).unwrap_err();
        assert_eq!(err.to_string(), "No items or boxes found in container to process");
    }

    #[test]
    fn test_tally_counts_items_and_boxes_separately() {
        let item = line_item(new_item("A-1", 10), 5, false);
        let carton = line_item(new_box("BX-1"), 3, false);
        let existing = line_item(LineItemKind::ExistingItem { item_id: Uuid::new_v4() }, 2, false);

        let mut tally = ProcessingTally::new();
        tally.record(&item, ItemOutcome::Committed { selling_value: Decimal::from(50) });
        tally.record(&carton, ItemOutcome::Committed { selling_value: Decimal::ZERO });
        tally.record(&existing, ItemOutcome::Skipped);

        let summary = tally.finish().unwrap();
        assert_eq!(summary.items_processed, 1);
        assert_eq!(summary.boxes_processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.selling_value, Decimal::from(50));
    }

    #[test]
    fn test_any_failure_discards_the_run() {
        let ok = line_item(new_item("A-1", 10), 5, false);
        let bad = line_item(new_item("A-2", 10), 5, false);

        let mut tally = ProcessingTally::new();
        tally.record(&ok, ItemOutcome::Committed { selling_value: Decimal::from(50) });
        tally.record_failure(&bad, "Item code already exists");
        assert!(tally.has_failures());

        let errors = tally.finish().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(&bad.id.to_string()));
        assert!(errors[0].contains("Item code already exists"));
    }

    #[test]
    fn test_box_line_item_wire_format() {
        let box_id = Uuid::new_v4();
        let value = serde_json::json!({
            "item_type": "box",
            "box_source": "existing",
            "box_id": box_id,
        });
        let kind: LineItemKind = serde_json::from_value(value).unwrap();
        assert_eq!(kind, LineItemKind::Box(BoxSpec::Existing { box_id }));
        assert!(kind.is_box());
        assert_eq!(kind.type_tag(), "box");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn kind_strategy() -> impl Strategy<Value = LineItemKind> {
        prop_oneof![
            Just(LineItemKind::ExistingItem { item_id: Uuid::nil() }),
            ("[A-Z]{2}-[0-9]{3}", 1i64..500).prop_map(|(code, price)| new_item(&code, price)),
            "BX-[0-9]{4}".prop_map(|number| new_box(&number)),
            Just(LineItemKind::Box(BoxSpec::Existing { box_id: Uuid::nil() })),
        ]
    }

    fn items_strategy() -> impl Strategy<Value = Vec<ContainerLineItem>> {
        prop::collection::vec((kind_strategy(), 1i32..1000, any::<bool>()), 0..20).prop_map(|rows| {
            rows.into_iter()
                .map(|(kind, quantity, processed)| line_item(kind, quantity, processed))
                .collect()
        })
    }

    proptest! {
        /// A run touches exactly the unprocessed rows, or refuses to start
        #[test]
        fn prop_plan_selects_unprocessed_rows(items in items_strategy()) {
            let unprocessed = items.iter().filter(|i| !i.is_processed).count();
            match plan_processing(ContainerStatus::Received, &items) {
                Ok(pending) => {
                    prop_assert_eq!(pending.len(), unprocessed);
                    prop_assert!(pending.iter().all(|i| !i.is_processed));
                }
                Err(ProcessingPlanError::NothingToProcess) => prop_assert_eq!(unprocessed, 0),
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        /// Only `received` containers can be processed
        #[test]
        fn prop_plan_requires_received(
            items in items_strategy(),
            status in prop_oneof![Just(ContainerStatus::Pending), Just(ContainerStatus::Processed)],
        ) {
            let is_invalid_transition = matches!(
                plan_processing(status, &items),
                Err(ProcessingPlanError::InvalidTransition(_))
            );
            prop_assert!(is_invalid_transition);
        }

        /// N items and M boxes committed means N + M processed, with the
        /// selling value summed over items only
        #[test]
        fn prop_tally_totals(items in items_strategy()) {
            let mut tally = ProcessingTally::new();
            let mut expected_value = Decimal::ZERO;
            for item in &items {
                let value = if item.kind.is_box() { Decimal::ZERO } else { Decimal::from(item.quantity) };
                expected_value += value;
                tally.record(item, ItemOutcome::Committed { selling_value: value });
            }
            let summary = tally.finish().unwrap();
            let boxes = items.iter().filter(|i| i.kind.is_box()).count() as u32;
            prop_assert_eq!(summary.boxes_processed, boxes);
            prop_assert_eq!(summary.items_processed + summary.boxes_processed, items.len() as u32);
            prop_assert_eq!(summary.selling_value, expected_value);
        }

        /// One failure anywhere reports every failure and no summary
        #[test]
        fn prop_tally_all_or_nothing(items in items_strategy(), failing in prop::collection::vec(any::<bool>(), 20)) {
            let mut tally = ProcessingTally::new();
            let mut failures = 0;
            for (item, fails) in items.iter().zip(failing) {
                if fails {
                    failures += 1;
                    tally.record_failure(item, "boom");
                } else {
                    tally.record(item, ItemOutcome::Committed { selling_value: Decimal::ONE });
                }
            }
            match tally.finish() {
                Ok(_) => prop_assert_eq!(failures, 0),
                Err(errors) => prop_assert_eq!(errors.len(), failures),
            }
        }
    }
}
