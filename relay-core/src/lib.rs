//! RELAY Core - Coordination Record Types
//!
//! Pure data structures shared by every other crate: identities, enums,
//! the handoff typestate, conflict and work-claim records, errors and
//! configuration. No I/O beyond loading a config file.

mod config;
mod entities;
mod enums;
mod error;
mod handoff;
mod identity;
mod pipeline;

pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use handoff::*;
pub use identity::*;
pub use pipeline::*;

// =============================================================================
// PROPERTY TESTS
// =============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;

    fn arb_item_type() -> impl Strategy<Value = ItemType> {
        prop::sample::select(ItemType::ALL.to_vec())
    }

    fn arb_status() -> impl Strategy<Value = HandoffStatus> {
        prop::sample::select(HandoffStatus::ALL.to_vec())
    }

    fn make_handoff(item_type: ItemType) -> Handoff<Pending> {
        Handoff::new(HandoffData {
            handoff_id: new_record_id(),
            project_id: "p".to_string(),
            item: ItemRef::new("i", item_type),
            from_agent: "developer".to_string(),
            to_agent: "tester".to_string(),
            kind: HandoffKind::Manual,
            message: None,
            context: json!({}),
            created_at: Utc::now(),
            accepted_at: None,
            completed_at: None,
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Terminal statuses admit no successor.
        #[test]
        fn prop_terminal_status_has_no_successor(from in arb_status(), to in arb_status()) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
            prop_assert!(!to.can_transition_to(HandoffStatus::Pending));
        }

        /// Status strings parse back to the same status.
        #[test]
        fn prop_status_db_str_parses(status in arb_status()) {
            prop_assert_eq!(HandoffStatus::from_db_str(status.as_db_str()).unwrap(), status);
        }

        /// Item type display form parses back.
        #[test]
        fn prop_item_type_display_parses(item_type in arb_item_type()) {
            prop_assert_eq!(item_type.to_string().parse::<ItemType>().unwrap(), item_type);
        }

        /// Any object output survives completion and completedBy always names the receiver.
        #[test]
        fn prop_completion_keeps_output_keys(
            item_type in arb_item_type(),
            key in "[a-z]{1,8}",
            value in any::<i64>(),
        ) {
            prop_assume!(key != COMPLETED_BY_KEY);
            let output = json!({ key.clone(): value });
            let completed = make_handoff(item_type)
                .accept(Utc::now())
                .complete(Some(&output), Utc::now());
            prop_assert_eq!(&completed.context()[key.as_str()], &json!(value));
            prop_assert_eq!(&completed.context()[COMPLETED_BY_KEY], &json!("tester"));
        }
    }
}
