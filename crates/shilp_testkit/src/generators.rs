//! Property-based test generators using proptest.
//!
//! Strategies produce oplogs that keep the server's invariants: LSNs are
//! strictly ascending with gaps, and every entry carries the fields its op
//! type needs.

use crate::fixtures::object;
use proptest::prelude::*;
use serde_json::json;
use shilp_protocol::{Lsn, OpType, OplogEntry};

/// Strategy for valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for record IDs.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for record-level op types.
pub fn record_op_strategy() -> impl Strategy<Value = OpType> {
    prop_oneof![
        3 => Just(OpType::Insert),
        2 => Just(OpType::Update),
        1 => Just(OpType::Delete),
    ]
}

/// Strategy for strictly ascending LSNs with gaps.
pub fn lsn_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Lsn>> {
    prop::collection::vec(1u64..5, 0..max_len).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0u64, |lsn, gap| {
                *lsn += gap;
                Some(*lsn)
            })
            .collect()
    })
}

/// Strategy for a well-formed oplog of record operations on one collection.
pub fn oplog_strategy(collection: String, max_len: usize) -> impl Strategy<Value = Vec<OplogEntry>> {
    lsn_sequence_strategy(max_len).prop_flat_map(move |lsns| {
        let collection = collection.clone();
        let len = lsns.len();
        (
            Just(lsns),
            prop::collection::vec((doc_id_strategy(), record_op_strategy()), len),
        )
            .prop_map(move |(lsns, ops)| {
                lsns.into_iter()
                    .zip(ops)
                    .map(|(lsn, (doc_id, op))| {
                        let mut entry = OplogEntry::new(lsn, collection.clone(), doc_id, op);
                        if op != OpType::Delete {
                            entry.fields = Some(object(json!({ "title": format!("v{lsn}") })));
                        }
                        entry
                    })
                    .collect()
            })
    })
}
