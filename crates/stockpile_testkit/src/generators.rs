//! Property-based test generators using proptest.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use stockpile_codec::{Row, Value};
use stockpile_sync_protocol::{ChangeEvent, Operation};

/// Strategy for column values.
///
/// Floats are quarter steps so their JSON text reads back exactly.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-4_000_000i32..4_000_000).prop_map(|n| Value::Float(f64::from(n) / 4.0)),
        "[ -~]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for rows with distinct column names.
pub fn row_strategy() -> impl Strategy<Value = Row> {
    prop::collection::btree_map(column_name_strategy(), value_strategy(), 0..8)
        .prop_map(|columns| columns.into_iter().collect())
}

/// Strategy for operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Insert),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for change events between 2020 and 2030.
pub fn change_event_strategy() -> impl Strategy<Value = ChangeEvent> {
    (
        "[a-z_]{1,16}",
        operation_strategy(),
        "[A-Z0-9]{1,8}",
        row_strategy(),
        1_577_836_800i64..1_893_456_000,
        0u32..1_000_000,
        "[a-z]{1,8}",
        any::<bool>(),
    )
        .prop_map(|(table, op, record, payload, secs, micros, device, synced)| {
            let ts = Utc
                .timestamp_opt(secs, micros * 1_000)
                .single()
                .expect("Timestamp in range");
            let mut event = ChangeEvent::new(table, op, record, payload, ts, device);
            event.synced = synced;
            event
        })
}

/// Strategy for arbitrary payload bytes, including invalid UTF-8.
pub fn payload_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}
