//! Change events.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::Operation;
use crate::timestamp;
use chrono::{DateTime, Utc};
use stockpile_codec::{Row, Value};
use uuid::Uuid;

/// Column names of the change-log table, local and remote.
pub mod columns {
    /// Event id (primary key).
    pub const ID: &str = "id";
    /// Table the mutation targets.
    pub const TABLE_NAME: &str = "table_name";
    /// `Insert`, `Update` or `Delete`.
    pub const OPERATION: &str = "operation";
    /// Identifier of the mutated record.
    pub const RECORD_ID: &str = "record_id";
    /// Payload as a JSON object.
    pub const DATA: &str = "data";
    /// Creation time on the origin device.
    pub const TIMESTAMP: &str = "timestamp";
    /// Origin device id.
    pub const DEVICE_ID: &str = "device_id";
    /// Whether the event has been acknowledged by the remote log.
    pub const SYNCED: &str = "synced";

    /// Every column, in table order.
    pub const ALL: [&str; 8] = [
        ID, TABLE_NAME, OPERATION, RECORD_ID, DATA, TIMESTAMP, DEVICE_ID, SYNCED,
    ];
}

/// One logged mutation.
///
/// Events are immutable apart from `synced`, which only ever goes from
/// `false` to `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Unique event id.
    pub id: String,
    /// Table the mutation targets.
    pub table_name: String,
    /// Kind of mutation.
    pub operation: Operation,
    /// Identifier of the mutated record.
    pub record_id: String,
    /// Column values written by the mutation.
    pub payload: Row,
    /// Creation time on the origin device, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// Device that made the mutation.
    pub origin_device_id: String,
    /// Whether the remote log has acknowledged the event.
    pub synced: bool,
}

impl ChangeEvent {
    /// Creates an unsynced event with a fresh id.
    pub fn new(
        table_name: impl Into<String>,
        operation: Operation,
        record_id: impl Into<String>,
        payload: Row,
        timestamp: DateTime<Utc>,
        origin_device_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            table_name: table_name.into(),
            operation,
            record_id: record_id.into(),
            payload,
            timestamp: timestamp::truncate(timestamp),
            origin_device_id: origin_device_id.into(),
            synced: false,
        }
    }

    /// Returns the event marked as acknowledged.
    #[must_use]
    pub fn into_synced(mut self) -> Self {
        self.synced = true;
        self
    }

    /// Converts the event into a change-log table row.
    #[must_use]
    pub fn to_row(&self) -> Row {
        Row::new()
            .with(columns::ID, self.id.as_str())
            .with(columns::TABLE_NAME, self.table_name.as_str())
            .with(columns::OPERATION, self.operation.as_str())
            .with(columns::RECORD_ID, self.record_id.as_str())
            .with(columns::DATA, self.payload.to_json_string())
            .with(columns::TIMESTAMP, timestamp::format(self.timestamp))
            .with(columns::DEVICE_ID, self.origin_device_id.as_str())
            .with(columns::SYNCED, self.synced)
    }

    /// Reads an event from a change-log table row.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or malformed.
    pub fn from_row(row: &Row) -> ProtocolResult<Self> {
        let data = match row.get(columns::DATA) {
            None | Some(Value::Null) => Row::new(),
            Some(Value::Text(json)) => Row::from_json_str(json)?,
            Some(other) => {
                return Err(ProtocolError::invalid_field(
                    columns::DATA,
                    format!("expected JSON text, found {}", other.type_name()),
                ))
            }
        };
        Ok(Self {
            id: text(row, columns::ID)?,
            table_name: text(row, columns::TABLE_NAME)?,
            operation: text(row, columns::OPERATION)?.parse()?,
            record_id: text(row, columns::RECORD_ID)?,
            payload: data,
            timestamp: timestamp::parse(columns::TIMESTAMP, &text(row, columns::TIMESTAMP)?)?,
            origin_device_id: text(row, columns::DEVICE_ID)?,
            synced: flag(row, columns::SYNCED)?,
        })
    }
}

fn text(row: &Row, field: &'static str) -> ProtocolResult<String> {
    match row.get(field) {
        None | Some(Value::Null) => Err(ProtocolError::MissingField { field }),
        Some(value) => value
            .to_key_string()
            .ok_or(ProtocolError::MissingField { field }),
    }
}

fn flag(row: &Row, field: &'static str) -> ProtocolResult<bool> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Integer(i)) => Ok(*i != 0),
        Some(Value::Text(t)) if t == "true" || t == "1" => Ok(true),
        Some(Value::Text(t)) if t == "false" || t == "0" => Ok(false),
        Some(other) => Err(ProtocolError::invalid_field(
            field,
            format!("expected a boolean, found {other}"),
        )),
    }
}
