//! Remote change-log records.

use crate::error::ProtocolResult;
use crate::event::ChangeEvent;
use crate::operation::Operation;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use stockpile_codec::Row;

/// One row of the remote change-log table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLogEntry {
    /// Event id; the upsert key.
    pub id: String,
    /// Table the mutation targets.
    pub table_name: String,
    /// Kind of mutation.
    pub operation: Operation,
    /// Identifier of the mutated record.
    #[serde(deserialize_with = "string_or_number")]
    pub record_id: String,
    /// Payload object.
    #[serde(default)]
    pub data: JsonValue,
    /// Creation time on the origin device.
    #[serde(with = "timestamp::micros")]
    pub timestamp: DateTime<Utc>,
    /// Origin device id.
    pub device_id: String,
    /// Whether the entry is visible to other devices.
    #[serde(default)]
    pub synced: bool,
}

impl RemoteLogEntry {
    /// Builds the entry a device publishes for one of its events.
    ///
    /// Published entries are always `synced`, since other devices only pull
    /// acknowledged entries.
    #[must_use]
    pub fn published(event: &ChangeEvent) -> Self {
        Self {
            id: event.id.clone(),
            table_name: event.table_name.clone(),
            operation: event.operation,
            record_id: event.record_id.clone(),
            data: event.payload.to_json(),
            timestamp: event.timestamp,
            device_id: event.origin_device_id.clone(),
            synced: true,
        }
    }

    /// Converts the entry into a change event.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is neither an object nor null.
    pub fn into_event(self) -> ProtocolResult<ChangeEvent> {
        let payload = if self.data.is_null() {
            Row::new()
        } else {
            Row::from_json(&self.data)?
        };
        Ok(ChangeEvent {
            id: self.id,
            table_name: self.table_name,
            operation: self.operation,
            record_id: self.record_id,
            payload,
            timestamp: self.timestamp,
            origin_device_id: self.device_id,
            synced: self.synced,
        })
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number record id, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;
    use chrono::TimeZone;
    use serde_json::json;

    fn event() -> ChangeEvent {
        ChangeEvent::new(
            "inventory_items",
            Operation::Insert,
            "42",
            Row::new().with("id", 42i64).with("sku", "SKU042"),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            "device-a",
        )
    }

    #[test]
    fn published_entries_are_synced() {
        let original = event();
        let entry = RemoteLogEntry::published(&original);
        assert!(entry.synced);
        assert_eq!(entry.data, json!({"id": 42, "sku": "SKU042"}));

        let back = entry.into_event().unwrap();
        assert_eq!(back, original.into_synced());
    }

    #[test]
    fn wire_shape() {
        let json = serde_json::to_value(RemoteLogEntry::published(&event())).unwrap();
        assert_eq!(json["operation"], "Insert");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(json["device_id"], "device-a");
        assert_eq!(json["synced"], true);
    }

    #[test]
    fn reads_numeric_record_ids_and_offsets() {
        let entry: RemoteLogEntry = serde_json::from_value(json!({
            "id": "e1",
            "table_name": "inventory_items",
            "operation": "Delete",
            "record_id": 42,
            "data": null,
            "timestamp": "2024-05-01T14:00:00+02:00",
            "device_id": "device-b",
            "synced": true
        }))
        .unwrap();
        assert_eq!(entry.record_id, "42");
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        assert!(entry.into_event().unwrap().payload.is_empty());
    }

    #[test]
    fn non_object_data_is_rejected() {
        let mut entry = RemoteLogEntry::published(&event());
        entry.data = json!([1, 2]);
        assert!(matches!(entry.into_event(), Err(ProtocolError::Codec(_))));
    }
}
