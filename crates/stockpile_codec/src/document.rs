//! Canonical snapshot document.

use crate::error::{CodecError, CodecResult};
use crate::row::json_type_name;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};

/// Parses bytes as JSON without checking the document shape.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the bytes are not UTF-8 JSON.
pub fn parse_json(bytes: &[u8]) -> CodecResult<JsonValue> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Header of a snapshot document.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMetadata {
    /// When the snapshot was exported. Absent in some legacy documents.
    pub export_date: Option<DateTime<Utc>>,
    /// Ledger version the snapshot was taken for, if any.
    pub version: Option<u64>,
}

/// The rows of one table as they appear in the document.
///
/// Rows are kept as raw JSON so that malformed entries (non-objects) survive
/// decoding and can be reported individually during restore.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    /// Table name.
    pub name: String,
    /// Row objects, in document order.
    pub rows: Vec<JsonValue>,
}

/// A self-describing export of the tracked tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDocument {
    /// Document header.
    pub metadata: SnapshotMetadata,
    /// Tables in document order.
    pub tables: Vec<TableData>,
}

impl SnapshotDocument {
    /// Creates an empty document stamped with `export_date`.
    #[must_use]
    pub fn new(export_date: DateTime<Utc>, version: Option<u64>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                export_date: Some(export_date),
                version,
            },
            tables: Vec::new(),
        }
    }

    /// Appends a table.
    pub fn push_table(&mut self, name: impl Into<String>, rows: Vec<JsonValue>) {
        self.tables.push(TableData {
            name: name.into(),
            rows,
        });
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Total number of rows across all tables.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Validates the shape of a parsed document and converts it.
    ///
    /// The top level must be an object whose `data` member is an object of
    /// arrays. `metadata` is optional and read leniently.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidStructure`] if the shape is wrong.
    pub fn from_json(json: JsonValue) -> CodecResult<Self> {
        let mut root = match json {
            JsonValue::Object(root) => root,
            other => {
                return Err(CodecError::invalid_structure(format!(
                    "expected document object, found {}",
                    json_type_name(&other)
                )))
            }
        };

        let data = match root.remove("data") {
            Some(JsonValue::Object(data)) => data,
            Some(other) => {
                return Err(CodecError::invalid_structure(format!(
                    "`data` must be an object, found {}",
                    json_type_name(&other)
                )))
            }
            None => return Err(CodecError::invalid_structure("missing `data` object")),
        };

        let metadata = match root.get("metadata") {
            Some(JsonValue::Object(meta)) => SnapshotMetadata {
                export_date: meta
                    .get("exportDate")
                    .and_then(JsonValue::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc)),
                version: meta.get("version").and_then(JsonValue::as_u64),
            },
            _ => SnapshotMetadata {
                export_date: None,
                version: None,
            },
        };

        let mut tables = Vec::with_capacity(data.len());
        for (name, rows) in data {
            match rows {
                JsonValue::Array(rows) => tables.push(TableData { name, rows }),
                JsonValue::Null => tables.push(TableData {
                    name,
                    rows: Vec::new(),
                }),
                other => {
                    return Err(CodecError::invalid_structure(format!(
                        "table `{name}` must be an array, found {}",
                        json_type_name(&other)
                    )))
                }
            }
        }

        Ok(Self { metadata, tables })
    }

    /// Parses and validates a document from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] for malformed JSON and
    /// [`CodecError::InvalidStructure`] for a wrong shape.
    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_json(parse_json(bytes)?)
    }

    /// Converts the document into JSON.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut metadata = Map::new();
        if let Some(date) = self.metadata.export_date {
            metadata.insert(
                "exportDate".into(),
                JsonValue::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        metadata.insert(
            "version".into(),
            self.metadata.version.map_or(JsonValue::Null, JsonValue::from),
        );

        let data: Map<String, JsonValue> = self
            .tables
            .iter()
            .map(|t| (t.name.clone(), JsonValue::Array(t.rows.clone())))
            .collect();

        let mut root = Map::new();
        root.insert("metadata".into(), JsonValue::Object(metadata));
        root.insert("data".into(), JsonValue::Object(data));
        JsonValue::Object(root)
    }

    /// Serializes the document as compact JSON bytes.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> SnapshotDocument {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut doc = SnapshotDocument::new(date, Some(3));
        doc.push_table("inventory_items", vec![json!({"id": 1, "name": "Tea"})]);
        doc.push_table("categories", vec![]);
        doc
    }

    #[test]
    fn document_shape() {
        let json = sample().to_json();
        assert_eq!(json["metadata"]["exportDate"], "2024-03-01T12:00:00.000Z");
        assert_eq!(json["metadata"]["version"], 3);
        assert_eq!(json["data"]["inventory_items"][0]["name"], "Tea");
        assert_eq!(json["data"]["categories"], json!([]));
    }

    #[test]
    fn roundtrip_bytes() {
        let doc = sample();
        let back = SnapshotDocument::from_slice(&doc.to_vec()).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.row_count(), 1);
        assert!(back.table("categories").unwrap().rows.is_empty());
    }

    #[test]
    fn table_order_preserved() {
        let doc = SnapshotDocument::from_slice(br#"{"data":{"z":[],"a":[],"m":[]}}"#).unwrap();
        let names: Vec<_> = doc.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
        assert_eq!(doc.metadata.version, None);
    }

    #[test]
    fn missing_data_is_structure_error() {
        let err = SnapshotDocument::from_slice(br#"{"metadata":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));

        let err = SnapshotDocument::from_slice(br#"{"data":[1]}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));

        let err = SnapshotDocument::from_slice(b"[]").unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));
    }

    #[test]
    fn malformed_json_is_json_error() {
        let err = SnapshotDocument::from_slice(b"{\"data\":").unwrap_err();
        assert!(matches!(err, CodecError::Json { .. }));
    }

    #[test]
    fn non_object_rows_survive_decoding() {
        let doc = SnapshotDocument::from_slice(br#"{"data":{"t":[{"id":1},"junk",null]}}"#).unwrap();
        assert_eq!(doc.table("t").unwrap().rows.len(), 3);
    }

    #[test]
    fn lenient_metadata() {
        let doc = SnapshotDocument::from_slice(
            br#"{"metadata":{"exportDate":"yesterday","version":"x"},"data":{}}"#,
        )
        .unwrap();
        assert_eq!(doc.metadata.export_date, None);
        assert_eq!(doc.metadata.version, None);
    }
}
