//! Mutation kinds.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of mutation a change event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// A row was inserted.
    Insert,
    /// Columns of a row were updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl Operation {
    /// Name as stored in both change logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "Insert",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    /// Parses an operation name, ignoring ASCII case.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        [Operation::Insert, Operation::Update, Operation::Delete]
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownOperation {
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_case() {
        assert_eq!("update".parse::<Operation>().unwrap(), Operation::Update);
        assert_eq!("INSERT".parse::<Operation>().unwrap(), Operation::Insert);
        assert_eq!("Delete".parse::<Operation>().unwrap(), Operation::Delete);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(matches!(
            "Upsert".parse::<Operation>(),
            Err(ProtocolError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn serde_uses_names() {
        assert_eq!(serde_json::to_string(&Operation::Insert).unwrap(), r#""Insert""#);
    }
}
