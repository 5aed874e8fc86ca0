use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::ids::RecordId;
use crate::model::record::Record;

/// What a mutation did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Updated,
    Removed,
    Imported,
    Scanned,
}

impl ChangeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::Imported => "imported",
            Self::Scanned => "scanned",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "updated" => Ok(Self::Updated),
            "removed" => Ok(Self::Removed),
            "imported" => Ok(Self::Imported),
            "scanned" => Ok(Self::Scanned),
            other => Err(Error::validation(
                "action",
                format!("unknown change action '{other}'"),
            )),
        }
    }
}

/// One entry of the append-only change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub seq: i64,
    pub record_id: RecordId,
    pub action: ChangeAction,

    /// State of the record after the change; absent for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,

    pub changed_at: DateTime<Utc>,
}

/// Records sharing the same content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub records: Vec<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_str() {
        for action in [
            ChangeAction::Added,
            ChangeAction::Updated,
            ChangeAction::Removed,
            ChangeAction::Imported,
            ChangeAction::Scanned,
        ] {
            assert_eq!(action.as_str().parse::<ChangeAction>().unwrap(), action);
        }
        assert!("renamed".parse::<ChangeAction>().is_err());
    }

    #[test]
    fn test_action_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChangeAction::Imported).unwrap(),
            r#""imported""#
        );
    }
}
