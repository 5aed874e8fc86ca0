use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ids::RecordId;

const MAX_NAME_CHARS: usize = 1024;
const MAX_HASH_CHARS: usize = 128;

/// A cataloged file entry.
///
/// Absent optional fields are omitted from JSON, and unknown fields are
/// rejected on input so malformed imports fail loudly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub id: RecordId,

    /// Display name or path of the file.
    pub name: String,

    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// Hex digest of the content, used for duplicate detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Record {
    #[must_use]
    pub fn new(id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            size: None,
            hash: None,
            modified_at: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Check the field invariants. Called on every write path.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if let Some(size) = self.size {
            validate_size(size)?;
        }
        if let Some(hash) = &self.hash {
            validate_hash(hash)?;
        }
        Ok(())
    }
}

/// A partial update of a record's non-identifier fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub hash: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.size.is_none()
            && self.hash.is_none()
            && self.modified_at.is_none()
    }

    /// Check the invariants of the fields the patch sets.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(size) = self.size {
            validate_size(size)?;
        }
        if let Some(hash) = &self.hash {
            validate_hash(hash)?;
        }
        Ok(())
    }

    /// Apply the patch on top of `record`, leaving the identifier untouched.
    #[must_use]
    pub fn apply_to(&self, record: &Record) -> Record {
        Record {
            id: record.id,
            name: self.name.clone().unwrap_or_else(|| record.name.clone()),
            size: self.size.or(record.size),
            hash: self.hash.clone().or_else(|| record.hash.clone()),
            modified_at: self.modified_at.or(record.modified_at),
        }
    }
}

/// Criteria for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    pub hash: Option<String>,
    pub limit: Option<u32>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(Error::validation(
            "name",
            format!("longer than {MAX_NAME_CHARS} characters"),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::validation("name", "contains control characters"));
    }
    Ok(())
}

fn validate_size(size: i64) -> Result<()> {
    if size < 0 {
        return Err(Error::validation("size", format!("{size} is negative")));
    }
    Ok(())
}

pub(crate) fn validate_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(Error::validation("hash", "must not be empty"));
    }
    if hash.len() > MAX_HASH_CHARS {
        return Err(Error::validation(
            "hash",
            format!("longer than {MAX_HASH_CHARS} characters"),
        ));
    }
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::validation(
            "hash",
            format!("'{hash}' is not hexadecimal"),
        ));
    }
    Ok(())
}
