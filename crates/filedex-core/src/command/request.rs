use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use crate::codec;
use crate::error::{Error, Result};
use crate::model::record::validate_hash;
use crate::model::{ListFilter, Record, RecordId, RecordPatch};

/// Flat map of recognized `--key=value` options, keys without dashes.
pub type Options = BTreeMap<String, String>;

/// Names accepted by [`CommandRequest::from_options`].
pub const COMMANDS: &[&str] = &[
    "add",
    "get",
    "update",
    "remove",
    "list",
    "import",
    "export",
    "duplicates",
    "history",
    "status",
    "scan",
];

const RECORD_FIELDS: &[&str] = &["name", "size", "hash", "modified"];

/// A validated request for one repository operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Add(Record),
    Get { id: RecordId },
    Update { id: RecordId, patch: RecordPatch },
    Remove { id: RecordId },
    List(ListFilter),
    Import(ImportSource),
    Export { file: Option<PathBuf> },
    Duplicates,
    History { id: RecordId },
    Status,
    /// Catalog the files under `dir`, only those modified after `since` when
    /// given.
    Scan {
        dir: PathBuf,
        since: Option<DateTime<Utc>>,
    },
}

/// Where `import` reads its JSON from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    Stdin,
    File(PathBuf),
}

impl ImportSource {
    /// Read and decode the records. Runs before any backend access.
    pub fn load(&self) -> Result<Vec<Record>> {
        let text = match self {
            Self::Stdin => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            }
            Self::File(path) => std::fs::read_to_string(path)?,
        };
        codec::from_json_many(&text)
    }
}

impl CommandRequest {
    /// Build a request from a command name and its options.
    ///
    /// Fails with `Error::Validation` when an option is missing, unexpected,
    /// or not coercible to its type. Nothing here touches the backend.
    pub fn from_options(command: &str, options: &Options) -> Result<Self> {
        let reader = OptionReader { command, options };

        match command {
            "add" => {
                reader.allow(&["id", "name", "size", "hash", "modified"])?;
                let mut record = Record::new(reader.id()?, reader.required("name")?);
                record.size = reader.integer("size")?;
                record.hash = reader.optional("hash").map(str::to_string);
                record.modified_at = reader.timestamp("modified")?;
                record.validate()?;
                Ok(Self::Add(record))
            }
            "get" => {
                reader.allow(&["id"])?;
                Ok(Self::Get { id: reader.id()? })
            }
            "update" => {
                reader.allow(&["id", "name", "size", "hash", "modified"])?;
                let id = reader.id()?;
                let patch = RecordPatch {
                    name: reader.optional("name").map(str::to_string),
                    size: reader.integer("size")?,
                    hash: reader.optional("hash").map(str::to_string),
                    modified_at: reader.timestamp("modified")?,
                };
                if patch.is_empty() {
                    return Err(Error::validation(
                        "fields",
                        format!("update needs at least one of --{}", RECORD_FIELDS.join(", --")),
                    ));
                }
                patch.validate()?;
                Ok(Self::Update { id, patch })
            }
            "remove" => {
                reader.allow(&["id"])?;
                Ok(Self::Remove { id: reader.id()? })
            }
            "list" => {
                reader.allow(&["filter", "hash", "limit"])?;
                let hash = reader.optional("hash").map(str::to_string);
                if let Some(hash) = &hash {
                    validate_hash(hash)?;
                }
                let limit = reader
                    .integer("limit")?
                    .map(|limit| {
                        u32::try_from(limit)
                            .ok()
                            .filter(|limit| *limit > 0)
                            .ok_or_else(|| {
                                Error::validation(
                                    "limit",
                                    format!("{limit} is not a positive count"),
                                )
                            })
                    })
                    .transpose()?;
                Ok(Self::List(ListFilter {
                    name_contains: reader.optional("filter").map(str::to_string),
                    hash,
                    limit,
                }))
            }
            "import" => {
                reader.allow(&["file"])?;
                let source = match reader.required("file")? {
                    "-" => ImportSource::Stdin,
                    path => ImportSource::File(PathBuf::from(path)),
                };
                Ok(Self::Import(source))
            }
            "export" => {
                reader.allow(&["file"])?;
                Ok(Self::Export {
                    file: reader.optional("file").map(PathBuf::from),
                })
            }
            "duplicates" => {
                reader.allow(&[])?;
                Ok(Self::Duplicates)
            }
            "history" => {
                reader.allow(&["id"])?;
                Ok(Self::History { id: reader.id()? })
            }
            "status" => {
                reader.allow(&[])?;
                Ok(Self::Status)
            }
            "scan" => {
                reader.allow(&["dir", "since"])?;
                let dir = reader.required("dir")?;
                if dir.trim().is_empty() {
                    return Err(Error::validation("dir", "must not be empty"));
                }
                Ok(Self::Scan {
                    dir: PathBuf::from(dir),
                    since: reader.timestamp("since")?,
                })
            }
            other => Err(Error::validation(
                "command",
                format!("unknown command '{other}' (expected one of: {})", COMMANDS.join(", ")),
            )),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Get { .. } => "get",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::List(_) => "list",
            Self::Import(_) => "import",
            Self::Export { .. } => "export",
            Self::Duplicates => "duplicates",
            Self::History { .. } => "history",
            Self::Status => "status",
            Self::Scan { .. } => "scan",
        }
    }
}

struct OptionReader<'a> {
    command: &'a str,
    options: &'a Options,
}

impl OptionReader<'_> {
    fn allow(&self, allowed: &[&str]) -> Result<()> {
        match self.options.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => Err(Error::validation(
                key.as_str(),
                format!("--{key} is not an option of '{}'", self.command),
            )),
            None => Ok(()),
        }
    }

    fn optional(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.optional(key).ok_or_else(|| {
            Error::validation(key, format!("'{}' requires --{key}", self.command))
        })
    }

    fn id(&self) -> Result<RecordId> {
        self.required("id")?.parse()
    }

    fn integer(&self, key: &str) -> Result<Option<i64>> {
        self.optional(key)
            .map(|value| {
                value.trim().parse::<i64>().map_err(|_| {
                    Error::validation(key, format!("'{value}' is not an integer"))
                })
            })
            .transpose()
    }

    /// RFC 3339, or integer milliseconds since the Unix epoch.
    fn timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.optional(key).map(|value| parse_timestamp(key, value)).transpose()
    }
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::validation(key, format!("{millis} ms is out of range")));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| {
            Error::validation(
                key,
                format!("'{value}' is neither RFC 3339 nor epoch milliseconds ({err})"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options(pairs: &[(&str, &str)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn validation_field(err: Error) -> String {
        match err {
            Error::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_add_builds_record() {
        let request = CommandRequest::from_options(
            "add",
            &options(&[
                ("id", "1"),
                ("name", "Alice"),
                ("size", "12"),
                ("modified", "2024-01-02T03:04:05Z"),
            ]),
        )
        .unwrap();

        let expected = Record::new(RecordId::new(1).unwrap(), "Alice")
            .with_size(12)
            .with_modified_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(request, CommandRequest::Add(expected));
        assert_eq!(request.name(), "add");
    }

    #[test]
    fn test_add_requires_id_and_name() {
        let err = CommandRequest::from_options("add", &options(&[("name", "x")])).unwrap_err();
        assert_eq!(validation_field(err), "id");

        let err = CommandRequest::from_options("add", &options(&[("id", "1")])).unwrap_err();
        assert_eq!(validation_field(err), "name");
    }

    #[test]
    fn test_bad_identifier_is_rejected() {
        for bad in ["0", "-1", "abc", ""] {
            let err = CommandRequest::from_options("get", &options(&[("id", bad)])).unwrap_err();
            assert_eq!(validation_field(err), "id");
        }
    }

    #[test]
    fn test_unexpected_option_is_rejected() {
        let err = CommandRequest::from_options("get", &options(&[("id", "1"), ("name", "x")]))
            .unwrap_err();
        assert_eq!(validation_field(err), "name");
    }

    #[test]
    fn test_update_needs_a_field() {
        let err = CommandRequest::from_options("update", &options(&[("id", "1")])).unwrap_err();
        assert_eq!(validation_field(err), "fields");

        let request =
            CommandRequest::from_options("update", &options(&[("id", "1"), ("size", "9")]))
                .unwrap();
        assert!(matches!(
            request,
            CommandRequest::Update { patch, .. } if patch.size == Some(9) && patch.name.is_none()
        ));
    }

    #[test]
    fn test_type_coercion_failures() {
        let err = CommandRequest::from_options(
            "add",
            &options(&[("id", "1"), ("name", "x"), ("size", "big")]),
        )
        .unwrap_err();
        assert_eq!(validation_field(err), "size");

        let err = CommandRequest::from_options(
            "update",
            &options(&[("id", "1"), ("modified", "last tuesday")]),
        )
        .unwrap_err();
        assert_eq!(validation_field(err), "modified");
    }

    #[test]
    fn test_timestamp_accepts_epoch_millis() {
        let at = parse_timestamp("modified", "1700000000000").unwrap();
        assert_eq!(at, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
    }

    #[test]
    fn test_list_filter() {
        let request = CommandRequest::from_options(
            "list",
            &options(&[("filter", "cat"), ("hash", "ABCD"), ("limit", "10")]),
        )
        .unwrap();
        assert_eq!(
            request,
            CommandRequest::List(ListFilter {
                name_contains: Some("cat".to_string()),
                hash: Some("ABCD".to_string()),
                limit: Some(10),
            })
        );

        let err = CommandRequest::from_options("list", &options(&[("limit", "0")])).unwrap_err();
        assert_eq!(validation_field(err), "limit");
    }

    #[test]
    fn test_import_source() {
        let request = CommandRequest::from_options("import", &options(&[("file", "-")])).unwrap();
        assert_eq!(request, CommandRequest::Import(ImportSource::Stdin));

        let err = CommandRequest::from_options("import", &Options::new()).unwrap_err();
        assert_eq!(validation_field(err), "file");
    }

    #[test]
    fn test_scan_request() {
        let request = CommandRequest::from_options(
            "scan",
            &options(&[("dir", "/data"), ("since", "2024-01-01T00:00:00Z")]),
        )
        .unwrap();
        assert_eq!(
            request,
            CommandRequest::Scan {
                dir: PathBuf::from("/data"),
                since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }
        );

        let err = CommandRequest::from_options("scan", &Options::new()).unwrap_err();
        assert_eq!(validation_field(err), "dir");

        let err = CommandRequest::from_options(
            "scan",
            &options(&[("dir", "/data"), ("since", "soon")]),
        )
        .unwrap_err();
        assert_eq!(validation_field(err), "since");
    }

    #[test]
    fn test_unknown_command() {
        let err = CommandRequest::from_options("drop", &Options::new()).unwrap_err();
        assert_eq!(validation_field(err), "command");
    }
}
