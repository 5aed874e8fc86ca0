use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::codec;
use crate::command::request::{CommandRequest, Options};
use crate::error::{Error, Result, EXIT_SUCCESS};
use crate::model::{Change, DuplicateGroup, Record, RecordId};
use crate::scan::{ScanSummary, Scanner};
use crate::store::{repository, BackendKind, ConnectionProvider, Session};

/// How mutating commands and `status` report their result.
///
/// Read commands (`get`, `list`, `export`, `duplicates`, `history`) always
/// produce JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Terminal state of one command.
#[derive(Debug)]
pub enum Outcome {
    /// The command succeeded; the string is the complete stdout payload.
    Reported(String),
    Failed(Error),
}

impl Outcome {
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Reported(_) => EXIT_SUCCESS,
            Self::Failed(err) => err.exit_code(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Reported(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parsed,
    Validated,
    Executed,
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Validated => "validated",
            Self::Executed => "executed",
            Self::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Result of executing a request, before rendering.
enum Report {
    Added(Record),
    Fetched(Record),
    Updated(Record),
    Removed(RecordId),
    Listed(String),
    Imported(usize),
    Exported { count: usize, file: Option<PathBuf>, json: String },
    Duplicates(Vec<DuplicateGroup>),
    History(Vec<Change>),
    Status(StatusReport),
    Scanned(ScanSummary),
}

#[derive(Debug, Serialize)]
struct StatusReport {
    backend: BackendKind,
    location: String,
    records: u64,
    duplicate_groups: usize,
}

/// Maps command requests onto repository calls against one provider.
#[derive(Debug)]
pub struct Dispatcher<'p> {
    provider: &'p ConnectionProvider,
    format: OutputFormat,
}

impl<'p> Dispatcher<'p> {
    #[must_use]
    pub const fn new(provider: &'p ConnectionProvider) -> Self {
        Self {
            provider,
            format: OutputFormat::Text,
        }
    }

    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Validate `options` for `command` and dispatch it.
    ///
    /// Validation failures never acquire a session.
    pub fn run(&self, command: &str, options: &Options) -> Outcome {
        log::debug!("{}: {} with {} option(s)", command, Stage::Parsed, options.len());
        match CommandRequest::from_options(command, options) {
            Ok(request) => self.dispatch(request),
            Err(err) => {
                log::debug!("{} rejected during validation: {}", command, err);
                Outcome::Failed(err)
            }
        }
    }

    /// Execute an already validated request and render its output.
    pub fn dispatch(&self, request: CommandRequest) -> Outcome {
        let name = request.name();
        log::debug!("{}: {}", name, Stage::Validated);

        let result = self
            .execute(request)
            .inspect(|_| log::debug!("{}: {}", name, Stage::Executed))
            .and_then(|report| self.render(report));

        match result {
            Ok(output) => {
                log::debug!("{}: {}", name, Stage::Reported);
                Outcome::Reported(output)
            }
            Err(err) => {
                log::info!("{} failed: {}", name, err);
                Outcome::Failed(err)
            }
        }
    }

    fn execute(&self, request: CommandRequest) -> Result<Report> {
        // Import and scan input is read before the backend is touched, so a
        // bad file or directory costs no session.
        match &request {
            CommandRequest::Import(source) => {
                let records = source.load()?;
                log::debug!("Loaded {} record(s) for import", records.len());
                return self
                    .provider
                    .with_session(|session| repository::import(session, &records))
                    .map(Report::Imported);
            }
            CommandRequest::Scan { dir, since } => {
                let files = Scanner::new(dir, *since).walk()?;
                return self
                    .provider
                    .with_session(|session| repository::scan(session, &files))
                    .map(Report::Scanned);
            }
            _ => {}
        }

        self.provider
            .with_session(|session| Self::execute_in(session, request))
    }

    fn execute_in(session: &mut Session, request: CommandRequest) -> Result<Report> {
        match request {
            CommandRequest::Add(record) => repository::create(session, &record).map(Report::Added),
            CommandRequest::Get { id } => repository::read(session, id).map(Report::Fetched),
            CommandRequest::Update { id, patch } => {
                repository::update(session, id, &patch).map(Report::Updated)
            }
            CommandRequest::Remove { id } => {
                repository::delete(session, id)?;
                Ok(Report::Removed(id))
            }
            CommandRequest::List(filter) => {
                let cursor = repository::list(session, &filter)?;
                codec::to_json_array(cursor).map(Report::Listed)
            }
            CommandRequest::Export { file } => {
                let records = repository::list(session, &Default::default())?
                    .collect::<Result<Vec<_>>>()?;
                let json = codec::to_json_array(records.iter().cloned().map(Ok))?;
                Ok(Report::Exported {
                    count: records.len(),
                    file,
                    json,
                })
            }
            CommandRequest::Duplicates => repository::duplicates(session).map(Report::Duplicates),
            CommandRequest::History { id } => repository::history(session, id).map(Report::History),
            CommandRequest::Status => Ok(Report::Status(StatusReport {
                backend: session.backend(),
                location: session.location().to_string(),
                records: repository::count(session)?,
                duplicate_groups: repository::duplicates(session)?.len(),
            })),
            CommandRequest::Import(_) | CommandRequest::Scan { .. } => Err(Error::validation(
                "command",
                "import and scan must be dispatched with their input loaded",
            )),
        }
    }

    fn render(&self, report: Report) -> Result<String> {
        let json = self.format == OutputFormat::Json;
        let output = match report {
            Report::Added(record) if json => codec::to_json(&record)?,
            Report::Added(record) => format!("Added record {}", record.id),
            Report::Fetched(record) => codec::to_json(&record)?,
            Report::Updated(record) if json => codec::to_json(&record)?,
            Report::Updated(record) => format!("Updated record {}", record.id),
            Report::Removed(id) if json => codec::encode(&serde_json::json!({ "removed": id }))?,
            Report::Removed(id) => format!("Removed record {id}"),
            Report::Listed(array) => array,
            Report::Imported(count) if json => {
                codec::encode(&serde_json::json!({ "imported": count }))?
            }
            Report::Imported(count) => format!("Imported {count} record(s)"),
            Report::Exported { count, file: Some(path), json: array } => {
                write_replacing(&path, &array)?;
                log::info!("Exported {} record(s) to {}", count, path.display());
                if json {
                    codec::encode(&serde_json::json!({
                        "exported": count,
                        "file": path.display().to_string(),
                    }))?
                } else {
                    format!("Exported {count} record(s) to {}", path.display())
                }
            }
            Report::Exported { json: array, .. } => array,
            Report::Duplicates(groups) => codec::encode(&groups)?,
            Report::History(changes) => codec::encode(&changes)?,
            Report::Status(status) if json => codec::encode(&status)?,
            Report::Status(status) => format!(
                "backend: {}\nlocation: {}\nrecords: {}\nduplicate groups: {}",
                status.backend, status.location, status.records, status.duplicate_groups
            ),
            Report::Scanned(summary) if json => codec::encode(&summary)?,
            Report::Scanned(summary) => format!(
                "Scanned {} file(s): {} added, {} updated, {} unchanged",
                summary.total(),
                summary.added,
                summary.updated,
                summary.unchanged
            ),
        };
        Ok(output)
    }
}

/// Write `contents` to a sibling temporary file and rename it over `path`,
/// so readers never see a partial export.
fn write_replacing(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}
