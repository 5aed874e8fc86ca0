use clap::{ArgAction, Parser};
use filedex_core::error::{EXIT_IO, EXIT_SUCCESS, EXIT_VALIDATION};
use filedex_core::{Options, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod logging;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "filedex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print results of add, update, remove, import, scan and status as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (default: ~/.config/filedex/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend kind: production or embedded
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Directory holding the production database
    #[arg(long, global = true)]
    host: Option<PathBuf>,

    /// Database name (file stem for the production backend)
    #[arg(long = "database", global = true)]
    database: Option<String>,

    /// Backend lock timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Increase log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Add a record
    Add {
        /// Record identifier (positive integer)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Size in bytes
        #[arg(long)]
        size: Option<String>,
        /// Hex content digest
        #[arg(long)]
        hash: Option<String>,
        /// Modification time, RFC 3339 or epoch milliseconds
        #[arg(long)]
        modified: Option<String>,
    },
    /// Print a record as JSON
    Get {
        #[arg(long)]
        id: Option<String>,
    },
    /// Change fields of an existing record
    ///
    /// Only the given fields change; the identifier never does.
    Update {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        modified: Option<String>,
    },
    /// Remove a record
    Remove {
        #[arg(long)]
        id: Option<String>,
    },
    /// Print matching records as a JSON array, ordered by id
    List {
        /// Case-insensitive substring of the name
        #[arg(long)]
        filter: Option<String>,
        /// Exact content hash (case-insensitive)
        #[arg(long)]
        hash: Option<String>,
        /// Maximum number of records
        #[arg(long)]
        limit: Option<String>,
    },
    /// Load records from a JSON array (or single object)
    ///
    /// Either every record is stored or none is.
    Import {
        /// Input file, or '-' for stdin
        #[arg(long)]
        file: Option<String>,
    },
    /// Write all records as a JSON array to a file or stdout
    Export {
        #[arg(long)]
        file: Option<String>,
    },
    /// Print groups of records sharing a content hash
    Duplicates,
    /// Print the change log of a record
    History {
        #[arg(long)]
        id: Option<String>,
    },
    /// Summarize the configured store
    Status,
    /// Catalog every file under a directory, keyed by path, with its SHA-256
    ///
    /// Runs in one transaction; unchanged files are left alone.
    Scan {
        #[arg(long)]
        dir: Option<String>,
        /// Only files modified after this time (RFC 3339 or epoch milliseconds)
        #[arg(long)]
        since: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Create the config file with defaults
    Init,
    /// Print an example config file
    Example,
    /// Set a value in the config file
    Set { key: String, value: String },
}

/// What a parsed command line asks for.
enum Invocation {
    Record(&'static str, Options),
    Config(ConfigAction),
}

impl Commands {
    fn into_invocation(self) -> Invocation {
        let (name, pairs): (&'static str, Vec<(&str, Option<String>)>) = match self {
            Self::Add { id, name, size, hash, modified } => (
                "add",
                vec![
                    ("id", id),
                    ("name", name),
                    ("size", size),
                    ("hash", hash),
                    ("modified", modified),
                ],
            ),
            Self::Get { id } => ("get", vec![("id", id)]),
            Self::Update { id, name, size, hash, modified } => (
                "update",
                vec![
                    ("id", id),
                    ("name", name),
                    ("size", size),
                    ("hash", hash),
                    ("modified", modified),
                ],
            ),
            Self::Remove { id } => ("remove", vec![("id", id)]),
            Self::List { filter, hash, limit } => (
                "list",
                vec![("filter", filter), ("hash", hash), ("limit", limit)],
            ),
            Self::Import { file } => ("import", vec![("file", file)]),
            Self::Export { file } => ("export", vec![("file", file)]),
            Self::Duplicates => ("duplicates", Vec::new()),
            Self::History { id } => ("history", vec![("id", id)]),
            Self::Status => ("status", Vec::new()),
            Self::Scan { dir, since } => ("scan", vec![("dir", dir), ("since", since)]),
            Self::Config { action } => return Invocation::Config(action),
        };

        let options = pairs
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
            .collect();
        Invocation::Record(name, options)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors share the validation exit code; help and version
            // are successes.
            let code = if err.use_stderr() { EXIT_VALIDATION } else { EXIT_SUCCESS };
            if let Err(print_err) = err.print() {
                eprintln!("error: {print_err}");
            }
            return ExitCode::from(code);
        }
    };

    let settings = match Config::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_VALIDATION);
        }
    };

    let _logger = match logging::init(cli.verbose, settings.log_level.as_deref()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: logging disabled: {err}");
            None
        }
    };
    log::debug!("Loaded configuration: {:?}", settings);

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Text };
    let config_path = cli.config.clone().unwrap_or_else(config::config_file_path);

    let mut store = settings.store_config();
    if let Some(backend) = cli.backend {
        store.backend = backend;
    }
    if let Some(host) = cli.host {
        store.host = Some(host);
    }
    if let Some(database) = cli.database {
        store.database_name = database;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        store.timeout_ms = timeout_ms;
    }

    let action = match cli.command.into_invocation() {
        Invocation::Config(action) => action,
        Invocation::Record(name, options) => {
            return commands::run_record_command(store, name, &options, format);
        }
    };

    let result = match action {
        ConfigAction::Show => commands::config::show_config(&settings, &config_path),
        ConfigAction::Path => commands::config::show_path(&config_path),
        ConfigAction::Init => commands::config::init_config(&config_path),
        ConfigAction::Example => commands::config::show_example(),
        ConfigAction::Set { key, value } => {
            commands::config::set_config(&config_path, &key, &value)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let io = err.chain().any(|cause| cause.is::<std::io::Error>());
            ExitCode::from(if io { EXIT_IO } else { EXIT_VALIDATION })
        }
    }
}
