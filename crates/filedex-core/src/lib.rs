//! Core persistence-and-command layer for filedex.
//!
//! This crate defines the record model, the SQLite-backed repository and
//! connection provider, the JSON serialization adapter, and the command
//! dispatcher that maps parsed CLI options onto repository operations.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod codec;
pub mod command;
pub mod error;
pub mod model;
pub mod scan;
pub mod store;

pub use command::{CommandRequest, Dispatcher, Options, Outcome, OutputFormat};
pub use error::{ConnectionError, Error, Result};
pub use model::{Change, ChangeAction, DuplicateGroup, ListFilter, Record, RecordId, RecordPatch};
pub use scan::{ScanSummary, ScannedFile, Scanner};
pub use store::{BackendKind, ConnectionProvider, Session, StoreConfig};
