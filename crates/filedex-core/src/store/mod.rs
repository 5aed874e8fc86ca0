//! SQLite-backed persistence: connection provider, sessions, and the
//! transactional record repository.

pub mod config;
pub mod cursor;
pub mod provider;
pub mod repository;
mod schema;

pub use config::{BackendKind, StoreConfig};
pub use cursor::RecordCursor;
pub use provider::{ConnectionProvider, Session};
