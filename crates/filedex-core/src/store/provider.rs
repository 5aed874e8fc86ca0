use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::store::config::{BackendKind, StoreConfig};
use crate::store::schema;

/// Hands out one [`Session`] per command against the configured backend.
///
/// For the embedded backend the provider holds an anchor connection, so the
/// in-memory store lives exactly as long as the provider does.
#[derive(Debug)]
pub struct ConnectionProvider {
    config: StoreConfig,
    kind: BackendKind,
    target: PathBuf,
    _anchor: Option<Connection>,
}

impl ConnectionProvider {
    /// Resolve the backend described by `config`.
    ///
    /// Production stores are opened lazily by [`acquire`](Self::acquire);
    /// embedded stores are created here.
    pub fn new(config: StoreConfig) -> Result<Self, ConnectionError> {
        let kind = config.backend_kind()?;
        config.validate_database_name()?;

        let (target, anchor) = match kind {
            BackendKind::Production => (config.database_file(), None),
            BackendKind::Embedded => {
                let uri = format!(
                    "file:{}-{}?mode=memory&cache=shared",
                    config.database_name,
                    Uuid::new_v4().simple()
                );
                let target = PathBuf::from(uri);
                let anchor = open_connection(kind, &target, &config)?;
                (target, Some(anchor))
            }
        };

        log::debug!("Configured {} store at {}", kind, target.display());

        Ok(Self {
            config,
            kind,
            target,
            _anchor: anchor,
        })
    }

    /// Open a session. The session is closed when it is dropped.
    pub fn acquire(&self) -> Result<Session, ConnectionError> {
        let conn = open_connection(self.kind, &self.target, &self.config)?;
        log::debug!(
            "Acquired {} session for {} as {}",
            self.kind,
            self.target.display(),
            self.config.user.as_deref().unwrap_or("anonymous")
        );
        Ok(Session {
            conn,
            kind: self.kind,
            location: self.location(),
            opened_at: Instant::now(),
        })
    }

    /// Run `op` with a fresh session, releasing it on every exit path.
    pub fn with_session<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<ConnectionError>,
        F: FnOnce(&mut Session) -> Result<T, E>,
    {
        let mut session = self.acquire()?;
        op(&mut session)
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Human-readable location of the store (file path or memory URI).
    #[must_use]
    pub fn location(&self) -> String {
        self.target.display().to_string()
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }
}

fn open_connection(
    kind: BackendKind,
    target: &Path,
    config: &StoreConfig,
) -> Result<Connection, ConnectionError> {
    let location = target.display().to_string();
    let conn = Connection::open_with_flags(target, OpenFlags::default())
        .map_err(|err| ConnectionError::from_open(location.clone(), err))?;

    let setup = |source| ConnectionError::Setup {
        location: location.clone(),
        source,
    };

    conn.busy_timeout(config.timeout()).map_err(setup)?;
    if kind == BackendKind::Production {
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|err| classify_setup(location.clone(), err))?;
    }
    schema::ensure(&conn).map_err(|err| classify_setup(location.clone(), err))?;

    Ok(conn)
}

// Opening a SQLite file is lazy; permission problems only show up on the
// first statement.
fn classify_setup(location: String, source: rusqlite::Error) -> ConnectionError {
    match ConnectionError::from_open(location, source) {
        ConnectionError::Unreachable { location, source } => {
            ConnectionError::Setup { location, source }
        }
        other => other,
    }
}

/// Exclusive handle on the backend for the duration of one command.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    kind: BackendKind,
    location: String,
    opened_at: Instant,
}

impl Session {
    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::debug!(
            "Released {} session for {} after {:?}",
            self.kind,
            self.location,
            self.opened_at.elapsed()
        );
    }
}
