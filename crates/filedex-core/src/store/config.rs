use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConnectionError;

/// Which relational backend a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// On-disk SQLite database under the configured host directory.
    Production,
    /// Shared-cache in-memory SQLite database, private to one provider.
    Embedded,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Embedded => "embedded",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "embedded" => Ok(Self::Embedded),
            _ => Err(ConnectionError::UnknownBackend(s.to_string())),
        }
    }
}

/// Connection settings handed to [`ConnectionProvider`](super::ConnectionProvider).
///
/// The backend is kept as text so an unknown kind surfaces as a
/// `ConnectionError` when the provider is built, not as a config parse error.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `"production"` or `"embedded"`.
    pub backend: String,

    /// Directory holding `<database_name>.db` for the production backend.
    pub host: Option<PathBuf>,

    pub database_name: String,

    pub user: Option<String>,

    pub password: Option<String>,

    /// How long a backend call may wait on a lock before failing.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Production.as_str().to_string(),
            host: None,
            database_name: "filedex".to_string(),
            user: None,
            password: None,
            timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Config for an embedded in-memory store.
    #[must_use]
    pub fn embedded(database_name: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Embedded.as_str().to_string(),
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    /// Config for an on-disk store in `host`.
    #[must_use]
    pub fn production(host: impl Into<PathBuf>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn backend_kind(&self) -> Result<BackendKind, ConnectionError> {
        self.backend.parse()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Path of the production database file.
    #[must_use]
    pub fn database_file(&self) -> PathBuf {
        self.host
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!("{}.db", self.database_name))
    }

    pub(crate) fn validate_database_name(&self) -> Result<(), ConnectionError> {
        let name = &self.database_name;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(ConnectionError::InvalidDatabaseName(name.clone()))
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
