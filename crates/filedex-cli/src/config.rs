use anyhow::{Context, Result};
use confyg::Confygery;
use filedex_core::StoreConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Settings for filedex.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (FILEDEX_* prefix)
/// 3. Config file (~/.config/filedex/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend kind, `production` or `embedded`.
    ///
    /// Can be set via:
    /// - CLI: --backend embedded
    /// - ENV: FILEDEX_BACKEND
    pub backend: String,

    /// Directory holding the production database file.
    ///
    /// Default: ~/.local/share/filedex (or platform equivalent)
    pub host: Option<PathBuf>,

    pub database_name: String,

    pub user: Option<String>,

    /// Never printed; `config show` redacts it.
    pub password: Option<String>,

    /// Backend lock timeout in milliseconds.
    #[serde(deserialize_with = "number_or_string")]
    pub timeout_ms: u64,

    /// Default log level (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            backend: store.backend,
            host: None,
            database_name: store.database_name,
            user: None,
            password: None,
            timeout_ms: store.timeout_ms,
            log_level: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Reads `path` when given (it must exist), otherwise the default config
    /// file if present. Environment variables use the `FILEDEX_` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be parsed, or if an explicit
    /// `path` does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars())
    }

    fn load_with_env<I>(path: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_path = match path {
            Some(path) => {
                anyhow::ensure!(path.exists(), "Config file not found: {}", path.display());
                path.to_path_buf()
            }
            None => config_file_path(),
        };

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        // Values are serialized rather than pasted into TOML text, so quotes
        // in a password or path survive.
        let overrides = env_overrides(vars);
        if !overrides.is_empty() {
            log::debug!("Applying {} FILEDEX_* override(s)", overrides.len());
            builder
                .add_struct(&overrides)
                .context("Failed to load environment variables")?;
        }

        let config: Self = builder.build().context("Failed to build configuration")?;
        Ok(config)
    }

    /// Connection settings for the store, with the default host filled in.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            backend: self.backend.clone(),
            host: Some(self.host.clone().unwrap_or_else(default_host)),
            database_name: self.database_name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            timeout_ms: self.timeout_ms,
        }
    }

    /// This config as TOML, with the password masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.password.is_some() {
            shown.password = Some("<redacted>".to_string());
        }
        toml::to_string(&shown).context("Failed to render configuration")
    }
}

/// Keys accepted by `config set`.
pub const KEYS: &[&str] = &[
    "backend",
    "host",
    "database_name",
    "user",
    "password",
    "timeout_ms",
    "log_level",
];

/// `FILEDEX_<KEY>` variables for the keys in [`KEYS`], keyed in lower case.
fn env_overrides<I>(vars: I) -> toml::Table
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix("FILEDEX_")?.to_ascii_lowercase();
            KEYS.contains(&key.as_str())
                .then(|| (key, toml::Value::String(value)))
        })
        .collect()
}

/// Default directory for the production database.
///
/// Returns: ~/.local/share/filedex (or platform equivalent)
pub fn default_host() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedex")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/filedex/config.toml
/// - macOS: ~/Library/Application Support/filedex/config.toml
/// - Windows: %APPDATA%\filedex\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedex")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# filedex configuration file
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (FILEDEX_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Backend kind: "production" (SQLite file on disk) or "embedded" (in-memory,
# discarded when the command exits)
#
# Can also be set via:
# - CLI: filedex --backend embedded list
# - Environment: FILEDEX_BACKEND=embedded
backend = "production"

# Directory holding <database_name>.db
#
# Default: platform data directory, e.g. ~/.local/share/filedex
#host = "/srv/filedex"

database_name = "filedex"

# Credentials are accepted for parity with server databases; SQLite does not
# check them.
#user = "filedex"
#password = "change-me"

# How long to wait on a locked database before failing with exit code 5
timeout_ms = 5000

# Log level written to stderr: error, warn, info, debug or trace
#log_level = "warn"
"#
}

/// Create the config file at `path` if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

// Environment values always arrive as strings.
fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{text}' is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedex_core::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend, "production");
        assert_eq!(config.database_name, "filedex");
        assert_eq!(config.timeout_ms, 5_000);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_store_config_fills_default_host() {
        let store = Config::default().store_config();
        assert_eq!(store.backend_kind().unwrap(), BackendKind::Production);
        assert_eq!(store.host, Some(default_host()));
    }

    #[test]
    fn test_timeout_accepts_string_or_number() {
        let from_int: Config = toml::from_str("timeout_ms = 250").unwrap();
        let from_str: Config = toml::from_str(r#"timeout_ms = "250""#).unwrap();
        assert_eq!(from_int.timeout_ms, 250);
        assert_eq!(from_str.timeout_ms, 250);
        assert!(toml::from_str::<Config>(r#"timeout_ms = "soon""#).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.backend, "production");
        assert_eq!(config.timeout_ms, 5_000);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "database_name = \"catalog\"\ntimeout_ms = 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database_name, "catalog");
        assert_eq!(config.timeout_ms, 42);
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "database_name = \"catalog\"\ntimeout_ms = 42\n").unwrap();

        let config = Config::load_with_env(
            Some(&path),
            vars(&[
                ("FILEDEX_TIMEOUT_MS", "900"),
                ("FILEDEX_BACKEND", "embedded"),
                ("FILEDEX_COLOUR", "red"),
                ("HOME", "/root"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database_name, "catalog");
        assert_eq!(config.timeout_ms, 900);
        assert_eq!(config.backend, "embedded");
    }

    #[test]
    fn test_env_values_with_quotes_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load_with_env(
            Some(&path),
            vars(&[
                ("FILEDEX_PASSWORD", "it's \"quoted\" \\ here"),
                ("FILEDEX_USER", "o'brien"),
                ("FILEDEX_HOST", "/srv/data's dir"),
            ]),
        )
        .unwrap();
        assert_eq!(config.password.as_deref(), Some("it's \"quoted\" \\ here"));
        assert_eq!(config.user.as_deref(), Some("o'brien"));
        assert_eq!(config.host.as_deref(), Some(Path::new("/srv/data's dir")));
    }

    #[test]
    fn test_env_overrides_ignore_unknown_keys() {
        let table = env_overrides(vars(&[
            ("FILEDEX_LOG_LEVEL", "debug"),
            ("FILEDEX_NOPE", "x"),
            ("FILEDEXPASSWORD", "x"),
        ]));
        assert_eq!(table.len(), 1);
        assert_eq!(table["log_level"].as_str(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_redacted_output_hides_password() {
        let config = Config {
            password: Some("hunter2".to_string()),
            ..Config::default()
        };
        let shown = config.to_redacted_toml().unwrap();
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_ensure_config_file_only_creates_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(ensure_config_file(&path).unwrap());
        assert!(!ensure_config_file(&path).unwrap());
    }
}
