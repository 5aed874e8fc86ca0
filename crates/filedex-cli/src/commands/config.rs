use anyhow::{Context, Result};
use filedex_core::BackendKind;
use std::path::Path;
use toml_edit::{value, DocumentMut};

use crate::config::{self, Config, KEYS};

/// Show the current effective configuration.
pub fn show_config(config: &Config, path: &Path) -> Result<()> {
    println!("# Config file: {}", path.display());
    if !path.exists() {
        println!("# (file does not exist; using defaults)");
    }
    println!("# Priority: CLI args > ENV vars (FILEDEX_*) > Config file > Defaults\n");
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

/// Show the config file path.
pub fn show_path(path: &Path) -> Result<()> {
    println!("{}", path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config(path: &Path) -> Result<()> {
    if config::ensure_config_file(path)? {
        println!("Created config file: {}", path.display());
    } else {
        println!("Config file already exists: {}", path.display());
    }
    Ok(())
}

/// Set a config value, keeping the rest of the file (comments included).
pub fn set_config(path: &Path, key: &str, raw: &str) -> Result<()> {
    config::ensure_config_file(path)?;

    let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
    let updated = set_in_document(&contents, key, raw)?;
    std::fs::write(path, updated).context("Failed to write config file")?;

    let shown = if key == "password" { "<redacted>" } else { raw };
    println!("Updated {key} = {shown}");
    println!("  in {}", path.display());
    Ok(())
}

fn set_in_document(contents: &str, key: &str, raw: &str) -> Result<String> {
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Config file is not valid TOML")?;

    doc[key] = match key {
        "timeout_ms" => {
            let millis: i64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|millis| *millis >= 0)
                .with_context(|| {
                    format!("timeout_ms must be a non-negative integer, got '{raw}'")
                })?;
            value(millis)
        }
        "backend" => {
            let kind: BackendKind = raw.parse()?;
            value(kind.as_str())
        }
        "log_level" => {
            raw.trim()
                .parse::<log::LevelFilter>()
                .ok()
                .with_context(|| format!("unknown log level '{raw}'"))?;
            value(raw.trim().to_ascii_lowercase())
        }
        _ if KEYS.contains(&key) => value(raw),
        _ => anyhow::bail!("Unknown config key: {key}\n\nValid keys: {}", KEYS.join(", ")),
    };

    Ok(doc.to_string())
}
