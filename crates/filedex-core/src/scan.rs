//! Directory walking and content hashing behind `scan`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const READ_CHUNK: usize = 8192;

/// A regular file found under the scan root, with its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: i64,
    /// Lowercase hex SHA-256 of the content.
    pub hash: String,
    pub modified_at: DateTime<Utc>,
}

impl ScannedFile {
    /// Name the file is cataloged under.
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// What one `scan` did to the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ScanSummary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.added + self.updated + self.unchanged
    }
}

/// Walks a directory tree and hashes the files in it.
#[derive(Debug, Clone)]
pub struct Scanner {
    dir: PathBuf,
    since: Option<DateTime<Utc>>,
}

impl Scanner {
    /// Scan everything under `dir`, or with `since`, only files modified
    /// strictly after it.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, since: Option<DateTime<Utc>>) -> Self {
        Self {
            dir: dir.into(),
            since,
        }
    }

    /// Collect the matching files, ordered by path.
    ///
    /// Paths are absolute so repeated scans from another working directory
    /// find the same records. Entries that cannot be read are skipped with a
    /// warning.
    pub fn walk(&self) -> Result<Vec<ScannedFile>> {
        let root = self.dir.canonicalize().map_err(|err| {
            Error::validation("dir", format!("cannot open {}: {err}", self.dir.display()))
        })?;
        if !root.is_dir() {
            return Err(Error::validation(
                "dir",
                format!("{} is not a directory", self.dir.display()),
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match self.inspect(entry.path()) {
                Ok(Some(file)) => {
                    log::trace!("Hashed {}", file.path.display());
                    files.push(file);
                }
                Ok(None) => {}
                Err(err) => log::warn!("Skipping {}: {}", entry.path().display(), err),
            }
        }

        log::info!("Found {} file(s) under {}", files.len(), root.display());
        Ok(files)
    }

    fn inspect(&self, path: &Path) -> io::Result<Option<ScannedFile>> {
        let metadata = std::fs::metadata(path)?;
        let modified_at: DateTime<Utc> = metadata.modified()?.into();
        if self.since.is_some_and(|since| modified_at <= since) {
            return Ok(None);
        }

        Ok(Some(ScannedFile {
            path: path.to_path_buf(),
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            hash: digest_file(path)?,
            modified_at,
        }))
    }
}

fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
