//! Append-only JSON storage for decoded records.
//!
//! Every save creates a new file `<ic>_<YYYYMMDD-HHMMSS>.json`; existing files are
//! never opened for writing. A second save for the same identity number within the
//! same second becomes `<ic>_<YYYYMMDD-HHMMSS>-<N>.json`, with `N` counting up from 1.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use crate::error::ReaderError;
use crate::models::IdentityRecord;

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const MAX_SAME_SECOND_SUFFIX: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

/// Replaces path separators so the identity number can be used as a file name.
pub fn sanitize_identifier(ic_number: &str) -> String {
    ic_number.replace(['/', '\\'], "-")
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, record: &IdentityRecord) -> Result<PathBuf, ReaderError> {
        if !record.is_complete() {
            return Err(ReaderError::EmptyIdentifier);
        }

        fs::create_dir_all(&self.dir).map_err(|source| ReaderError::PersistenceFailed {
            path: self.dir.clone(),
            source,
        })?;

        let contents = serde_json::to_string_pretty(record).map_err(|err| {
            ReaderError::PersistenceFailed {
                path: self.dir.clone(),
                source: err.into(),
            }
        })?;

        let stem = format!(
            "{}_{}",
            sanitize_identifier(&record.ic_number),
            Local::now().format(FILE_TIMESTAMP_FORMAT)
        );

        // Two saves inside the same second get a numeric suffix instead of overwriting.
        for attempt in 0..MAX_SAME_SECOND_SUFFIX {
            let file_name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{attempt}.json")
            };
            let path = self.dir.join(file_name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ReaderError::PersistenceFailed { path, source }),
            };

            file.write_all(contents.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|source| ReaderError::PersistenceFailed {
                    path: path.clone(),
                    source,
                })?;

            info!("Data saved to: {}", path.display());
            return Ok(path);
        }

        Err(ReaderError::PersistenceFailed {
            path: self.dir.join(format!("{stem}.json")),
            source: ErrorKind::AlreadyExists.into(),
        })
    }

    /// Names of saved `.json` files, oldest name first. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>, ReaderError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ReaderError::PersistenceFailed {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ReaderError::PersistenceFailed {
                path: self.dir.clone(),
                source,
            })?;
            let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, file_name: &str) -> Result<(IdentityRecord, PathBuf), ReaderError> {
        let invalid = |reason: &str| ReaderError::InvalidDataFile {
            name: file_name.to_string(),
            reason: reason.to_string(),
        };

        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name == ".."
        {
            return Err(invalid("not a plain file name"));
        }

        let path = self.dir.join(file_name);
        let contents = fs::read_to_string(&path).map_err(|err| invalid(&err.to_string()))?;
        let record = serde_json::from_str(&contents).map_err(|err| invalid(&err.to_string()))?;
        Ok((record, path))
    }
}
