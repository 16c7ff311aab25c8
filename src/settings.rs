use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderSettings {
    pub data_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub idle_poll_interval_ms: u64,
    pub auto_read_on_start: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("mykad_data"),
            poll_interval_ms: 1_000,
            idle_poll_interval_ms: 2_000,
            auto_read_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub active: Duration,
    pub idle: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        ReaderSettings::default().intervals()
    }
}

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl ReaderSettings {
    /// Reads settings from `path`, falling back to defaults when the file is missing
    /// or unreadable as JSON, then applies `MYKAD_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring invalid settings in {}: {err}", path.display());
                Self::default()
            })
        } else {
            Self::default()
        };

        Ok(settings.with_overrides(lookup))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("MYKAD_DATA_DIR").filter(|dir| !dir.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("MYKAD_AUTO_READ") {
            self.auto_read_on_start = env_flag(&flag);
        }
        self
    }

    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            active: Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS)),
            idle: Duration::from_millis(self.idle_poll_interval_ms.max(MIN_POLL_INTERVAL_MS)),
        }
    }
}
