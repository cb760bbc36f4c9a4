//! Run configuration

use crate::calendar::API_BASE;
use crate::FaturaError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Scope requested from Google for event creation
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Configuration for a processing run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned for invoices, and parent of the archive folders
    pub directory: PathBuf,
    /// OAuth client secrets downloaded from the Google Cloud console
    pub credentials_path: PathBuf,
    /// Cache of the access and refresh tokens
    pub token_path: PathBuf,
    /// Calendar the reminders are created in (default: "primary")
    pub calendar_id: String,
    /// Time zone attached to event start and end (default: "Europe/Lisbon")
    pub time_zone: String,
    /// Move processed files into a `YYYY-MM-DD` folder
    pub archive: bool,
    /// Extract and log events without calling the API or moving files
    pub dry_run: bool,
    /// Root of the Calendar v3 REST API
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            calendar_id: "primary".to_string(),
            time_zone: "Europe/Lisbon".to_string(),
            archive: true,
            dry_run: false,
            api_base: API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Parse a TOML configuration; missing keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self, FaturaError> {
        let config: Config = toml::from_str(text)?;
        if config.calendar_id.trim().is_empty() {
            return Err(FaturaError::Config("calendar_id is empty".to_string()));
        }
        if !config.api_base.starts_with("http") {
            return Err(FaturaError::Config(format!(
                "api_base is not an HTTP URL: {:?}",
                config.api_base
            )));
        }
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FaturaError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FaturaError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&text)
    }
}
