// File: ./src/config.rs
// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::storage::SnapshotStorage;
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;
use strum::Display;

fn default_inbox_folder() -> String {
    "inboundInvitations".to_string()
}
fn default_inbox_component() -> String {
    "inboundInvitations".to_string()
}
fn default_processed_folder() -> String {
    "processed".to_string()
}
fn default_calendar_component() -> String {
    "calendar".to_string()
}
fn default_calendar_folder() -> String {
    "calendar".to_string()
}
fn default_calendar_mime_type() -> String {
    "text/calendar".to_string()
}
fn default_email_marker() -> String {
    "emailed".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// What the archive step does when an attachment cannot be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ArchiveMode {
    /// Undo the moves already made so the email is back in the inbox.
    #[default]
    Transactional,
    /// Stop where the failure happened and leave the partial archive.
    BestEffort,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Name of the folder inbound invitation emails land in.
    #[serde(default = "default_inbox_folder")]
    pub inbox_folder: String,
    #[serde(default = "default_inbox_component")]
    pub inbox_component: String,
    #[serde(default = "default_processed_folder")]
    pub processed_folder: String,
    #[serde(default = "default_calendar_component")]
    pub calendar_component: String,
    #[serde(default = "default_calendar_folder")]
    pub calendar_folder: String,
    #[serde(default = "default_calendar_mime_type")]
    pub calendar_mime_type: String,
    #[serde(default = "default_email_marker")]
    pub email_marker: String,
    #[serde(default)]
    pub archive_mode: ArchiveMode,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inbox_folder: default_inbox_folder(),
            inbox_component: default_inbox_component(),
            processed_folder: default_processed_folder(),
            calendar_component: default_calendar_component(),
            calendar_folder: default_calendar_folder(),
            calendar_mime_type: default_calendar_mime_type(),
            email_marker: default_email_marker(),
            archive_mode: ArchiveMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults. Other errors still surface.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(config) => Ok(config),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Whether an error from `load` means the config file was missing.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    /// Save configuration using an explicit context.
    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        SnapshotStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            SnapshotStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Terminal log level; unknown strings fall back to `Info`.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.log_level).unwrap_or(log::LevelFilter::Info)
    }
}
