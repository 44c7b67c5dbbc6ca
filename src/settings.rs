//! File-backed settings.
//!
//! `Settings` is the TOML layer underneath `Config`: every field has a default,
//! a missing file yields `Settings::default()`, and environment variables are
//! applied on top of it in `Config::resolve`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an alternative settings file.
pub const SETTINGS_PATH_ENV: &str = "INVOICE_RECOVERY_SETTINGS";

const DEFAULT_SETTINGS_PATH: &str = "./invoice-recovery.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub gateway: GatewaySettings,
    pub escalation: EscalationSettings,
    pub sms: SmsSettings,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `libsql` or `memory`.
    pub backend: String,
    pub libsql_path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: "libsql".to_string(),
            libsql_path: PathBuf::from("./data/invoice-recovery.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub app_url: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            auth_token: None,
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    pub default_workspace_slug: String,
    pub target_offset_days: u16,
    pub default_jurisdiction: String,
    pub default_tone: String,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            default_workspace_slug: "demo-workspace".to_string(),
            target_offset_days: 5,
            default_jurisdiction: "Global - Basic".to_string(),
            default_tone: "conservative".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub webhook_token: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub stripe_secret_key: Option<String>,
    pub price_id: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Settings {
    /// Settings path from `INVOICE_RECOVERY_SETTINGS`, else the working-directory default.
    pub fn default_path() -> PathBuf {
        std::env::var(SETTINGS_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
    }

    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
