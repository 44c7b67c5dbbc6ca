//! Runtime configuration.
//!
//! Resolution order for every value: environment variable, then the TOML
//! settings file, then the built-in default.

mod helpers;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::config::helpers::{
    optional_env, parse_bool_env, parse_optional_env, parse_string_env, parse_u16_env,
};
use crate::error::ConfigError;
use crate::recovery::templates::MessageTone;
use crate::settings::Settings;

/// Fully resolved configuration.
#[derive(Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub escalation: EscalationConfig,
    pub sms: SmsConfig,
    pub billing: BillingConfig,
}

impl Config {
    /// Load the settings file at `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Settings::load(path)?;
        Self::resolve(&settings)
    }

    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            gateway: GatewayConfig::resolve(settings)?,
            escalation: EscalationConfig::resolve(settings)?,
            sms: SmsConfig::resolve(settings)?,
            billing: BillingConfig::resolve(settings)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Memory,
    LibSql,
}

impl DatabaseBackend {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            "libsql" | "sqlite" => Ok(Self::LibSql),
            other => Err(ConfigError::InvalidValue {
                key: "DATABASE_BACKEND".to_string(),
                message: format!("unsupported backend '{other}' (expected 'libsql' or 'memory')"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::LibSql => "libsql",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub libsql_path: PathBuf,
}

impl DatabaseConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend_raw =
            parse_string_env("DATABASE_BACKEND", settings.database.backend.clone())?;
        let libsql_path = match optional_env("LIBSQL_PATH")? {
            Some(raw) => PathBuf::from(raw),
            None => settings.database.libsql_path.clone(),
        };
        if libsql_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "LIBSQL_PATH".to_string(),
                message: "database path must not be empty".to_string(),
            });
        }

        Ok(Self {
            backend: DatabaseBackend::from_str(&backend_raw)?,
            libsql_path,
        })
    }
}

/// HTTP gateway settings.
#[derive(Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on `/api` routes when set.
    pub auth_token: Option<SecretString>,
    /// Public base URL, used for billing redirect links and the CORS allow-list.
    pub app_url: String,
    /// Accept cross-origin requests from any origin instead of `app_url` only.
    pub cors_allow_any: bool,
}

impl GatewayConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let app_url = parse_string_env("APP_URL", settings.gateway.app_url.clone())?;
        let app_url = app_url.trim_end_matches('/').to_string();
        if !(app_url.starts_with("http://") || app_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "APP_URL".to_string(),
                message: format!("'{app_url}' must start with http:// or https://"),
            });
        }

        Ok(Self {
            host: parse_string_env("GATEWAY_HOST", settings.gateway.host.clone())?,
            port: parse_u16_env("GATEWAY_PORT", settings.gateway.port)?,
            auth_token: parse_optional_env(
                "GATEWAY_AUTH_TOKEN",
                settings.gateway.auth_token.clone(),
            )?
            .map(SecretString::from),
            app_url,
            cors_allow_any: parse_bool_env("GATEWAY_CORS_ALLOW_ANY", false)?,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GATEWAY_HOST".to_string(),
                message: format!("'{}:{}' is not a socket address: {e}", self.host, self.port),
            })
    }
}

/// Escalation pipeline defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationConfig {
    pub default_workspace_slug: String,
    /// Days added to today to produce the `target_date` placeholder.
    pub target_offset_days: u16,
    pub default_jurisdiction: String,
    pub default_tone: MessageTone,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            default_workspace_slug: "demo-workspace".to_string(),
            target_offset_days: 5,
            default_jurisdiction: "Global - Basic".to_string(),
            default_tone: MessageTone::Conservative,
        }
    }
}

impl EscalationConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let slug = parse_string_env(
            "RECOVERY_DEFAULT_WORKSPACE",
            settings.escalation.default_workspace_slug.clone(),
        )?;
        if slug.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RECOVERY_DEFAULT_WORKSPACE".to_string(),
                message: "default workspace slug must not be empty".to_string(),
            });
        }

        let tone_raw = parse_string_env(
            "RECOVERY_DEFAULT_TONE",
            settings.escalation.default_tone.clone(),
        )?;
        let default_tone =
            MessageTone::parse(&tone_raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "RECOVERY_DEFAULT_TONE".to_string(),
                message: format!(
                    "unsupported tone '{tone_raw}' (expected conservative, balanced or assertive)"
                ),
            })?;

        Ok(Self {
            default_workspace_slug: slug.trim().to_string(),
            target_offset_days: parse_u16_env(
                "RECOVERY_TARGET_OFFSET_DAYS",
                settings.escalation.target_offset_days,
            )?,
            default_jurisdiction: parse_string_env(
                "RECOVERY_DEFAULT_JURISDICTION",
                settings.escalation.default_jurisdiction.clone(),
            )?,
            default_tone,
        })
    }
}

/// Twilio SMS credentials. All three of sid, token and number must be present
/// for live delivery.
#[derive(Debug)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<SecretString>,
    pub from_number: Option<String>,
    /// Key for `X-Twilio-Signature` on inbound webhooks. Falls back to the auth token.
    pub webhook_token: Option<SecretString>,
    /// Public URL Twilio posts inbound messages to, as configured in the console.
    pub webhook_url: Option<String>,
}

impl SmsConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let auth_token =
            parse_optional_env("TWILIO_AUTH_TOKEN", settings.sms.auth_token.clone())?;
        let webhook_token =
            parse_optional_env("TWILIO_WEBHOOK_TOKEN", settings.sms.webhook_token.clone())?
                .or_else(|| auth_token.clone());
        Ok(Self {
            account_sid: parse_optional_env("TWILIO_ACCOUNT_SID", settings.sms.account_sid.clone())?,
            auth_token: auth_token.map(SecretString::from),
            from_number: parse_optional_env(
                "TWILIO_PHONE_NUMBER",
                settings.sms.from_number.clone(),
            )?,
            webhook_token: webhook_token.map(SecretString::from),
            webhook_url: parse_optional_env("TWILIO_WEBHOOK_URL", settings.sms.webhook_url.clone())?,
        })
    }

    pub fn has_twilio_config(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

/// Stripe credentials. Checkout needs the key and a price id.
#[derive(Debug)]
pub struct BillingConfig {
    pub secret_key: Option<SecretString>,
    pub price_id: Option<String>,
    pub webhook_secret: Option<SecretString>,
}

impl BillingConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: parse_optional_env(
                "STRIPE_SECRET_KEY",
                settings.billing.stripe_secret_key.clone(),
            )?
            .map(SecretString::from),
            price_id: parse_optional_env("STRIPE_PRICE_ID", settings.billing.price_id.clone())?,
            webhook_secret: parse_optional_env(
                "STRIPE_WEBHOOK_SECRET",
                settings.billing.webhook_secret.clone(),
            )?
            .map(SecretString::from),
        })
    }

    pub fn has_stripe_config(&self) -> bool {
        self.secret_key.is_some() && self.price_id.is_some()
    }

    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }
}
