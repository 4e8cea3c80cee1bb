use std::env;
use std::fmt;

use auth::TokenCodec;
use auth::TokenError;
use auth::TokenSettings;
use chrono::Duration;
use config::builder::DefaultState;
use config::Config as ConfigSource;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::account::reset_tokens::DEFAULT_RESET_TTL_HOURS;
use crate::account::reset_tokens::MAX_RESET_TTL_HOURS;
use crate::account::service::ResetSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub reset: ResetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResetConfig {
    pub ttl_hours: i64,
    pub callback_base_url: String,
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (JWT__SECRET, DATABASE__URL, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    /// 4. Built-in defaults for algorithm and lifetimes
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let builder = ConfigSource::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: JWT__SECRET=... overrides jwt.secret
            .add_source(Environment::default().separator("__"));

        Self::from_builder(builder)
    }

    /// Build configuration from caller-supplied sources layered over the
    /// built-in defaults.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let configuration = builder
            .set_default("database.max_connections", 5_i64)?
            .set_default("jwt.algorithm", "HS256")?
            .set_default("jwt.access_ttl_minutes", 15_i64)?
            .set_default("jwt.refresh_ttl_minutes", 7 * 24 * 60_i64)?
            .set_default("reset.ttl_hours", DEFAULT_RESET_TTL_HOURS)?
            .build()?;

        configuration.try_deserialize()
    }
}

impl JwtConfig {
    /// Translate the raw settings into codec settings.
    ///
    /// # Errors
    /// * `Configuration` - Unknown algorithm or non-positive lifetime
    ///
    /// Upper bounds are enforced by [`TokenCodec::new`].
    pub fn token_settings(&self) -> Result<TokenSettings, TokenError> {
        if self.access_ttl_minutes <= 0 || self.refresh_ttl_minutes <= 0 {
            return Err(TokenError::Configuration(
                "token lifetimes must be positive".to_string(),
            ));
        }

        let minutes = |value: i64| {
            Duration::try_minutes(value).ok_or_else(|| {
                TokenError::Configuration(format!(
                    "token lifetime of {} minutes is out of range",
                    value
                ))
            })
        };

        Ok(TokenSettings {
            algorithm: TokenSettings::parse_algorithm(&self.algorithm)?,
            access_ttl: minutes(self.access_ttl_minutes)?,
            refresh_ttl: minutes(self.refresh_ttl_minutes)?,
        })
    }

    /// Build the process-wide token codec. Failures here are fatal at startup.
    pub fn token_codec(&self) -> Result<TokenCodec, TokenError> {
        TokenCodec::new(self.secret.as_bytes(), self.token_settings()?)
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_minutes", &self.refresh_ttl_minutes)
            .finish()
    }
}

impl ResetConfig {
    /// Validate and translate the reset flow settings.
    ///
    /// # Errors
    /// * `Message` - Lifetime outside `1..=MAX_RESET_TTL_HOURS` hours or an
    ///   empty callback base url
    pub fn settings(&self) -> Result<ResetSettings, ConfigError> {
        if self.ttl_hours <= 0 || self.ttl_hours > MAX_RESET_TTL_HOURS {
            return Err(ConfigError::Message(format!(
                "reset.ttl_hours must be between 1 and {}, got {}",
                MAX_RESET_TTL_HOURS, self.ttl_hours
            )));
        }

        if self.callback_base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "reset.callback_base_url must not be empty".to_string(),
            ));
        }

        Ok(ResetSettings {
            ttl: Duration::hours(self.ttl_hours),
            callback_base_url: self.callback_base_url.clone(),
        })
    }
}
