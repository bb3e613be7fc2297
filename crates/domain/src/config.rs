//! Environment-driven configuration structures shared by all binaries.

use std::env;

use thiserror::Error;

use crate::money::FeeSchedule;

/// API configuration: HTTP bind targets, the shared database, and the payment
/// settings the checkout services need.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    payments: PaymentConfig,
    processor: ProcessorConfig,
}

impl ApiConfig {
    /// Loads the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            payments: PaymentConfig::load_from_env()?,
            processor: ProcessorConfig::load_from_env()?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn payments(&self) -> &PaymentConfig {
        &self.payments
    }

    pub fn processor(&self) -> &ProcessorConfig {
        &self.processor
    }
}

/// Payment-side knobs: the platform fee percentage and the settlement
/// currency. The fee is threaded into services as a [`FeeSchedule`] value so
/// it is overridable per instance in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    platform_fee_percent: f64,
    currency: String,
}

impl PaymentConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let platform_fee_percent = match get_optional_var("PLATFORM_FEE_PERCENT") {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|source| ConfigError::InvalidDecimal {
                    key: "PLATFORM_FEE_PERCENT",
                    source,
                })
                .and_then(|value| {
                    if (0.0..=100.0).contains(&value) {
                        Ok(value)
                    } else {
                        Err(ConfigError::OutOfRange {
                            key: "PLATFORM_FEE_PERCENT",
                        })
                    }
                })?,
            None => FeeSchedule::DEFAULT_PERCENT,
        };
        let currency = get_optional_var("PLATFORM_CURRENCY")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_else(|| "usd".to_string());

        Ok(Self {
            platform_fee_percent,
            currency,
        })
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.platform_fee_percent)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

/// Connection settings for the external payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    api_url: String,
    secret_key: String,
    webhook_secret: String,
}

impl ProcessorConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_url: get_required_var("PROCESSOR_API_URL")?,
            secret_key: get_required_var("PROCESSOR_SECRET_KEY")?,
            webhook_secret: get_required_var("PROCESSOR_WEBHOOK_SECRET")?,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("TRAILFUND_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid decimal in `{key}`: {source}")]
    InvalidDecimal {
        key: &'static str,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("value of `{key}` is out of range")]
    OutOfRange { key: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
