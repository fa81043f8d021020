//! Configuration types, loaded from the environment (and `.env`, if present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::extraction::MindeeConfig;
use crate::llm::LlmConfig;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// `None` runs the bot on the local CLI channel.
    pub telegram: Option<TelegramConfig>,
    pub llm: LlmConfig,
    pub mindee: MindeeConfig,
    /// Directory for temporary photo files.
    pub files_dir: PathBuf,
    /// The one quoted insurance price, in USD.
    pub price: Decimal,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub log_level: String,
    /// When set, logs are also written to a daily-rotated file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Load from the process environment, after reading `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("TELEGRAM_API_KEY"))
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: var("TELEGRAM_ALLOWED_USERS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            });

        let llm = LlmConfig {
            api_key: var("GEMINI_API_KEY").map(SecretString::from),
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let defaults = MindeeConfig::default();
        let mindee = MindeeConfig {
            api_key: var("MINDEE_API_KEY").map(SecretString::from),
            account: var("MINDEE_ACCOUNT").unwrap_or(defaults.account),
            id_card_endpoint: var("MINDEE_ID_CARD_ENDPOINT").unwrap_or(defaults.id_card_endpoint),
            vehicle_front_endpoint: var("MINDEE_VEHICLE_FRONT_ENDPOINT")
                .unwrap_or(defaults.vehicle_front_endpoint),
            vehicle_back_endpoint: var("MINDEE_VEHICLE_BACK_ENDPOINT")
                .unwrap_or(defaults.vehicle_back_endpoint),
            poll_interval: match var("MINDEE_POLL_INTERVAL_SECS") {
                Some(v) => Duration::from_secs(parse("MINDEE_POLL_INTERVAL_SECS", &v)?),
                None => defaults.poll_interval,
            },
            max_polls: match var("MINDEE_MAX_POLLS") {
                Some(v) => parse("MINDEE_MAX_POLLS", &v)?,
                None => defaults.max_polls,
            },
        };

        let price = match var("INSURANCE_PRICE") {
            Some(v) => parse::<Decimal>("INSURANCE_PRICE", &v)?,
            None => dec!(100),
        };
        if price <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "INSURANCE_PRICE".into(),
                message: "must be positive".into(),
            });
        }

        Ok(Self {
            telegram,
            llm,
            mindee,
            files_dir: var("INTAKE_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/files")),
            price,
            telemetry: TelemetryConfig {
                log_level: var("INTAKE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                log_dir: var("INTAKE_LOG_DIR").map(PathBuf::from),
            },
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{value:?}: {e}"),
    })
}
