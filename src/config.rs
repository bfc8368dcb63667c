//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Process configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. Without one only the CLI channel runs.
    pub telegram_token: Option<SecretString>,
    /// Telegram users allowed to talk to the bot (`*` for everyone).
    pub allowed_users: Vec<String>,
    /// Chat ids that receive submission and SOS notifications.
    pub admin_ids: Vec<i64>,
    /// Path of the libSQL database holding sessions and the ledger.
    pub db_path: PathBuf,
    /// Sessions untouched for longer than this are swept.
    pub session_idle_timeout: Duration,
    /// How often the idle sweep runs.
    pub sweep_interval: Duration,
    /// Per-request timeout for outbound deliveries.
    pub delivery_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            allowed_users: vec!["*".to_string()],
            admin_ids: Vec::new(),
            db_path: PathBuf::from("./data/intake.db"),
            session_idle_timeout: Duration::from_secs(86_400), // 1 day
            sweep_interval: Duration::from_secs(300),          // 5 minutes
            delivery_timeout: Duration::from_secs(10),
        }
    }
}

impl BotConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let telegram_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let allowed_users = lookup("TELEGRAM_ALLOWED_USERS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.allowed_users);

        let admin_ids = match lookup("ADMIN_IDS") {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|id| {
                    id.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                        key: "ADMIN_IDS".into(),
                        message: format!("{id:?}: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let db_path = lookup("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        Ok(Self {
            telegram_token,
            allowed_users,
            admin_ids,
            db_path,
            session_idle_timeout: secs(
                &lookup,
                "SESSION_IDLE_TIMEOUT_SECS",
                defaults.session_idle_timeout,
            )?,
            sweep_interval: secs(&lookup, "SESSION_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            delivery_timeout: secs(&lookup, "DELIVERY_TIMEOUT_SECS", defaults.delivery_timeout)?,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let n: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })?;
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
            Ok(Duration::from_secs(n))
        }
        None => Ok(default),
    }
}
