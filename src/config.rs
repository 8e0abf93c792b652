//! Engine configuration loaded from environment variables
//!
//! Everything is optional except the Postgres URL in production; defaults
//! target local development. A notary section that is enabled but invalid
//! does not abort startup: the engine degrades to skipped notarization
//! with a warning. The external ledger is an audit trail, not a
//! correctness dependency.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HTTP server bind settings
    pub server: ServerConfig,
    /// PostgreSQL settings
    pub database: DatabaseConfig,
    /// External notarization service settings
    pub notary: NotaryConfig,
    /// Point amounts and yield parameters
    pub economy: EconomyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Connection pool size
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Submit instructions to the external notarization service.
    /// When false every instruction short-circuits to "skipped".
    pub enabled: bool,
    /// Notarization service base URL (https)
    pub endpoint: String,
    /// API key sent with every instruction
    pub api_key: String,
    /// Timeout for one notarization HTTP call, in milliseconds
    pub call_timeout_ms: u64,
    /// How long a synchronous caller races the notarization before
    /// reporting "not confirmed", in milliseconds
    pub race_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Points credited at registration
    pub welcome_bonus: i64,
    /// Points credited to the referrer when their code is used
    pub referral_reward: i64,
    /// Fixed daily login bonus
    pub daily_login_bonus: i64,
    /// AUM units per base yield point (floor division)
    pub yield_divisor: i64,
    /// Wealth service URL for AUM reads (empty disables the yield part
    /// of the daily claim)
    pub wealth_service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8090,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/scrip".to_string(),
                max_connections: 10,
            },
            notary: NotaryConfig {
                enabled: false,
                endpoint: String::new(),
                api_key: String::new(),
                call_timeout_ms: 10_000,
                race_timeout_ms: 3_000,
            },
            economy: EconomyConfig {
                welcome_bonus: 100,
                referral_reward: 50,
                daily_login_bonus: 10,
                yield_divisor: 500_000,
                wealth_service_url: String::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from `SCRIP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("SCRIP_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("SCRIP_PORT") {
            config.server.port = port.parse().context("Invalid SCRIP_PORT value")?;
        }

        if let Ok(url) = env::var("SCRIP_POSTGRES_URL") {
            config.database.postgres_url = url;
        }

        if let Ok(max) = env::var("SCRIP_DB_MAX_CONNECTIONS") {
            config.database.max_connections = max
                .parse()
                .context("Invalid SCRIP_DB_MAX_CONNECTIONS value")?;
        }

        if let Ok(enabled) = env::var("SCRIP_NOTARY_ENABLED") {
            config.notary.enabled = enabled
                .parse()
                .context("Invalid SCRIP_NOTARY_ENABLED value")?;
        }

        if let Ok(endpoint) = env::var("SCRIP_NOTARY_ENDPOINT") {
            config.notary.endpoint = endpoint;
        }

        if let Ok(api_key) = env::var("SCRIP_NOTARY_API_KEY") {
            config.notary.api_key = api_key;
        }

        if let Ok(timeout) = env::var("SCRIP_NOTARY_CALL_TIMEOUT_MS") {
            config.notary.call_timeout_ms = timeout
                .parse()
                .context("Invalid SCRIP_NOTARY_CALL_TIMEOUT_MS value")?;
        }

        if let Ok(timeout) = env::var("SCRIP_NOTARY_RACE_TIMEOUT_MS") {
            config.notary.race_timeout_ms = timeout
                .parse()
                .context("Invalid SCRIP_NOTARY_RACE_TIMEOUT_MS value")?;
        }

        if let Ok(bonus) = env::var("SCRIP_WELCOME_BONUS") {
            config.economy.welcome_bonus =
                bonus.parse().context("Invalid SCRIP_WELCOME_BONUS value")?;
        }

        if let Ok(reward) = env::var("SCRIP_REFERRAL_REWARD") {
            config.economy.referral_reward = reward
                .parse()
                .context("Invalid SCRIP_REFERRAL_REWARD value")?;
        }

        if let Ok(bonus) = env::var("SCRIP_DAILY_LOGIN_BONUS") {
            config.economy.daily_login_bonus = bonus
                .parse()
                .context("Invalid SCRIP_DAILY_LOGIN_BONUS value")?;
        }

        if let Ok(divisor) = env::var("SCRIP_YIELD_DIVISOR") {
            config.economy.yield_divisor = divisor
                .parse()
                .context("Invalid SCRIP_YIELD_DIVISOR value")?;
        }

        if let Ok(url) = env::var("SCRIP_WEALTH_SERVICE_URL") {
            config.economy.wealth_service_url = url;
        }

        if let Ok(level) = env::var("SCRIP_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency.
    ///
    /// A broken notary section is downgraded to `enabled = false` with a
    /// warning instead of failing startup.
    fn validate(&mut self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!("PostgreSQL URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Database pool size must be non-zero"));
        }

        if self.economy.yield_divisor <= 0 {
            return Err(anyhow::anyhow!(
                "Yield divisor must be positive, got {}",
                self.economy.yield_divisor
            ));
        }

        if self.economy.welcome_bonus < 0
            || self.economy.referral_reward < 0
            || self.economy.daily_login_bonus < 0
        {
            return Err(anyhow::anyhow!("Economy amounts cannot be negative"));
        }

        if self.notary.enabled && !self.notary_endpoint_is_usable() {
            warn!(
                endpoint = %self.notary.endpoint,
                "Notary endpoint missing or invalid, notarization disabled"
            );
            self.notary.enabled = false;
        }

        Ok(())
    }

    fn notary_endpoint_is_usable(&self) -> bool {
        if self.notary.endpoint.is_empty() {
            return false;
        }
        match Url::parse(&self.notary.endpoint) {
            Ok(url) => matches!(url.scheme(), "http" | "https"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.notary.enabled);
    }

    #[test]
    fn test_misconfigured_notary_degrades_to_disabled() {
        let mut config = EngineConfig::default();
        config.notary.enabled = true;
        config.notary.endpoint = String::new();

        assert!(config.validate().is_ok());
        assert!(!config.notary.enabled);
    }

    #[test]
    fn test_garbage_notary_endpoint_degrades_to_disabled() {
        let mut config = EngineConfig::default();
        config.notary.enabled = true;
        config.notary.endpoint = "not a url".to_string();

        assert!(config.validate().is_ok());
        assert!(!config.notary.enabled);
    }

    #[test]
    fn test_valid_notary_endpoint_stays_enabled() {
        let mut config = EngineConfig::default();
        config.notary.enabled = true;
        config.notary.endpoint = "https://notary.example.com/v1".to_string();

        assert!(config.validate().is_ok());
        assert!(config.notary.enabled);
    }

    #[test]
    fn test_zero_divisor_is_rejected() {
        let mut config = EngineConfig::default();
        config.economy.yield_divisor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_economy_amount_is_rejected() {
        let mut config = EngineConfig::default();
        config.economy.welcome_bonus = -5;
        assert!(config.validate().is_err());
    }
}
