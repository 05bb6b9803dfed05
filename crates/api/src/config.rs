//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Payment gateway
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_webhook_secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.gateway.example".to_string()),
            gateway_api_key: env::var("GATEWAY_API_KEY")
                .map_err(|_| ConfigError::Missing("GATEWAY_API_KEY"))?,
            gateway_webhook_secret: {
                let secret = env::var("GATEWAY_WEBHOOK_SECRET")
                    .map_err(|_| ConfigError::Missing("GATEWAY_WEBHOOK_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::Invalid(
                        "GATEWAY_WEBHOOK_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        env::set_var("DATABASE_URL", "postgres://localhost/userlab_test");
        env::set_var("GATEWAY_API_KEY", "sk_test");
        env::set_var(
            "GATEWAY_WEBHOOK_SECRET",
            "a-webhook-secret-of-sufficient-length!!",
        );
    }

    #[test]
    #[serial]
    fn test_from_env_with_defaults() {
        set_required_vars();
        env::remove_var("BIND_ADDRESS");
        env::remove_var("DATABASE_MAX_CONNECTIONS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.database_max_connections, 20);
    }

    #[test]
    #[serial]
    fn test_short_webhook_secret_rejected() {
        set_required_vars();
        env::set_var("GATEWAY_WEBHOOK_SECRET", "too-short");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    #[serial]
    fn test_missing_database_url_is_named() {
        set_required_vars();
        env::remove_var("DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
