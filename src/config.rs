use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// AI tutor configuration: provider ordering plus per-provider credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Comma-separated default provider ordering, e.g. "google,gigachat"
    pub default_providers: String,
    pub google: GoogleConfig,
    pub gigachat: GigaChatConfig,
}

/// Google Gemini credentials and endpoint overrides
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Sber GigaChat credentials and endpoint overrides. The basic credential is
/// exchanged for a short-lived bearer token before every content call.
#[derive(Debug, Clone, Deserialize)]
pub struct GigaChatConfig {
    pub basic_auth: String,
    pub auth_url: String,
    pub base_url: String,
    pub model: String,
    pub scope: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            ai: AiConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            default_providers = %self.ai.default_providers,
            google_model = %self.ai.google.model,
            gigachat_model = %self.ai.gigachat.model,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.contains("sqlite:") && !self.database.url.contains("postgres://") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:' or 'postgres://'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.ai.google.api_key.is_empty() && self.ai.gigachat.basic_auth.is_empty() {
            warn!("No AI provider credentials configured - tutor features will return fallback answers");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_lowercase().as_str())
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:edunext.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl AiConfig {
    fn from_env() -> Result<Self> {
        let default_providers =
            env::var("DEFAULT_PROVIDERS").unwrap_or_else(|_| "google,gigachat".to_string());

        Ok(AiConfig {
            default_providers,
            google: GoogleConfig::from_env(),
            gigachat: GigaChatConfig::from_env(),
        })
    }
}

impl GoogleConfig {
    fn from_env() -> Self {
        GoogleConfig {
            api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
            model: env::var("GOOGLE_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            base_url: env::var("GOOGLE_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1".to_string()),
        }
    }
}

impl GigaChatConfig {
    fn from_env() -> Self {
        // Operators sometimes paste the credential with its scheme prefix
        let mut basic_auth = env::var("SBER_BASIC_AUTH").unwrap_or_default().trim().to_string();
        if basic_auth.to_lowercase().starts_with("basic ") {
            basic_auth = basic_auth[6..].trim().to_string();
        }

        GigaChatConfig {
            basic_auth,
            auth_url: env::var("GIGACHAT_AUTH_URL")
                .unwrap_or_else(|_| "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string()),
            base_url: env::var("GIGACHAT_BASE_URL")
                .unwrap_or_else(|_| "https://gigachat.devices.sberbank.ru/api/v1".to_string()),
            model: env::var("GIGACHAT_MODEL").unwrap_or_else(|_| "GigaChat".to_string()),
            scope: env::var("GIGACHAT_SCOPE").unwrap_or_else(|_| "GIGACHAT_API_PERS".to_string()),
        }
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,edunext=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:edunext.db"), "sqli***t.db");
    }

    #[test]
    fn test_gigachat_basic_auth_prefix_stripped() {
        unsafe { env::set_var("SBER_BASIC_AUTH", "Basic   c2VjcmV0"); }
        let config = GigaChatConfig::from_env();
        assert_eq!(config.basic_auth, "c2VjcmV0");

        unsafe { env::set_var("SBER_BASIC_AUTH", "c2VjcmV0"); }
        let config = GigaChatConfig::from_env();
        assert_eq!(config.basic_auth, "c2VjcmV0");

        unsafe { env::remove_var("SBER_BASIC_AUTH"); }
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            ai: AiConfig {
                default_providers: "google,gigachat".to_string(),
                google: GoogleConfig {
                    api_key: "test-key".to_string(),
                    model: "gemini-2.5-flash".to_string(),
                    base_url: "https://generativelanguage.googleapis.com/v1".to_string(),
                },
                gigachat: GigaChatConfig {
                    basic_auth: String::new(),
                    auth_url: "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string(),
                    base_url: "https://gigachat.devices.sberbank.ru/api/v1".to_string(),
                    model: "GigaChat".to_string(),
                    scope: "GIGACHAT_API_PERS".to_string(),
                },
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        };

        assert!(config.validate().is_ok());

        let mut invalid_config = config.clone();
        invalid_config.server.port = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config;
        invalid_config.database.url = "mysql://nope".to_string();
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_invalid_port_parsing() {
        unsafe { env::set_var("PORT", "not-a-number"); }
        let result = ServerConfig::from_env();
        assert!(result.is_err());

        unsafe { env::remove_var("PORT"); }
    }
}
