use std::str::FromStr;

use tracing::{warn, Level};

use crate::infrastructure::auth::AuthConfig;
use crate::infrastructure::logging::LoggingConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
    pub admin_username: String,
    pub admin_password: String,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let auth = AuthConfig {
            jwt_secret: string("JWT_SECRET", defaults.auth.jwt_secret),
            refresh_token_secret: string(
                "REFRESH_TOKEN_SECRET",
                defaults.auth.refresh_token_secret,
            ),
            access_token_expiry: parse_or(
                &lookup,
                "ACCESS_TOKEN_EXPIRY_SECS",
                defaults.auth.access_token_expiry,
            ),
            refresh_token_expiry: parse_or(
                &lookup,
                "REFRESH_TOKEN_EXPIRY_SECS",
                defaults.auth.refresh_token_expiry,
            ),
            max_failed_attempts: parse_or(
                &lookup,
                "MAX_FAILED_LOGIN_ATTEMPTS",
                defaults.auth.max_failed_attempts,
            ),
            lockout_duration_minutes: parse_or(
                &lookup,
                "LOCKOUT_DURATION_MINUTES",
                defaults.auth.lockout_duration_minutes,
            ),
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_allowed_origins);

        let logging = LoggingConfig {
            log_dir: string("LOG_DIR", defaults.logging.log_dir),
            log_level: parse_or(&lookup, "LOG_LEVEL", defaults.logging.log_level),
            enable_file: parse_or(&lookup, "LOG_TO_FILE", defaults.logging.enable_file),
            ..defaults.logging
        };

        Self {
            host: string("BANKING_HOST", defaults.host),
            port: parse_or(&lookup, "BANKING_PORT", defaults.port),
            auth,
            cors_allowed_origins,
            admin_username: string("ADMIN_USERNAME", defaults.admin_username),
            admin_password: string("ADMIN_PASSWORD", defaults.admin_password),
            logging,
        }
    }

    /// Names of the secret settings that still hold their built-in defaults.
    pub fn default_credentials_in_use(&self) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut keys = Vec::new();
        if self.auth.jwt_secret == defaults.auth.jwt_secret {
            keys.push("JWT_SECRET");
        }
        if self.auth.refresh_token_secret == defaults.auth.refresh_token_secret {
            keys.push("REFRESH_TOKEN_SECRET");
        }
        if self.admin_password == defaults.admin_password {
            keys.push("ADMIN_PASSWORD");
        }
        keys
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            auth: AuthConfig::default(),
            cors_allowed_origins: Vec::new(),
            admin_username: "admin".to_string(),
            admin_password: "change-me-please".to_string(),
            logging: LoggingConfig {
                log_level: Level::INFO,
                ..LoggingConfig::default()
            },
        }
    }
}
