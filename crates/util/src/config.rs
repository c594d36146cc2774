use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{database_url, non_empty_var, server_bind_address};

const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
const DEVELOPMENT_SESSION_SECRET: &str = "payboard-development-session-secret";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` for production deployments.
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Signing material and lifetime for operator sessions.
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: Vec<u8>,
    pub ttl: Duration,
    /// Set when no `SESSION_SECRET` was provided and the built-in development
    /// secret is in use.
    pub fallback_secret: bool,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("fallback_secret", &self.fallback_secret)
            .finish()
    }
}

/// Operator account created at startup when `ADMIN_EMAIL` and `ADMIN_PASSWORD` are set.
#[derive(Clone)]
pub struct BootstrapOperator {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapOperator")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub session: SessionConfig,
    pub bootstrap_operator: Option<BootstrapOperator>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            session: session_config(environment)?,
            bootstrap_operator: bootstrap_operator()?,
        })
    }
}

fn session_config(environment: Environment) -> Result<SessionConfig, ConfigError> {
    let ttl_secs = match non_empty_var("SESSION_TTL_SECS") {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidSessionTtl(raw))?,
        None => DEFAULT_SESSION_TTL_SECS,
    };

    let (secret, fallback_secret) = match non_empty_var("SESSION_SECRET") {
        Some(secret) => (secret.into_bytes(), false),
        None if environment.is_production() => return Err(ConfigError::MissingSessionSecret),
        None => (DEVELOPMENT_SESSION_SECRET.as_bytes().to_vec(), true),
    };

    Ok(SessionConfig {
        secret,
        ttl: Duration::from_secs(ttl_secs),
        fallback_secret,
    })
}

fn bootstrap_operator() -> Result<Option<BootstrapOperator>, ConfigError> {
    match (non_empty_var("ADMIN_EMAIL"), non_empty_var("ADMIN_PASSWORD")) {
        (Some(email), Some(password)) => Ok(Some(BootstrapOperator {
            name: non_empty_var("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            email,
            password,
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::IncompleteBootstrapOperator),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingSessionSecret,
    InvalidSessionTtl(String),
    IncompleteBootstrapOperator,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingSessionSecret => {
                write!(f, "SESSION_SECRET must be set when APP_ENV=production")
            }
            Self::InvalidSessionTtl(value) => write!(
                f,
                "SESSION_TTL_SECS must be a positive number of seconds (got {value})"
            ),
            Self::IncompleteBootstrapOperator => write!(
                f,
                "ADMIN_EMAIL and ADMIN_PASSWORD must be provided together"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
