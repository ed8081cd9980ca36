//! Process configuration loaded once at startup.
//!
//! # Responsibility
//! - Read secrets and connection parameters from the process environment.
//! - Fail at boot, listing every missing value at once.
//!
//! # Invariants
//! - The field-encryption secret and the CSRF secret are distinct.
//! - Secrets never appear in `Debug` output.

use crate::logging::default_log_level;
use crate::security::session::DEFAULT_MAX_SESSIONS;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_FIELD_SECRET: &str = "TASKVAULT_FIELD_SECRET";
pub const ENV_CSRF_SECRET: &str = "TASKVAULT_CSRF_SECRET";
pub const ENV_DB_PATH: &str = "TASKVAULT_DB_PATH";
pub const ENV_KEYCLOAK_URL: &str = "KEYCLOAK_URL";
pub const ENV_KEYCLOAK_REALM: &str = "KEYCLOAK_REALM";
pub const ENV_KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
pub const ENV_KEYCLOAK_CLIENT_SECRET: &str = "KEYCLOAK_CLIENT_SECRET";
pub const ENV_RUNTIME: &str = "TASKVAULT_ENV";
pub const ENV_LOG_LEVEL: &str = "TASKVAULT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKVAULT_LOG_DIR";
pub const ENV_SESSION_IDLE_SECS: &str = "TASKVAULT_SESSION_IDLE_SECS";
pub const ENV_SESSION_MAX: &str = "TASKVAULT_SESSION_MAX";

const REQUIRED_VARS: &[&str] = &[
    ENV_FIELD_SECRET,
    ENV_CSRF_SECRET,
    ENV_KEYCLOAK_URL,
    ENV_KEYCLOAK_REALM,
    ENV_KEYCLOAK_CLIENT_ID,
    ENV_KEYCLOAK_CLIENT_SECRET,
    ENV_DB_PATH,
];

/// Secret value with redacted `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Configuration failures. All are fatal at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(Vec<&'static str>),
    /// Field and CSRF secrets must be independent.
    SharedSecret,
    Invalid { name: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(names) => write!(
                f,
                "missing required environment variables: {}",
                names.join(", ")
            ),
            Self::SharedSecret => write!(
                f,
                "{ENV_FIELD_SECRET} and {ENV_CSRF_SECRET} must hold different values"
            ),
            Self::Invalid { name, message } => write!(f, "invalid value for {name}: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Identity-provider connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: Secret,
}

impl IdentityProviderConfig {
    /// Issuer URL expected in verified tokens.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.url.trim_end_matches('/'), self.realm)
    }
}

/// Explicit startup configuration passed into component constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub field_secret: Secret,
    pub csrf_secret: Secret,
    pub identity_provider: IdentityProviderConfig,
    pub db_path: PathBuf,
    /// Adds `Secure` to cookies.
    pub production: bool,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub session_idle_timeout: Option<Duration>,
    /// Upper bound on live sessions held in memory.
    pub max_sessions: usize,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| read(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |name: &'static str| read(name).ok_or(ConfigError::Missing(vec![name]));

        let field_secret = Secret::new(required(ENV_FIELD_SECRET)?);
        let csrf_secret = Secret::new(required(ENV_CSRF_SECRET)?);
        if field_secret == csrf_secret {
            return Err(ConfigError::SharedSecret);
        }

        let session_idle_timeout = read(ENV_SESSION_IDLE_SECS)
            .map(|raw| parse_number::<u64>(ENV_SESSION_IDLE_SECS, &raw))
            .transpose()?
            .map(Duration::from_secs);
        let max_sessions = read(ENV_SESSION_MAX)
            .map(|raw| parse_number::<usize>(ENV_SESSION_MAX, &raw))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_SESSIONS);
        if max_sessions == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_SESSION_MAX,
                message: "must be at least 1".to_string(),
            });
        }

        let log_dir = read(ENV_LOG_DIR).map(PathBuf::from);
        if let Some(dir) = log_dir.as_ref() {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    name: ENV_LOG_DIR,
                    message: format!("`{}` is not an absolute path", dir.display()),
                });
            }
        }

        Ok(Self {
            field_secret,
            csrf_secret,
            identity_provider: IdentityProviderConfig {
                url: required(ENV_KEYCLOAK_URL)?,
                realm: required(ENV_KEYCLOAK_REALM)?,
                client_id: required(ENV_KEYCLOAK_CLIENT_ID)?,
                client_secret: Secret::new(required(ENV_KEYCLOAK_CLIENT_SECRET)?),
            },
            db_path: PathBuf::from(required(ENV_DB_PATH)?),
            production: read(ENV_RUNTIME)
                .is_some_and(|env| env.eq_ignore_ascii_case("production")),
            log_level: read(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string()),
            log_dir,
            session_idle_timeout,
            max_sessions,
        })
    }
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|err| ConfigError::Invalid {
        name,
        message: err.to_string(),
    })
}
