// src/config.rs
use std::fmt;
use std::net::IpAddr;

/// Runtime settings, read once at startup from the environment (and `.env`).
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub bootstrap_admin: Option<(String, String)>,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::Invalid { key, value } => write!(f, "{key} has an invalid value: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_max_connections", &self.database_max_connections)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cors_origin", &self.cors_origin)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let host = parse_or("HOST", lookup("HOST"), IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_or("PORT", lookup("PORT"), 3000u16)?;
        let database_max_connections =
            parse_or("DATABASE_MAX_CONNECTIONS", lookup("DATABASE_MAX_CONNECTIONS"), 10u32)?;

        let cors_origin = lookup("CORS_ORIGIN").filter(|v| !v.trim().is_empty());

        let bootstrap_admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        };

        Ok(Config {
            database_url,
            database_max_connections,
            jwt_secret,
            host,
            port,
            cors_origin,
            bootstrap_admin,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}
