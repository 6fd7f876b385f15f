use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::credentials::HashCost;

/// Placeholder secret used when none is configured. Fine for local use only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub hash_cost: HashCost,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MESSAGELY_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into());
        if jwt_secret.is_empty() {
            bail!("MESSAGELY_JWT_SECRET is set but empty");
        }
        if jwt_secret == DEV_JWT_SECRET {
            warn!("MESSAGELY_JWT_SECRET is unset; using the development placeholder");
        }

        let defaults = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: parse_or(&lookup, "MESSAGELY_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "MESSAGELY_HASH_ITERATIONS", defaults.iterations)?,
        };

        Ok(Self {
            jwt_secret,
            db_path: lookup("MESSAGELY_DB_PATH").unwrap_or_else(|| "messagely.db".into()),
            host: lookup("MESSAGELY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "MESSAGELY_PORT", 3000)?,
            hash_cost,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
