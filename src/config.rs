// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CATEGORY_CACHE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_JWT_EXPIRATION_HOURS: i64 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Brak wymaganej zmiennej środowiskowej {0}")]
    Missing(&'static str),

    #[error("Nieprawidłowa wartość zmiennej {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Konfiguracja serwera wczytywana ze zmiennych środowiskowych (.env przez dotenvy)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_timeout: Duration,
    pub category_cache_ttl: Duration,
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Wersja przyjmująca dowolne źródło zmiennych (ułatwia testy)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_hours: parse_or(
                &lookup,
                "JWT_EXPIRATION_HOURS",
                DEFAULT_JWT_EXPIRATION_HOURS,
            )?,
            port: parse_or(&lookup, "SERVER_PORT", DEFAULT_PORT)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            db_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_TIMEOUT_SECS",
                DEFAULT_DB_TIMEOUT_SECS,
            )?),
            category_cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CATEGORY_CACHE_TTL_SECS",
                DEFAULT_CATEGORY_CACHE_TTL_SECS,
            )?),
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
                name,
                value: raw.clone(),
            })
        }
        _ => Ok(default),
    }
}
