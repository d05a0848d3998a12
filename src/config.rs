use crate::error::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:voteino.db";
const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
const DEFAULT_BAUD_RATE: u32 = 115200;
const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
const DEFAULT_MIN_TALLIES: usize = 5;
const DEFAULT_REFRESH_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind: String,
    pub serial_port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub min_tallies: usize,
    pub legacy_placeholder: bool,
    pub refresh_poll_id: Option<i64>,
    pub refresh_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let refresh_poll_id: Option<i64> = match lookup("VOTEINO_REFRESH_POLL_ID") {
            Some(raw) if !raw.trim().is_empty() => {
                Some(parse_value("VOTEINO_REFRESH_POLL_ID", &raw)?)
            }
            _ => None,
        };

        let refresh_secs: u64 = parse_or(&lookup, "VOTEINO_REFRESH_SECS", DEFAULT_REFRESH_SECS)?;
        if refresh_secs == 0 {
            return Err(Error::Config("VOTEINO_REFRESH_SECS must be > 0".to_string()));
        }

        Ok(Self {
            database_url: string_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind: string_or("VOTEINO_BIND", DEFAULT_BIND),
            serial_port: string_or("VOTEINO_SERIAL_PORT", DEFAULT_SERIAL_PORT),
            baud_rate: parse_or(&lookup, "VOTEINO_BAUD_RATE", DEFAULT_BAUD_RATE)?,
            read_timeout: Duration::from_millis(parse_or(
                &lookup,
                "VOTEINO_READ_TIMEOUT_MS",
                DEFAULT_READ_TIMEOUT_MS,
            )?),
            min_tallies: parse_or(&lookup, "VOTEINO_MIN_TALLIES", DEFAULT_MIN_TALLIES)?,
            legacy_placeholder: match lookup("VOTEINO_LEGACY_PLACEHOLDER") {
                Some(raw) => parse_bool("VOTEINO_LEGACY_PLACEHOLDER", &raw)?,
                None => false,
            },
            refresh_poll_id,
            refresh_interval: Duration::from_secs(refresh_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(Error::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}
