use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_CURRENCY_API_URL: &str = "https://api.frankfurter.app/latest";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(
    name = "divebook",
    version,
    about = "Booking site server for diving courses, trips and packages"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Base URL of the booking REST API.
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    #[arg(long, value_name = "URL")]
    pub currency_api_url: Option<String>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub api_url: String,
    pub currency_api_url: String,
    pub request_timeout: Duration,
    pub cookie_ttl: Duration,
    pub secure_cookies: bool,
    pub navigation_timeout: Duration,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid boolean value for env var {key}: {value}")]
    InvalidEnvBool { key: String, value: String },
    #[error("invalid duration for {key}: {value}")]
    InvalidDuration { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    EmptyUrl { key: &'static str },
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    api_url: Option<String>,
    currency_api_url: Option<String>,
    request_timeout: Option<String>,
    cookie_ttl: Option<String>,
    secure_cookies: Option<bool>,
    navigation_timeout: Option<String>,
    max_upload_bytes: Option<usize>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;

        let bind = cli
            .bind
            .or(from_file.bind)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));
        let api_url = read_api_url_env()
            .or(cli.api_url)
            .or(from_file.api_url)
            .unwrap_or_else(|| String::from(DEFAULT_API_URL));
        let api_url = normalize_url("api_url", &api_url)?;
        let currency_api_url = cli
            .currency_api_url
            .or(from_file.currency_api_url)
            .unwrap_or_else(|| String::from(DEFAULT_CURRENCY_API_URL));
        let currency_api_url = normalize_url("currency_api_url", &currency_api_url)?;

        let request_timeout =
            parse_duration_value("request_timeout", from_file.request_timeout.as_deref(), "30s")?;
        let cookie_ttl = parse_duration_value("cookie_ttl", from_file.cookie_ttl.as_deref(), "7d")?;
        let navigation_timeout = parse_duration_value(
            "navigation_timeout",
            from_file.navigation_timeout.as_deref(),
            "10s",
        )?;
        let secure_cookies = read_env_bool("DIVEBOOK_SECURE_COOKIES")?
            .or(from_file.secure_cookies)
            .unwrap_or(false);
        let max_upload_bytes = from_file
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
            .max(1024);

        Ok(Self {
            bind,
            api_url,
            currency_api_url,
            request_timeout,
            cookie_ttl,
            secure_cookies,
            navigation_timeout,
            max_upload_bytes,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// `DIVEBOOK_API_URL` wins; `NEXT_PUBLIC_API_URL` is honored so existing
/// deployments keep their environment.
fn read_api_url_env() -> Option<String> {
    ["DIVEBOOK_API_URL", "NEXT_PUBLIC_API_URL"]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn normalize_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyUrl { key });
    }
    Ok(trimmed.to_string())
}

fn parse_duration_value(
    key: &'static str,
    raw: Option<&str>,
    default: &str,
) -> Result<Duration, ConfigError> {
    let value = raw.unwrap_or(default).trim();
    humantime::parse_duration(value).map_err(|_| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    })
}

fn read_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => parse_bool_value(key, &value).map(Some),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from("<non-unicode>"),
        }),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{normalize_url, parse_bool_value, parse_duration_value, read_file_config};

    #[test]
    fn parse_bool_value_accepts_common_true_values() {
        assert_eq!(parse_bool_value("K", "true").ok(), Some(true));
        assert_eq!(parse_bool_value("K", "1").ok(), Some(true));
        assert_eq!(parse_bool_value("K", "YES").ok(), Some(true));
        assert_eq!(parse_bool_value("K", " on ").ok(), Some(true));
    }

    #[test]
    fn parse_bool_value_rejects_invalid_values() {
        assert!(parse_bool_value("K", "maybe").is_err());
    }

    #[test]
    fn durations_use_human_format_with_defaults() {
        assert_eq!(
            parse_duration_value("cookie_ttl", None, "7d").unwrap(),
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(
            parse_duration_value("navigation_timeout", Some(" 250ms "), "10s").unwrap(),
            Duration::from_millis(250)
        );
        assert!(parse_duration_value("request_timeout", Some("soon"), "30s").is_err());
    }

    #[test]
    fn urls_lose_trailing_slashes() {
        assert_eq!(
            normalize_url("api_url", "https://api.example.com/api/").unwrap(),
            "https://api.example.com/api"
        );
        assert!(normalize_url("api_url", "  / ").is_err());
    }

    #[test]
    fn file_config_reads_known_keys() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("divebook.toml");
        std::fs::write(
            &path,
            "api_url = \"https://backend.test/api\"\ncookie_ttl = \"12h\"\nsecure_cookies = true\n",
        )?;

        let parsed = read_file_config(Some(&path))?;

        assert_eq!(parsed.api_url.as_deref(), Some("https://backend.test/api"));
        assert_eq!(parsed.cookie_ttl.as_deref(), Some("12h"));
        assert_eq!(parsed.secure_cookies, Some(true));
        assert!(parsed.bind.is_none());
        Ok(())
    }

    #[test]
    fn file_config_rejects_unknown_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("divebook.toml");
        std::fs::write(&path, "secure_cookies = \"sometimes\"\n").unwrap();

        assert!(read_file_config(Some(&path)).is_err());
    }
}
