use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::constants::DATABASE_FILE;

/// Get durable state directory from environment variable or use default
pub fn get_data_dir() -> PathBuf {
    std::env::var("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// SQLite database path (`DATABASE_PATH`, defaults to `$DATA_DIR/market.db`)
pub fn get_database_path() -> PathBuf {
    std::env::var("DATABASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| get_data_dir().join(DATABASE_FILE))
}

/// Read a parseable environment value, falling back to `default` when unset or invalid
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, default = %default, "Invalid config value, using default");
                default
            }
        },
        _ => default,
    }
}

/// Read a boolean flag ("1", "true", "yes", "on" are truthy)
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            "" => default,
            other => {
                warn!(key = key, value = other, default = default, "Invalid boolean flag, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a comma-separated list
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Sanitize proxy URL for logging (removes credentials)
pub fn sanitize_proxy_url(proxy_url: &str) -> String {
    match reqwest::Url::parse(proxy_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("unknown");
            let port = url.port().map_or(String::new(), |p| format!(":{}", p));
            format!("{}://{}{}", url.scheme(), host, port)
        }
        Err(_) => {
            if let Some(at_pos) = proxy_url.rfind('@') {
                if let Some(scheme_end) = proxy_url.find("://") {
                    let scheme = &proxy_url[..scheme_end + 3];
                    format!("{}***@{}", scheme, &proxy_url[at_pos + 1..])
                } else {
                    format!("***@{}", &proxy_url[at_pos + 1..])
                }
            } else {
                proxy_url.to_string()
            }
        }
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
