//! Dashboard configuration
//!
//! Everything the server, materializer and stream controller need is read
//! once at startup into `DashboardConfig` and handed down explicitly.

use crate::error::DashboardError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_AVAILABLE_CONDITION_TYPE: &str = "ClusterAvailable";
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = ocm_client::client::DEFAULT_WATCH_TIMEOUT_SECS;
pub const DEFAULT_STREAM_BUFFER_FRAMES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    /// HTTP listen address
    pub bind_address: SocketAddr,

    /// Idle time after which a stream writes a keepalive comment
    pub keepalive: Duration,

    /// Condition type whose status decides Online/Offline
    pub available_condition_type: String,

    /// Server-side timeout of each stream's watch
    pub watch_timeout_secs: u32,

    /// Frames a stream session may queue ahead of its HTTP body
    pub stream_buffer_frames: usize,

    /// Attach a permissive CORS layer (UI development)
    pub cors_allow_any: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            available_condition_type: DEFAULT_AVAILABLE_CONDITION_TYPE.to_string(),
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            stream_buffer_frames: DEFAULT_STREAM_BUFFER_FRAMES,
            cors_allow_any: false,
        }
    }
}

impl DashboardConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DashboardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DashboardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address: SocketAddr = parse_or(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS.parse().ok())?;
        let keepalive_secs: u64 = parse_or(&lookup, "KEEPALIVE_SECS", Some(DEFAULT_KEEPALIVE_SECS))?;
        if keepalive_secs == 0 {
            return Err(DashboardError::Configuration(
                "KEEPALIVE_SECS must be greater than zero".to_string(),
            ));
        }
        let available_condition_type = lookup("AVAILABLE_CONDITION_TYPE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AVAILABLE_CONDITION_TYPE.to_string());
        let watch_timeout_secs: u32 = parse_or(&lookup, "WATCH_TIMEOUT_SECS", Some(DEFAULT_WATCH_TIMEOUT_SECS))?;
        let stream_buffer_frames: usize =
            parse_or(&lookup, "STREAM_BUFFER_FRAMES", Some(DEFAULT_STREAM_BUFFER_FRAMES))?;
        if stream_buffer_frames == 0 {
            return Err(DashboardError::Configuration(
                "STREAM_BUFFER_FRAMES must be greater than zero".to_string(),
            ));
        }
        let cors_allow_any = match lookup("CORS_ALLOW_ANY") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                DashboardError::Configuration(format!("CORS_ALLOW_ANY: not a boolean: {raw}"))
            })?,
            None => false,
        };

        Ok(Self {
            bind_address,
            keepalive: Duration::from_secs(keepalive_secs),
            available_condition_type,
            watch_timeout_secs,
            stream_buffer_frames,
            cors_allow_any,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, DashboardError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DashboardError::Configuration(format!("{key}: {e}: {raw}"))),
        None => default.ok_or_else(|| DashboardError::Configuration(format!("{key} is required"))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = DashboardConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.keepalive, Duration::from_secs(30));
        assert_eq!(config.available_condition_type, "ClusterAvailable");
    }

    #[test]
    fn test_overrides() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("KEEPALIVE_SECS", "5"),
            ("AVAILABLE_CONDITION_TYPE", "ManagedClusterConditionAvailable"),
            ("WATCH_TIMEOUT_SECS", "60"),
            ("STREAM_BUFFER_FRAMES", "4"),
            ("CORS_ALLOW_ANY", "true"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.keepalive, Duration::from_secs(5));
        assert_eq!(config.available_condition_type, "ManagedClusterConditionAvailable");
        assert_eq!(config.watch_timeout_secs, 60);
        assert_eq!(config.stream_buffer_frames, 4);
        assert!(config.cors_allow_any);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("BIND_ADDRESS", "not-an-address"),
            ("KEEPALIVE_SECS", "soon"),
            ("KEEPALIVE_SECS", "0"),
            ("STREAM_BUFFER_FRAMES", "0"),
            ("STREAM_BUFFER_FRAMES", "-1"),
            ("CORS_ALLOW_ANY", "maybe"),
        ] {
            let result = DashboardConfig::from_lookup(lookup_from(&[(key, value)]));
            assert!(
                matches!(result, Err(DashboardError::Configuration(_))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_blank_condition_type_falls_back() {
        let config =
            DashboardConfig::from_lookup(lookup_from(&[("AVAILABLE_CONDITION_TYPE", "  ")])).unwrap();
        assert_eq!(config.available_condition_type, DEFAULT_AVAILABLE_CONDITION_TYPE);
    }
}
