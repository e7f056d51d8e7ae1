//! Client configuration
//!
//! Read once from the environment at startup and passed down explicitly.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Longitude of UTC+8 standard time
pub const DEFAULT_STANDARD_MERIDIAN: f64 = 120.0;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway base address, e.g. `http://127.0.0.1:8000/api`
    pub api_base: String,
    pub request_timeout: Duration,
    pub db_path: PathBuf,
    /// Ask the service for true-solar-time correction on BaZi charts
    pub use_true_solar_time: bool,
    pub standard_meridian: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: api_base(DEFAULT_HOST, DEFAULT_PORT),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            db_path: PathBuf::from("/tmp/zhouyi/sessions.db"),
            use_true_solar_time: true,
            standard_meridian: DEFAULT_STANDARD_MERIDIAN,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` is the production caller.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup("ZHOUYI_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                let host = lookup("ZHOUYI_API_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
                let port = lookup("ZHOUYI_API_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_PORT);
                api_base(&host, port)
            });

        let request_timeout = Duration::from_secs(
            lookup("ZHOUYI_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let db_path = lookup("ZHOUYI_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.zhouyi/sessions.db"))
            },
            PathBuf::from,
        );

        let use_true_solar_time = lookup("ZHOUYI_TRUE_SOLAR_TIME")
            .map_or(true, |v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"));

        let standard_meridian = lookup("ZHOUYI_STANDARD_MERIDIAN")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_STANDARD_MERIDIAN);

        Self {
            api_base,
            request_timeout,
            db_path,
            use_true_solar_time,
            standard_meridian,
        }
    }
}

fn api_base(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/api")
}
