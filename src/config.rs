//! # Relay Configuration
//!
//! All knobs come from the environment and are read once in `main()`:
//!
//! - `PORT` - listening port (default 3000)
//! - `RELAY_BIND` - bind address (default 0.0.0.0 so LAN clients can reach us)
//! - `RELAY_PROCESS_NAME` - substring that identifies agent processes (default "opencode")
//! - `RELAY_SCAN_TIMEOUT_SECS` - socket-table scan deadline (default 5)
//! - `RELAY_PROXY_TIMEOUT_SECS` - upstream call deadline (default 30)
//!
//! Unset or unparsable values fall back to the defaults.

use std::net::IpAddr;
use std::time::Duration;

/// Runtime configuration. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: IpAddr,
    pub process_name: String,
    pub scan_timeout: Duration,
    pub proxy_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 3000),
            bind: env_parse("RELAY_BIND", IpAddr::from([0, 0, 0, 0])),
            process_name: std::env::var("RELAY_PROCESS_NAME")
                .unwrap_or_else(|_| "opencode".to_string()),
            scan_timeout: Duration::from_secs(env_parse("RELAY_SCAN_TIMEOUT_SECS", 5)),
            proxy_timeout: Duration::from_secs(env_parse("RELAY_PROXY_TIMEOUT_SECS", 30)),
        }
    }
}

/// Read an environment variable and parse it, falling back to `default`
/// when the variable is unset or does not parse.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
