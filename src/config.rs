//! Configuration Module
//!
//! Settings for the admin server binary. The cache engine itself takes no
//! configuration; TTLs are chosen per call.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Admin server settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL for `PUT /set` requests that do not carry one
    pub default_ttl: Duration,
    /// Address the HTTP server binds to
    pub host: IpAddr,
    pub server_port: u16,
    /// Pause between expiry sweeps
    pub cleanup_interval: Duration,
}

impl Config {
    /// Loads settings from the environment.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL` - seconds (default: 300)
    /// - `SERVER_HOST` - bind address (default: 0.0.0.0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - seconds between sweeps (default: 1)
    ///
    /// Missing or unparsable values fall back to the default, as does a
    /// zero sweep interval.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: parse_secs("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            host: parse_var("SERVER_HOST").unwrap_or(defaults.host),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_secs("CLEANUP_INTERVAL")
                .filter(|interval| !interval.is_zero())
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.server_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: 3000,
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_secs(name: &str) -> Option<Duration> {
    parse_var(name).map(Duration::from_secs)
}
