//! Server configuration.
//!
//! | Variable                     | Meaning                                  | Default        |
//! |------------------------------|------------------------------------------|----------------|
//! | `FERRULE_ADDR`               | `host:port` to listen on                 | `0.0.0.0:3000` |
//! | `FERRULE_DRAIN_TIMEOUT_SECS` | grace period for in-flight connections   | `30`           |
//!
//! ```rust
//! use ferrule::ServerConfig;
//!
//! let config = ServerConfig::default();
//! assert_eq!(config.addr.port(), 3000);
//! ```

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

pub const ADDR_VAR: &str = "FERRULE_ADDR";
pub const DRAIN_TIMEOUT_VAR: &str = "FERRULE_DRAIN_TIMEOUT_SECS";

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);
const DEFAULT_DRAIN_SECS: u64 = 30;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// How long shutdown waits for in-flight connections before dropping them.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: SocketAddr::from(DEFAULT_ADDR), drain_timeout_secs: DEFAULT_DRAIN_SECS }
    }
}

impl ServerConfig {
    /// Reads the configuration from `FERRULE_*` environment variables.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when a variable is set but does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ADDR_VAR) {
            config.addr = raw.trim().parse()
                .map_err(|e| Error::Config(format!("{ADDR_VAR}={raw:?}: {e}")))?;
        }
        if let Some(raw) = lookup(DRAIN_TIMEOUT_VAR) {
            config.drain_timeout_secs = raw.trim().parse()
                .map_err(|e| Error::Config(format!("{DRAIN_TIMEOUT_VAR}={raw:?}: {e}")))?;
        }
        Ok(config)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
