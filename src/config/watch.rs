use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Listener dispatch configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Number of worker threads running subscriber callbacks
    ///
    /// Events for one subscribed path always land on the same worker, so a
    /// larger pool only helps when many paths are watched. A slow callback
    /// delays the other paths hashed onto its worker.
    ///
    /// **Default**: 2
    #[serde(default = "default_listener_pool_size")]
    pub listener_pool_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            listener_pool_size: default_listener_pool_size(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listener_pool_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.listener_pool_size must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_listener_pool_size() -> usize {
    2
}
