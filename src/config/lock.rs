use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LockConfig {
    /// Name prefix of the ephemeral-sequential queue nodes
    ///
    /// Nodes are created as `<lock_dir>/<node_prefix><10-digit sequence>`.
    /// Default: empty, giving names like `0000000001`
    #[serde(default)]
    pub node_prefix: String,
}

impl LockConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_prefix.contains('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock.node_prefix must not contain '/': {}",
                self.node_prefix
            ))));
        }
        Ok(())
    }
}
