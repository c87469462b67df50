//! Configuration management for the coordination layer.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `CONFIG_PATH`
//! 3. Explicit override file ([`CoordinatorConfig::with_override_config`])
//! 4. Environment variables prefixed with `DCOORD__` (highest priority)

mod lock;
mod session;
mod watch;
pub use lock::*;
pub use session::*;
pub use watch::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "DCOORD";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CoordinatorConfig {
    /// Session connectivity parameters
    #[serde(default)]
    pub session: SessionConfig,
    /// Watch engine and listener dispatch parameters
    #[serde(default)]
    pub watch: WatchConfig,
    /// Distributed lock parameters
    #[serde(default)]
    pub lock: LockConfig,
}

impl CoordinatorConfig {
    /// Creates a new configuration with hierarchical override support:
    ///
    /// Configuration sources are merged in the following order (later sources
    /// override earlier ones):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable
    /// 3. Environment variables (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Call `validate()` once
    /// all overrides are applied.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    ///
    /// # Example
    /// ```ignore
    /// let cfg = CoordinatorConfig::new()?
    ///     .with_override_config("coord.toml")?
    ///     .validate()?;
    /// ```
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.session.validate()?;
        self.watch.validate()?;
        self.lock.validate()?;
        Ok(self)
    }
}
