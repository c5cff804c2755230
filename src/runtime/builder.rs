//! Runtime builder.

use std::time::Duration;

use super::config::{ClockKind, RuntimeConfig};
use super::env_config;
use super::Runtime;
use crate::error::{Error, ResultExt};

/// Builder for constructing a runtime with custom configuration.
///
/// Values set through builder methods always win over the environment and
/// config files.
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    clock: Option<ClockKind>,
    max_steps: Option<Option<u64>>,
    idle_park: Option<Duration>,
    read_env: bool,
    #[cfg(feature = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder that also reads `CORRAL_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            read_env: true,
            ..Self::default()
        }
    }

    /// A builder preset for deterministic tests: virtual clock.
    #[must_use]
    pub fn virtual_time() -> Self {
        Self::new().clock(ClockKind::Virtual)
    }

    /// Set the clock source.
    #[must_use]
    pub fn clock(mut self, clock: ClockKind) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the poll-step limit (`None` = unbounded).
    #[must_use]
    pub fn max_steps(mut self, steps: Option<u64>) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Set the longest single park while idle.
    #[must_use]
    pub fn idle_park(mut self, park: Duration) -> Self {
        self.idle_park = Some(park);
        self
    }

    /// Load settings from a TOML file before applying overrides.
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Resolve the final configuration without building a runtime.
    pub fn resolve(&self) -> Result<RuntimeConfig, Error> {
        let mut config = RuntimeConfig::default();
        #[cfg(feature = "config-file")]
        if let Some(path) = &self.config_file {
            let toml = env_config::parse_toml_file(path).context("runtime config file")?;
            env_config::apply_toml_config(&mut config, &toml).context("runtime config file")?;
        }
        if self.read_env {
            env_config::apply_env_overrides(&mut config).context("environment overrides")?;
        }
        if let Some(clock) = self.clock {
            config.clock = clock;
        }
        if let Some(steps) = self.max_steps {
            config.max_steps = steps;
        }
        if let Some(park) = self.idle_park {
            config.idle_park = park;
        }
        config.normalize();
        Ok(config)
    }

    /// Build the runtime.
    pub fn build(self) -> Result<Runtime, Error> {
        let config = self.resolve()?;
        Ok(Runtime::with_config(config))
    }
}
