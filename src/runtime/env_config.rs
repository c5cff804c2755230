//! Environment variable and config file support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods
//! 2. **Environment variables**: `CORRAL_*`
//! 3. **Config file**: a TOML file (requires the `config-file` feature)
//! 4. **Defaults**: [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `CORRAL_CLOCK` | `wall` / `virtual` | `clock` |
//! | `CORRAL_MAX_STEPS` | `u64` | `max_steps` |
//! | `CORRAL_IDLE_PARK_MS` | `u64` | `idle_park` |

use std::time::Duration;

use super::config::{ClockKind, ConfigError, RuntimeConfig};

/// Environment variable name for the clock source.
pub const ENV_CLOCK: &str = "CORRAL_CLOCK";
/// Environment variable name for the poll-step limit.
pub const ENV_MAX_STEPS: &str = "CORRAL_MAX_STEPS";
/// Environment variable name for the idle park slice in milliseconds.
pub const ENV_IDLE_PARK_MS: &str = "CORRAL_IDLE_PARK_MS";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set are applied.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_CLOCK) {
        config.clock = parse_clock(ENV_CLOCK, &val)?;
    }
    if let Some(val) = read_env(ENV_MAX_STEPS) {
        config.max_steps = Some(parse_u64(ENV_MAX_STEPS, &val)?);
    }
    if let Some(val) = read_env(ENV_IDLE_PARK_MS) {
        config.idle_park = Duration::from_millis(parse_u64(ENV_IDLE_PARK_MS, &val)?);
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            name: var_name.to_string(),
            value: val.to_string(),
            expected: "unsigned integer",
        })
}

fn parse_clock(var_name: &str, val: &str) -> Result<ClockKind, ConfigError> {
    val.parse::<ClockKind>()
        .map_err(|_| ConfigError::InvalidValue {
            name: var_name.to_string(),
            value: val.to_string(),
            expected: "wall or virtual",
        })
}

/// TOML-deserializable runtime configuration.
///
/// ```toml
/// clock = "virtual"
/// max_steps = 100000
/// idle_park_ms = 20
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct RuntimeTomlConfig {
    /// Clock source.
    pub clock: Option<String>,
    /// Poll-step limit.
    pub max_steps: Option<u64>,
    /// Idle park slice in milliseconds.
    pub idle_park_ms: Option<u64>,
}

/// Apply a parsed TOML config to a [`RuntimeConfig`].
#[cfg(feature = "config-file")]
pub fn apply_toml_config(
    config: &mut RuntimeConfig,
    toml: &RuntimeTomlConfig,
) -> Result<(), ConfigError> {
    if let Some(clock) = &toml.clock {
        config.clock = parse_clock("clock", clock)?;
    }
    if let Some(steps) = toml.max_steps {
        config.max_steps = Some(steps);
    }
    if let Some(ms) = toml.idle_park_ms {
        config.idle_park = Duration::from_millis(ms);
    }
    Ok(())
}

/// Parse a TOML string into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<RuntimeTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a TOML file into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<RuntimeTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        for var in [ENV_CLOCK, ENV_MAX_STEPS, ENV_IDLE_PARK_MS] {
            std::env::remove_var(var);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
        result
    }

    #[test]
    fn parse_u64_accepts_whitespace() {
        assert_eq!(parse_u64("TEST", " 42 ").ok(), Some(42));
        assert!(parse_u64("TEST", "-1").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let config = with_envs(
            &[
                (ENV_CLOCK, "virtual"),
                (ENV_MAX_STEPS, "500"),
                (ENV_IDLE_PARK_MS, "3"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).map(|()| config)
            },
        )
        .expect("env overrides failed");
        assert_eq!(config.clock, ClockKind::Virtual);
        assert_eq!(config.max_steps, Some(500));
        assert_eq!(config.idle_park, Duration::from_millis(3));
    }

    #[test]
    fn unset_env_leaves_defaults() {
        let config = with_envs(&[], || {
            let mut config = RuntimeConfig::default();
            apply_env_overrides(&mut config).map(|()| config)
        })
        .expect("env overrides failed");
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn invalid_env_value_names_the_variable() {
        let err = with_envs(&[(ENV_MAX_STEPS, "many")], || {
            apply_env_overrides(&mut RuntimeConfig::default())
        })
        .expect_err("expected parse failure");
        assert!(err.to_string().contains(ENV_MAX_STEPS));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_config_applies_present_fields() {
        let toml = parse_toml_str("clock = \"virtual\"\nmax_steps = 9\n").expect("parse");
        let mut config = RuntimeConfig::default();
        apply_toml_config(&mut config, &toml).expect("apply");
        assert_eq!(config.clock, ClockKind::Virtual);
        assert_eq!(config.max_steps, Some(9));
        assert_eq!(config.idle_park, RuntimeConfig::DEFAULT_IDLE_PARK);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(parse_toml_str("workers = 4").is_err());
    }
}
