//! Runtime configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Which clock the runtime runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    /// Real time; sleeping parks the executor thread.
    #[default]
    Wall,
    /// Deterministic time that jumps to the next timer when nothing is runnable.
    Virtual,
}

impl FromStr for ClockKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wall" | "real" => Ok(Self::Wall),
            "virtual" | "lab" => Ok(Self::Virtual),
            _ => Err(ConfigError::InvalidValue {
                name: "clock".to_string(),
                value: value.to_string(),
                expected: "wall or virtual",
            }),
        }
    }
}

/// Failure to assemble a configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A setting holds a value that cannot be parsed.
    #[error("invalid value for {name}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Setting or environment variable name.
        name: String,
        /// The rejected value.
        value: String,
        /// What would have been accepted.
        expected: &'static str,
    },
    /// A config file could not be read.
    #[error("failed to read config file {path}: {reason}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
    /// A config file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        Self::new(ErrorKind::Config)
            .with_message(message)
            .with_source(err)
    }
}

/// Settings for a [`Runtime`](super::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Clock source.
    pub clock: ClockKind,
    /// Maximum number of job polls before the executor gives up.
    ///
    /// `None` means unbounded.
    pub max_steps: Option<u64>,
    /// Longest single park while waiting for foreign wakeups or timers.
    pub idle_park: Duration,
}

impl RuntimeConfig {
    /// Default park slice for the wall clock.
    pub const DEFAULT_IDLE_PARK: Duration = Duration::from_millis(50);

    /// Clamps settings into usable ranges.
    pub fn normalize(&mut self) {
        if self.idle_park.is_zero() {
            self.idle_park = Duration::from_millis(1);
        }
        if self.max_steps == Some(0) {
            self.max_steps = None;
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock: ClockKind::Wall,
            max_steps: None,
            idle_park: Self::DEFAULT_IDLE_PARK,
        }
    }
}
