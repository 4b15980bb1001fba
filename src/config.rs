//! Rig configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `chamber.toml` (or any file passed to [`RigConfig::from_path`])
//! 2. Environment variables prefixed with `CHAMBER_`, highest precedence
//!
//! Every section has defaults matching the chamber rig, so an empty or missing file is a
//! valid configuration.
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! CHAMBER_ANALYSER__HOST=10.0.0.5
//! CHAMBER_ROTATOR__PORT=/dev/ttyUSB1
//! CHAMBER_POLLING__TIMEOUT="30s"
//! CHAMBER_LOG_LEVEL=debug
//! ```
//!
//! # Example file
//!
//! ```toml
//! log_level = "info"
//!
//! [analyser]
//! host = "192.168.20.200"
//! port = 23
//! start_freq_hz = 4.0e8
//! stop_freq_hz = 3.0e9
//! display_format = "MLOG"
//!
//! [rotator]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [polling]
//! interval = "50ms"
//! timeout = "2m"
//!
//! [retry]
//! max_retries = 5
//! backoff = "10ms"
//! ```

use crate::error::{ChamberError, ChamberResult};
use crate::hardware::analyser::AnalyserSettings;
use crate::hardware::polling::{PollPolicy, RetryPolicy};
use crate::hardware::rotator::RotatorSettings;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chamber.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "CHAMBER_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level rig configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Network analyser address and initial configuration
    pub analyser: AnalyserSettings,
    /// Turntable serial line and motion profile
    pub rotator: RotatorSettings,
    /// Completion and acknowledgement waits
    pub polling: PollPolicy,
    /// Short-write retries
    pub retry: RetryPolicy,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            analyser: AnalyserSettings::default(),
            rotator: RotatorSettings::default(),
            polling: PollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RigConfig {
    /// Load `chamber.toml` and environment overrides.
    ///
    /// # Errors
    /// [`ChamberError::Config`] if a source cannot be parsed, or
    /// [`ChamberError::ConfigValidation`] if the merged values are unusable.
    pub fn load() -> ChamberResult<Self> {
        Self::from_path(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults fill every key it would have set.
    pub fn from_path<P: AsRef<Path>>(path: P) -> ChamberResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values that no session could be opened with.
    ///
    /// Out-of-range instrument parameters (frequencies, power and so on) are not errors
    /// here; the sessions clamp them.
    pub fn validate(&self) -> ChamberResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ChamberError::ConfigValidation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let analyser = &self.analyser;
        if analyser.host.trim().is_empty() {
            return Err(ChamberError::ConfigValidation(
                "analyser.host must not be empty".to_string(),
            ));
        }
        if analyser.port == 0 {
            return Err(ChamberError::ConfigValidation(
                "analyser.port must be non-zero".to_string(),
            ));
        }
        if analyser.start_freq_hz > analyser.stop_freq_hz {
            return Err(ChamberError::ConfigValidation(format!(
                "analyser.start_freq_hz ({}) is above stop_freq_hz ({})",
                analyser.start_freq_hz, analyser.stop_freq_hz
            )));
        }

        if self.rotator.port.trim().is_empty() {
            return Err(ChamberError::ConfigValidation(
                "rotator.port must not be empty".to_string(),
            ));
        }
        if self.rotator.baud_rate == 0 {
            return Err(ChamberError::ConfigValidation(
                "rotator.baud_rate must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
