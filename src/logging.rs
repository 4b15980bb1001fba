//! Opt-in `tracing` subscriber setup.
//!
//! The library only emits events; nothing is printed until a subscriber is installed.
//! Binaries and test harnesses driving the rig call [`init`] once at startup with the
//! configured level. `RUST_LOG`, when set, takes precedence.

use crate::error::{ChamberError, ChamberResult};
use tracing_subscriber::EnvFilter;

/// Build the event filter: `RUST_LOG` if present and valid, otherwise `default_level`.
pub fn env_filter(default_level: &str) -> ChamberResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level).map_err(|e| {
        ChamberError::ConfigValidation(format!("invalid log filter '{}': {}", default_level, e))
    })
}

/// Install the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed (e.g. by a test harness),
/// in which case the existing one is left in place.
pub fn init(default_level: &str) -> ChamberResult<bool> {
    let filter = env_filter(default_level)?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok())
}
