//! Valid parameter domains for the network analyser.
//!
//! Values outside a domain are coerced to the nearest bound before they are sent, and
//! the coerced value becomes the session's source of truth.

use tracing::debug;

/// Lowest settable start/stop frequency in Hz.
pub const MIN_FREQUENCY_HZ: f64 = 1e5;
/// Highest settable start/stop frequency in Hz.
pub const MAX_FREQUENCY_HZ: f64 = 8.5e9;
/// Lowest source power in dBm.
pub const MIN_POWER_DBM: f64 = -55.0;
/// Highest source power in dBm.
pub const MAX_POWER_DBM: f64 = 10.0;
/// Narrowest IF bandwidth in Hz.
pub const MIN_IFBW_HZ: f64 = 2.0;
/// Widest IF bandwidth in Hz.
pub const MAX_IFBW_HZ: f64 = 5e5;
/// Fewest sweep points.
pub const MIN_SAMPLE_POINTS: u32 = 2;
/// Most sweep points.
pub const MAX_SAMPLE_POINTS: u32 = 1601;

fn clamp_f64(name: &str, value: f64, min: f64, max: f64) -> f64 {
    // NaN has no nearest bound; take the lower one.
    let clamped = if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    };
    if clamped != value {
        debug!("Clamped {} from {} to {}", name, value, clamped);
    }
    clamped
}

/// Clamp a start or stop frequency to `[1e5, 8.5e9]` Hz.
pub fn clamp_frequency(hz: f64) -> f64 {
    clamp_f64("frequency", hz, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
}

/// Clamp a source power to `[-55, 10]` dBm.
pub fn clamp_power(dbm: f64) -> f64 {
    clamp_f64("power level", dbm, MIN_POWER_DBM, MAX_POWER_DBM)
}

/// Clamp an IF bandwidth to `[2, 5e5]` Hz.
pub fn clamp_ifbw(hz: f64) -> f64 {
    clamp_f64("IF bandwidth", hz, MIN_IFBW_HZ, MAX_IFBW_HZ)
}

/// Clamp a sweep point count to `[2, 1601]`.
pub fn clamp_sample_points(points: u32) -> u32 {
    let clamped = points.clamp(MIN_SAMPLE_POINTS, MAX_SAMPLE_POINTS);
    if clamped != points {
        debug!("Clamped sample points from {} to {}", points, clamped);
    }
    clamped
}

/// Channel, port and trace indices are 1-based on the wire.
pub fn clamp_index(index: u32) -> u32 {
    index.max(1)
}
