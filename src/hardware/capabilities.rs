//! Capability traits implemented by the chamber hardware.
//!
//! Sequencing code (configure, rotate, capture, repeat) depends on these traits rather
//! than on a concrete transport, so a serial turntable and the in-memory mock are
//! interchangeable.

use crate::error::{ChamberError, ChamberResult};
use crate::hardware::rotator::protocol::Direction;
use async_trait::async_trait;

/// A turntable that moves by relative or absolute angles.
///
/// Position is tracked client-side: it is updated when a move is issued, not when the
/// device confirms it, and is unbounded (it does not wrap at 360°).
#[async_trait]
pub trait Rotator: Send {
    /// Set the speed (0–255; larger values saturate) and push it to the device.
    async fn set_speed(&mut self, speed: u16) -> ChamberResult<()>;

    /// Set the acceleration (1–255) and push it to the device.
    async fn set_accel(&mut self, accel: u16) -> ChamberResult<()>;

    /// Move by `angle_deg` in `direction`.
    ///
    /// Angles of 0.01° or less are ignored. With `wait`, returns once the device reports
    /// that the move finished.
    async fn rotate_by(
        &mut self,
        direction: Direction,
        angle_deg: f64,
        wait: bool,
    ) -> ChamberResult<()>;

    /// Move to an absolute position, relative to where the client believes it is.
    ///
    /// # Errors
    /// [`ChamberError::InvalidArgument`] if the target (or the tracked position) is not
    /// finite.
    async fn rotate_to(&mut self, target_deg: f64, wait: bool) -> ChamberResult<()> {
        let delta = target_deg - self.position();
        if !delta.is_finite() {
            return Err(ChamberError::InvalidArgument(format!(
                "cannot rotate to {}° from {}°",
                target_deg,
                self.position()
            )));
        }
        match Direction::of(delta) {
            Some(direction) => self.rotate_by(direction, delta.abs(), wait).await,
            None => Ok(()),
        }
    }

    /// Client-tracked position in degrees.
    fn position(&self) -> f64;

    /// Re-reference the tracked position without moving.
    fn set_position(&mut self, position_deg: f64);

    /// Current speed byte.
    fn speed(&self) -> u8;

    /// Current acceleration byte.
    fn accel(&self) -> u8;
}
