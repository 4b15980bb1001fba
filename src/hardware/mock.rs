//! Mock Hardware Implementations
//!
//! Simulated turntable for exercising sequencing code without a controller on the
//! serial line. Uses async-safe operations only (`tokio::time::sleep`).
//!
//! `MockRotator` encodes every command exactly as [`SerialRotator`] would and keeps the
//! frames for inspection, so tests can assert on the bytes a real device would have
//! received.
//!
//! [`SerialRotator`]: crate::hardware::rotator::SerialRotator

use crate::error::ChamberResult;
use crate::hardware::capabilities::Rotator;
use crate::hardware::rotator::protocol::{self, Direction, FRAME_LEN, MIN_RESOLUTION_DEG};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Simulated turntable.
///
/// Completion of an acknowledged move takes `settle` per degree moved (zero by default).
#[derive(Debug, Clone)]
pub struct MockRotator {
    position_deg: f64,
    speed: u8,
    accel: u8,
    settle_per_degree: Duration,
    sent: Vec<[u8; FRAME_LEN]>,
}

impl MockRotator {
    /// Mock at 0° with the default motion profile (speed 1, accel 255).
    pub fn new() -> Self {
        Self {
            position_deg: 0.0,
            speed: 1,
            accel: 255,
            settle_per_degree: Duration::ZERO,
            sent: vec![protocol::motion_frame(1, 255)],
        }
    }

    /// Mock whose acknowledged moves take `per_degree` for every degree travelled.
    pub fn with_settle(per_degree: Duration) -> Self {
        Self {
            settle_per_degree: per_degree,
            ..Self::new()
        }
    }

    /// Every frame sent so far, including the initial speed/acceleration frame.
    pub fn sent_frames(&self) -> &[[u8; FRAME_LEN]] {
        &self.sent
    }

    /// The most recently sent frame.
    pub fn last_frame(&self) -> Option<[u8; FRAME_LEN]> {
        self.sent.last().copied()
    }
}

impl Default for MockRotator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rotator for MockRotator {
    async fn set_speed(&mut self, speed: u16) -> ChamberResult<()> {
        self.speed = protocol::clamp_speed(speed);
        self.sent.push(protocol::motion_frame(self.speed, self.accel));
        Ok(())
    }

    async fn set_accel(&mut self, accel: u16) -> ChamberResult<()> {
        self.accel = protocol::clamp_accel(accel);
        self.sent.push(protocol::motion_frame(self.speed, self.accel));
        Ok(())
    }

    async fn rotate_by(
        &mut self,
        direction: Direction,
        angle_deg: f64,
        wait: bool,
    ) -> ChamberResult<()> {
        if angle_deg.abs() <= MIN_RESOLUTION_DEG {
            return Ok(());
        }
        let steps = protocol::angle_to_steps(angle_deg)?;
        self.position_deg += direction.sign() * angle_deg;
        self.sent.push(protocol::move_frame(direction, steps, wait));
        debug!(
            "MockRotator: {:?} {}° -> {}°",
            direction, angle_deg, self.position_deg
        );

        if wait && !self.settle_per_degree.is_zero() {
            sleep(self.settle_per_degree.mul_f64(angle_deg.abs())).await;
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        self.position_deg
    }

    fn set_position(&mut self, position_deg: f64) {
        self.position_deg = position_deg;
    }

    fn speed(&self) -> u8 {
        self.speed
    }

    fn accel(&self) -> u8 {
        self.accel
    }
}
