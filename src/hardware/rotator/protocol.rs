//! Turntable controller wire protocol.
//!
//! Every command is a 5-byte frame:
//!
//! | Opcode | Meaning                       | Payload                      | Reply            |
//! |--------|-------------------------------|------------------------------|------------------|
//! | 1      | set speed / acceleration      | `speed, accel, 3, 4`         | exact echo       |
//! | 2      | move, do not report completion| `direction, b0, b1, b2`      | none awaited     |
//! | 3      | move, report completion       | `direction, b0, b1, b2`      | byte `2` or `3` when done |
//!
//! The step count is a signed 24-bit big-endian integer; one revolution is 200 000 steps.

use crate::error::{ChamberError, ChamberResult};
use serde::{Deserialize, Serialize};

/// Every frame is this long.
pub const FRAME_LEN: usize = 5;
/// Set speed and acceleration.
pub const OPCODE_SET_MOTION: u8 = 1;
/// Move without waiting for completion.
pub const OPCODE_MOVE: u8 = 2;
/// Move and acknowledge completion.
pub const OPCODE_MOVE_ACK: u8 = 3;
/// Fixed trailer of the speed/acceleration frame.
pub const MOTION_TRAILER: [u8; 2] = [3, 4];
/// Controller steps per full turn.
pub const STEPS_PER_REVOLUTION: f64 = 200_000.0;
/// Moves at or below this many degrees are not sent.
pub const MIN_RESOLUTION_DEG: f64 = 0.01;

const STEP_FIELD_MIN: i32 = -(1 << 23);
const STEP_FIELD_MAX: i32 = (1 << 23) - 1;

/// Rotation direction, encoded on the wire as a signed unit byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Direction {
    /// +1 (`0x01`).
    Clockwise = 1,
    /// -1 (`0xFF`).
    Anticlockwise = -1,
}

impl Direction {
    /// Direction of a signed angle; `None` for zero.
    pub fn of(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(Direction::Clockwise)
        } else if delta < 0.0 {
            Some(Direction::Anticlockwise)
        } else {
            None
        }
    }

    /// +1.0 or -1.0.
    pub fn sign(self) -> f64 {
        f64::from(self as i8)
    }

    /// Byte sent in the move frame.
    pub fn wire_byte(self) -> u8 {
        self as i8 as u8
    }
}

/// Speed is a single byte; wider inputs saturate at 255.
pub fn clamp_speed(speed: u16) -> u8 {
    u8::try_from(speed).unwrap_or(u8::MAX)
}

/// Acceleration is a single byte and must be at least 1.
pub fn clamp_accel(accel: u16) -> u8 {
    u8::try_from(accel).unwrap_or(u8::MAX).max(1)
}

/// `[1, speed, accel, 3, 4]`
pub fn motion_frame(speed: u8, accel: u8) -> [u8; FRAME_LEN] {
    [
        OPCODE_SET_MOTION,
        speed,
        accel,
        MOTION_TRAILER[0],
        MOTION_TRAILER[1],
    ]
}

/// Convert degrees to controller steps, `round(angle * 200000 / 360)`.
///
/// # Errors
/// [`ChamberError::InvalidArgument`] if the angle is not finite or the step count does
/// not fit the 24-bit field.
pub fn angle_to_steps(angle_deg: f64) -> ChamberResult<i32> {
    let steps = (angle_deg * STEPS_PER_REVOLUTION / 360.0).round();
    if !steps.is_finite() || steps < f64::from(STEP_FIELD_MIN) || steps > f64::from(STEP_FIELD_MAX) {
        return Err(ChamberError::InvalidArgument(format!(
            "rotation of {} degrees does not fit a single move frame",
            angle_deg
        )));
    }
    Ok(steps as i32)
}

/// Split a step count into three bytes, most significant first.
///
/// For non-negative counts this is `b0 = steps / 65536`, `b1 = (steps - b0*65536) / 256`,
/// `b2 = steps % 256`; negative counts use 24-bit two's complement.
pub fn encode_steps(steps: i32) -> [u8; 3] {
    [(steps >> 16) as u8, (steps >> 8) as u8, steps as u8]
}

/// Inverse of [`encode_steps`].
pub fn decode_steps(bytes: [u8; 3]) -> i32 {
    let raw = (i32::from(bytes[0]) << 16) | (i32::from(bytes[1]) << 8) | i32::from(bytes[2]);
    // sign-extend bit 23
    (raw << 8) >> 8
}

/// Opcode of a move frame.
pub fn move_opcode(wait: bool) -> u8 {
    if wait {
        OPCODE_MOVE_ACK
    } else {
        OPCODE_MOVE
    }
}

/// Whether a byte read after an acknowledged move reports completion.
///
/// Controllers answer with either move opcode; anything else is line noise.
pub fn is_move_completion(byte: u8) -> bool {
    matches!(byte, OPCODE_MOVE | OPCODE_MOVE_ACK)
}

/// `[opcode, direction, b0, b1, b2]`
pub fn move_frame(direction: Direction, steps: i32, wait: bool) -> [u8; FRAME_LEN] {
    let [b0, b1, b2] = encode_steps(steps);
    [move_opcode(wait), direction.wire_byte(), b0, b1, b2]
}
