//! Serial turntable driver.
//!
//! The controller is driven with fixed 5-byte frames (see [`protocol`]). Opening a
//! session sends the speed/acceleration frame and requires the controller to echo it
//! back byte for byte; a different echo means the wrong device (or a confused one) is on
//! the line and the session is not created.
//!
//! # Example Usage
//!
//! ```no_run
//! use chamber_daq::hardware::capabilities::Rotator;
//! use chamber_daq::hardware::polling::PollPolicy;
//! use chamber_daq::hardware::rotator::{RotatorSettings, SerialRotator};
//!
//! # async fn example() -> chamber_daq::error::ChamberResult<()> {
//! let settings = RotatorSettings {
//!     port: "/dev/ttyUSB0".to_string(),
//!     ..RotatorSettings::default()
//! };
//! let mut rotator = SerialRotator::open(&settings, PollPolicy::default()).await?;
//!
//! // Move to 90 degrees and wait for the controller to report completion
//! rotator.rotate_to(90.0, true).await?;
//! println!("Position: {:.2}°", rotator.position());
//! # Ok(())
//! # }
//! ```

pub mod protocol;

use crate::error::{ChamberError, ChamberResult};
use crate::hardware::capabilities::Rotator;
use crate::hardware::polling::PollPolicy;
use crate::hardware::ConnectionState;
use async_trait::async_trait;
use protocol::{Direction, FRAME_LEN, MIN_RESOLUTION_DEG};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

/// Serial line and initial motion profile of the turntable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorSettings {
    /// Serial port path (e.g. "/dev/ttyUSB0" on Linux, "COM4" on Windows).
    pub port: String,
    /// Baud rate; framing is always 8N1.
    pub baud_rate: u32,
    /// Initial speed byte.
    pub speed: u8,
    /// Initial acceleration byte (raised to 1 if zero).
    pub accel: u8,
    /// Degrees per measurement step. Informational; the controller never sees it.
    pub step_angle_deg: f64,
}

impl Default for RotatorSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            speed: 1,
            accel: 255,
            step_angle_deg: 5.0,
        }
    }
}

/// Turntable session over a byte stream.
///
/// `S` is normally [`tokio_serial::SerialStream`]; tests substitute an in-memory stream.
pub struct SerialRotator<S> {
    port: Option<S>,
    port_name: String,
    baud_rate: u32,
    speed: u8,
    accel: u8,
    step_angle_deg: f64,
    position_deg: f64,
    poll: PollPolicy,
}

/// Turntable on a real serial port.
#[cfg(feature = "instrument_serial")]
pub type SerialPortRotator = SerialRotator<tokio_serial::SerialStream>;

#[cfg(feature = "instrument_serial")]
impl SerialRotator<tokio_serial::SerialStream> {
    /// Open the serial port (8 data bits, 1 stop bit, no parity, no flow control) and run
    /// the speed/acceleration handshake.
    ///
    /// # Errors
    /// - [`ChamberError::Connection`] if the port cannot be opened or the handshake I/O fails
    /// - [`ChamberError::ProtocolMismatch`] if the echo differs from the frame sent
    pub async fn open(settings: &RotatorSettings, poll: PollPolicy) -> ChamberResult<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                ChamberError::connection(format!("open serial port {}", settings.port), e.into())
            })?;

        debug!(
            "Serial port '{}' opened at {} baud",
            settings.port, settings.baud_rate
        );
        Self::with_transport(port, settings, poll).await
    }
}

impl<S> SerialRotator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the handshake over an already open stream.
    ///
    /// On failure the stream is dropped and no session is returned.
    pub async fn with_transport(
        port: S,
        settings: &RotatorSettings,
        poll: PollPolicy,
    ) -> ChamberResult<Self> {
        let mut rotator = Self {
            port: Some(port),
            port_name: settings.port.clone(),
            baud_rate: settings.baud_rate,
            speed: settings.speed,
            accel: protocol::clamp_accel(u16::from(settings.accel)),
            step_angle_deg: settings.step_angle_deg,
            position_deg: 0.0,
            poll,
        };

        rotator.push_motion_profile().await?;
        info!(
            "Rotator on '{}' initialised (speed {}, accel {})",
            rotator.port_name, rotator.speed, rotator.accel
        );
        Ok(rotator)
    }

    /// Send the speed/acceleration frame and require an exact echo.
    async fn push_motion_profile(&mut self) -> ChamberResult<()> {
        let frame = protocol::motion_frame(self.speed, self.accel);
        let poll = self.poll;
        let port = self.port.as_mut().ok_or(ChamberError::NotConnected)?;

        port.write_all(&frame)
            .await
            .map_err(|e| ChamberError::connection("write speed/accel frame", e))?;
        port.flush()
            .await
            .map_err(|e| ChamberError::connection("flush speed/accel frame", e))?;
        trace!("Sent {:?}", frame);

        let mut reply = [0u8; FRAME_LEN];
        poll.bounded("rotator speed/accel echo", async {
            port.read_exact(&mut reply)
                .await
                .map(|_| ())
                .map_err(|e| ChamberError::connection("read speed/accel echo", e))
        })
        .await?;

        if reply != frame {
            return Err(ChamberError::ProtocolMismatch {
                expected: frame.to_vec(),
                received: reply.to_vec(),
            });
        }
        Ok(())
    }

    /// Release the serial port. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.shutdown().await {
                debug!("Rotator shutdown reported: {}", e);
            }
            info!("Rotator on '{}' closed", self.port_name);
        }
    }
}

impl<S> SerialRotator<S> {
    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        if self.port.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Closed
        }
    }

    /// Serial port path.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Degrees per measurement step.
    pub fn step_angle(&self) -> f64 {
        self.step_angle_deg
    }

    /// Set the degrees per measurement step. Local only.
    pub fn set_step_angle(&mut self, step_angle_deg: f64) {
        self.step_angle_deg = step_angle_deg;
    }

    /// Poll policy for acknowledgement waits.
    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Replace the poll policy.
    pub fn set_poll_policy(&mut self, poll: PollPolicy) {
        self.poll = poll;
    }
}

#[async_trait]
impl<S> Rotator for SerialRotator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_speed(&mut self, speed: u16) -> ChamberResult<()> {
        self.speed = protocol::clamp_speed(speed);
        self.push_motion_profile().await?;
        debug!("Rotator speed set to {}", self.speed);
        Ok(())
    }

    async fn set_accel(&mut self, accel: u16) -> ChamberResult<()> {
        self.accel = protocol::clamp_accel(accel);
        self.push_motion_profile().await?;
        debug!("Rotator acceleration set to {}", self.accel);
        Ok(())
    }

    async fn rotate_by(
        &mut self,
        direction: Direction,
        angle_deg: f64,
        wait: bool,
    ) -> ChamberResult<()> {
        if angle_deg.abs() <= MIN_RESOLUTION_DEG {
            trace!("Ignoring sub-resolution move of {}°", angle_deg);
            return Ok(());
        }

        let steps = protocol::angle_to_steps(angle_deg)?;
        let frame = protocol::move_frame(direction, steps, wait);
        let poll = self.poll;
        let port = self.port.as_mut().ok_or(ChamberError::NotConnected)?;

        // Tracked position follows the command, not the confirmation.
        self.position_deg += direction.sign() * angle_deg;
        debug!(
            "Rotating {:?} by {}° ({} steps), tracked position {}°",
            direction, angle_deg, steps, self.position_deg
        );

        port.write_all(&frame)
            .await
            .map_err(|e| ChamberError::connection("write move frame", e))?;
        port.flush()
            .await
            .map_err(|e| ChamberError::connection("flush move frame", e))?;
        trace!("Sent {:?}", frame);

        if wait {
            poll.bounded("rotator move acknowledgement", async {
                let mut byte = [0u8; 1];
                loop {
                    if let Err(e) = port.read_exact(&mut byte).await {
                        return Err(ChamberError::connection("read move acknowledgement", e));
                    }
                    if protocol::is_move_completion(byte[0]) {
                        return Ok(());
                    }
                    debug!(
                        "Skipping byte {:#04x} while waiting for move acknowledgement",
                        byte[0]
                    );
                }
            })
            .await?;
            debug!("Move acknowledged");
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
