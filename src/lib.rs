//! Instrument control for an antenna-chamber measurement rig.
//!
//! Two independent sessions, each exclusively owning one physical link:
//!
//! - [`hardware::analyser::AnalyserSession`]: vector network analyser driven with
//!   SCPI-style text commands over TCP, with `*OPC?` completion polling and
//!   length-framed binary trace capture.
//! - [`hardware::rotator::SerialRotator`]: turntable driven with 5-byte binary frames
//!   over a serial line, with echo/acknowledgement checks and client-side position
//!   tracking behind the [`hardware::capabilities::Rotator`] trait.
//!
//! Configuration is loaded with [`config::RigConfig`]; every failure is a
//! [`error::ChamberError`].

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;

pub use config::RigConfig;
pub use error::{ChamberError, ChamberResult};
pub use hardware::analyser::{AnalyserBuilder, AnalyserSession, AnalyserSettings, Capture};
pub use hardware::capabilities::Rotator;
pub use hardware::mock::MockRotator;
pub use hardware::polling::{PollPolicy, RetryPolicy};
pub use hardware::rotator::{RotatorSettings, SerialRotator};
pub use hardware::ConnectionState;
