//! Instrument sessions for the antenna chamber.
//!
//! - [`analyser`]: SCPI network analyser over TCP
//! - [`rotator`]: binary-protocol turntable over a serial line
//! - [`capabilities`]: the [`Rotator`](capabilities::Rotator) capability trait
//! - [`mock`]: simulated rotator for exercising sequencing code without hardware
//! - [`polling`]: retry and poll policies shared by both sessions
//!
//! Each session exclusively owns its transport. A session only exists once its
//! transport is open and the device has accepted the initial configuration; closing it
//! (or dropping it) is the only way the transport is released.

pub mod analyser;
pub mod capabilities;
pub mod mock;
pub mod polling;
pub mod rotator;

/// Lifecycle of an instrument session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open and device configured.
    Connected,
    /// Transport released. Terminal.
    Closed,
}
