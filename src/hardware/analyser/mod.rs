//! Vector network analyser session over TCP.
//!
//! The analyser speaks SCPI-style text commands on a raw socket (no VISA layer). A
//! session owns the connection, pushes an initial configuration when it is built, and
//! afterwards exposes one setter per instrument parameter plus a triggered binary
//! capture.
//!
//! ## Protocol
//!
//! - Commands are written verbatim, one write per command, no terminator unless
//!   configured.
//! - Completion is detected by polling `*OPC?` until the instrument answers `1`.
//! - Captures arrive as `[8-byte ASCII length][binary block]` repeated until
//!   `2 * sample_points` elements have been read (see [`capture`]).
//!
//! # Example
//!
//! ```no_run
//! use chamber_daq::hardware::analyser::{AnalyserSession, AnalyserSettings};
//!
//! # async fn example() -> chamber_daq::error::ChamberResult<()> {
//! let settings = AnalyserSettings {
//!     host: "192.168.20.200".to_string(),
//!     port: 23,
//!     ..AnalyserSettings::default()
//! };
//! let mut vna = AnalyserSession::builder(settings).connect().await?;
//! let capture = vna.capture_data(1, 1).await?;
//! println!("{} points", capture.complex_pairs().len());
//! vna.close().await;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod limits;
pub mod scpi;

pub use capture::Capture;
pub use scpi::{ByteOrder, DisplayFormat, SParameter, TransferFormat};

use crate::error::{ChamberError, ChamberResult};
use crate::hardware::polling::{PollPolicy, RetryPolicy};
use crate::hardware::ConnectionState;
use capture::{decode_block, parse_block_header, HEADER_LEN};
use limits::clamp_index;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Channel, port and trace used when pushing the initial configuration.
pub const DEFAULT_CHANNEL: u32 = 1;

/// Requested analyser configuration and remote address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    /// Host name or IP address of the analyser.
    pub host: String,
    /// TCP port of the SCPI socket.
    pub port: u16,
    /// Sweep start frequency in Hz.
    pub start_freq_hz: f64,
    /// Sweep stop frequency in Hz.
    pub stop_freq_hz: f64,
    /// Source power in dBm.
    pub power_dbm: f64,
    /// IF bandwidth in Hz.
    pub ifbw_hz: f64,
    /// Points per sweep.
    pub sample_points: u32,
    /// Trace display format.
    pub display_format: DisplayFormat,
    /// Measured S-parameter.
    pub parameter: SParameter,
    /// Binary transfer format for captures.
    pub transfer_format: TransferFormat,
    /// Byte order of binary captures.
    pub byte_order: ByteOrder,
    /// Appended to every command. Empty by default: commands are sent as formed.
    pub command_terminator: String,
    /// Limit on establishing the TCP connection. `None` waits for the OS.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            host: "192.168.20.200".to_string(),
            port: 23,
            start_freq_hz: 400e6,
            stop_freq_hz: 3e9,
            power_dbm: 10.0,
            ifbw_hz: 5e3,
            sample_points: 1601,
            display_format: DisplayFormat::LogMagnitude,
            parameter: SParameter::S21,
            transfer_format: TransferFormat::Real32,
            byte_order: ByteOrder::LittleEndian,
            command_terminator: String::new(),
            connect_timeout: None,
        }
    }
}

/// Builder for [`AnalyserSession`].
#[derive(Debug, Clone)]
pub struct AnalyserBuilder {
    settings: AnalyserSettings,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl AnalyserBuilder {
    /// Builder with default retry and poll policies.
    pub fn new(settings: AnalyserSettings) -> Self {
        Self {
            settings,
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
        }
    }

    /// Use `retry` for short writes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use `poll` for completion waits.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Connect over TCP and push the configuration.
    ///
    /// # Errors
    /// [`ChamberError::Connection`] if the address cannot be resolved or connected, or
    /// any error raised while configuring the instrument.
    pub async fn connect(self) -> ChamberResult<AnalyserSession<TcpStream>> {
        let host = self.settings.host.clone();
        let port = self.settings.port;
        let limit = PollPolicy {
            interval: Duration::ZERO,
            timeout: self.settings.connect_timeout,
        };

        let stream = limit
            .bounded("analyser TCP connect", async {
                TcpStream::connect((host.as_str(), port))
                    .await
                    .map_err(|e| ChamberError::connection(format!("connect to {}:{}", host, port), e))
            })
            .await?;
        stream
            .set_nodelay(true)
            .map_err(|e| ChamberError::connection("set TCP_NODELAY", e))?;

        info!("Connected to analyser at {}:{}", host, port);
        self.attach(stream).await
    }

    /// Push the configuration over an already open transport.
    pub async fn attach<T>(self, transport: T) -> ChamberResult<AnalyserSession<T>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let requested = self.settings.clone();
        let mut session = AnalyserSession {
            transport: Some(BufReader::new(transport)),
            state: ConnectionState::Connected,
            settings: self.settings,
            retry: self.retry,
            poll: self.poll,
        };

        // Dropping `session` on error releases the transport.
        session.initialise(&requested).await?;
        info!("Analyser has been configured");
        Ok(session)
    }
}

/// An open, configured connection to the network analyser.
///
/// All I/O takes `&mut self`; a session must not be shared between tasks.
pub struct AnalyserSession<T> {
    transport: Option<BufReader<T>>,
    state: ConnectionState,
    settings: AnalyserSettings,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl AnalyserSession<TcpStream> {
    /// Start building a session with default retry and poll policies.
    pub fn builder(settings: AnalyserSettings) -> AnalyserBuilder {
        AnalyserBuilder::new(settings)
    }

    /// Close the current socket, connect to a new address and push the current
    /// configuration again.
    ///
    /// If the new connection fails the session stays closed.
    pub async fn reconnect(&mut self, host: impl Into<String>, port: u16) -> ChamberResult<()> {
        self.close().await;

        let mut settings = self.settings.clone();
        settings.host = host.into();
        settings.port = port;

        let fresh = AnalyserBuilder {
            settings,
            retry: self.retry,
            poll: self.poll,
        }
        .connect()
        .await?;
        *self = fresh;
        Ok(())
    }
}

impl<T> AnalyserSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn initialise(&mut self, requested: &AnalyserSettings) -> ChamberResult<()> {
        self.send_command(scpi::PRESET).await?;
        self.set_frequency_range(requested.start_freq_hz, requested.stop_freq_hz, DEFAULT_CHANNEL)
            .await?;
        self.set_power_level(requested.power_dbm, DEFAULT_CHANNEL).await?;
        self.set_sample_points(requested.sample_points, DEFAULT_CHANNEL)
            .await?;
        self.set_display_format(requested.display_format, DEFAULT_CHANNEL)
            .await?;
        self.set_ifbw(requested.ifbw_hz, DEFAULT_CHANNEL).await?;
        self.set_parameter(requested.parameter, DEFAULT_CHANNEL, DEFAULT_CHANNEL)
            .await?;
        self.set_transfer_format(requested.transfer_format).await?;
        self.wait_until_done().await
    }

    fn transport_mut(&mut self) -> ChamberResult<&mut BufReader<T>> {
        self.transport.as_mut().ok_or(ChamberError::NotConnected)
    }

    /// Send a pre-formed command.
    ///
    /// One transport write is one attempt. A short write is continued with the unsent
    /// bytes according to the retry policy, and reported as
    /// [`ChamberError::CommandSend`] once the retries are spent.
    ///
    /// # Errors
    /// - [`ChamberError::CommandSend`] after the retries are exhausted (non-fatal)
    /// - [`ChamberError::Connection`] on any transport error
    /// - [`ChamberError::NotConnected`] after [`close`](Self::close)
    pub async fn send_command(&mut self, command: &str) -> ChamberResult<()> {
        let retry = self.retry;
        let payload = format!("{}{}", command, self.settings.command_terminator);
        let bytes = payload.as_bytes();
        let transport = self.transport_mut()?;

        let mut sent = 0;
        let mut attempt = 0;
        loop {
            let written = transport
                .write(&bytes[sent..])
                .await
                .map_err(|e| ChamberError::connection(format!("send '{}'", command), e))?;
            sent += written;
            if sent == bytes.len() {
                break;
            }
            if attempt >= retry.max_retries {
                return Err(ChamberError::CommandSend {
                    command: command.to_string(),
                    sent,
                    expected: bytes.len(),
                });
            }
            attempt += 1;
            warn!(
                "Short write for '{}' ({} of {} bytes), retry {}/{}",
                command,
                sent,
                bytes.len(),
                attempt,
                retry.max_retries
            );
            tokio::time::sleep(retry.delay_for(attempt)).await;
        }

        transport
            .flush()
            .await
            .map_err(|e| ChamberError::connection(format!("flush '{}'", command), e))?;
        debug!("Command: {}", command);
        Ok(())
    }

    async fn read_reply_line(&mut self) -> ChamberResult<String> {
        let transport = self.transport_mut()?;
        let mut line = String::new();
        let read = transport.read_line(&mut line).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ChamberError::MalformedFrame(format!("reply is not valid UTF-8: {}", e))
            } else {
                ChamberError::connection("read reply", e)
            }
        })?;
        if read == 0 {
            return Err(ChamberError::connection(
                "read reply",
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "analyser closed the connection",
                ),
            ));
        }
        let reply = line.trim().to_string();
        debug!("Reply: {}", reply);
        Ok(reply)
    }

    /// Ask whether pending operations have completed (`*OPC?`).
    ///
    /// Returns `true` when the reply decodes to 1.
    pub async fn done(&mut self) -> ChamberResult<bool> {
        self.send_command(scpi::OPERATION_COMPLETE_QUERY).await?;
        let reply = self.read_reply_line().await?;
        let value: i64 = reply.parse().map_err(|_| {
            ChamberError::MalformedFrame(format!("unexpected *OPC? reply '{}'", reply))
        })?;
        Ok(value == 1)
    }

    /// Poll [`done`](Self::done) until the instrument reports completion.
    ///
    /// With the default poll policy this never gives up.
    pub async fn wait_until_done(&mut self) -> ChamberResult<()> {
        let poll = self.poll;
        poll.bounded("analyser operation complete", async {
            loop {
                match self.done().await {
                    Ok(true) => return Ok(()),
                    Ok(false) => poll.pause().await,
                    Err(e) => return Err(e),
                }
            }
        })
        .await
    }

    /// Set the sweep start frequency.
    pub async fn set_start_frequency(&mut self, hz: f64, channel: u32) -> ChamberResult<()> {
        let hz = limits::clamp_frequency(hz);
        self.send_command(&scpi::start_frequency(clamp_index(channel), hz))
            .await?;
        self.settings.start_freq_hz = hz;
        Ok(())
    }

    /// Set the sweep stop frequency.
    pub async fn set_stop_frequency(&mut self, hz: f64, channel: u32) -> ChamberResult<()> {
        let hz = limits::clamp_frequency(hz);
        self.send_command(&scpi::stop_frequency(clamp_index(channel), hz))
            .await?;
        self.settings.stop_freq_hz = hz;
        Ok(())
    }

    /// Set start and stop frequency in a single command.
    pub async fn set_frequency_range(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        channel: u32,
    ) -> ChamberResult<()> {
        let start_hz = limits::clamp_frequency(start_hz);
        let stop_hz = limits::clamp_frequency(stop_hz);
        self.send_command(&scpi::frequency_range(clamp_index(channel), start_hz, stop_hz))
            .await?;
        self.settings.start_freq_hz = start_hz;
        self.settings.stop_freq_hz = stop_hz;
        Ok(())
    }

    /// Set the source power of `port`.
    pub async fn set_power_level(&mut self, dbm: f64, port: u32) -> ChamberResult<()> {
        let dbm = limits::clamp_power(dbm);
        self.send_command(&scpi::power_level(clamp_index(port), dbm))
            .await?;
        self.settings.power_dbm = dbm;
        Ok(())
    }

    /// Set the IF bandwidth.
    pub async fn set_ifbw(&mut self, hz: f64, channel: u32) -> ChamberResult<()> {
        let hz = limits::clamp_ifbw(hz);
        self.send_command(&scpi::if_bandwidth(clamp_index(channel), hz))
            .await?;
        self.settings.ifbw_hz = hz;
        Ok(())
    }

    /// Set the number of sweep points.
    pub async fn set_sample_points(&mut self, points: u32, channel: u32) -> ChamberResult<()> {
        let points = limits::clamp_sample_points(points);
        self.send_command(&scpi::sample_points(clamp_index(channel), points))
            .await?;
        self.settings.sample_points = points;
        Ok(())
    }

    /// Set the trace display format.
    pub async fn set_display_format(
        &mut self,
        format: DisplayFormat,
        channel: u32,
    ) -> ChamberResult<()> {
        self.send_command(&scpi::display_format(clamp_index(channel), format))
            .await?;
        self.settings.display_format = format;
        Ok(())
    }

    /// Select the S-parameter measured on `trace`.
    pub async fn set_parameter(
        &mut self,
        parameter: SParameter,
        channel: u32,
        trace: u32,
    ) -> ChamberResult<()> {
        self.send_command(&scpi::parameter(
            clamp_index(channel),
            clamp_index(trace),
            parameter,
        ))
        .await?;
        self.settings.parameter = parameter;
        Ok(())
    }

    /// Set the binary transfer format used by captures.
    pub async fn set_transfer_format(&mut self, format: TransferFormat) -> ChamberResult<()> {
        self.send_command(&scpi::transfer_format(format)).await?;
        self.settings.transfer_format = format;
        Ok(())
    }

    /// Change how capture blocks are decoded. Local only; nothing is sent.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.settings.byte_order = order;
    }

    /// Trigger a single sweep and read the resulting trace.
    ///
    /// If either trigger command is only partially written the capture is abandoned and
    /// an empty [`Capture`] is returned.
    ///
    /// # Errors
    /// - [`ChamberError::MalformedFrame`] for a block header that is not a usable byte count
    /// - [`ChamberError::Connection`] on transport failure
    /// - [`ChamberError::Timeout`] if the poll policy gives up waiting for the sweep
    pub async fn capture_data(&mut self, channel: u32, trace: u32) -> ChamberResult<Capture> {
        let channel = clamp_index(channel);
        let trace = clamp_index(trace);
        let format = self.settings.transfer_format;

        for command in [scpi::TRIGGER_SOURCE_EXTERNAL, scpi::TRIGGER_SINGLE] {
            match self.send_command(command).await {
                Ok(()) => {}
                Err(err @ ChamberError::CommandSend { .. }) => {
                    warn!("Capture abandoned: {}", err);
                    return Ok(Capture::empty(channel, trace, format));
                }
                Err(err) => return Err(err),
            }
        }

        self.wait_until_done().await?;

        let expected = 2 * self.settings.sample_points as usize;
        let width = format.element_width();
        let order = self.settings.byte_order;
        let transport = self.transport_mut()?;

        let mut samples = Vec::with_capacity(expected);
        let mut block = Vec::new();
        while samples.len() < expected {
            let mut header = [0u8; HEADER_LEN];
            transport
                .read_exact(&mut header)
                .await
                .map_err(|e| ChamberError::connection("read capture header", e))?;
            // surplus is tolerated and trimmed, but never beyond one full trace per block
            let elements = parse_block_header(&header, width, expected)?;
            trace!("Capture block of {} elements", elements);

            block.resize(elements * width, 0);
            transport
                .read_exact(&mut block)
                .await
                .map_err(|e| ChamberError::connection("read capture block", e))?;
            decode_block(&block, format, order, &mut samples);
        }

        if samples.len() > expected {
            warn!(
                "Discarding {} surplus capture elements",
                samples.len() - expected
            );
            samples.truncate(expected);
        }

        info!(
            "Captured {} elements on channel {} trace {}",
            samples.len(),
            channel,
            trace
        );
        Ok(Capture {
            channel,
            trace,
            format,
            samples,
        })
    }

    /// Close the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown().await {
                debug!("Analyser shutdown reported: {}", e);
            }
            info!(
                "Analyser session {}:{} closed",
                self.settings.host, self.settings.port
            );
        }
        self.state = ConnectionState::Closed;
    }
}

impl<T> AnalyserSession<T> {
    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True until [`close`](AnalyserSession::close) is called.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Current (clamped, acknowledged) configuration.
    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    /// Remote host and port.
    pub fn remote_address(&self) -> (&str, u16) {
        (&self.settings.host, self.settings.port)
    }

    /// Sweep start frequency in Hz.
    pub fn start_frequency(&self) -> f64 {
        self.settings.start_freq_hz
    }

    /// Sweep stop frequency in Hz.
    pub fn stop_frequency(&self) -> f64 {
        self.settings.stop_freq_hz
    }

    /// Source power in dBm.
    pub fn power_level(&self) -> f64 {
        self.settings.power_dbm
    }

    /// IF bandwidth in Hz.
    pub fn ifbw(&self) -> f64 {
        self.settings.ifbw_hz
    }

    /// Points per sweep.
    pub fn sample_points(&self) -> u32 {
        self.settings.sample_points
    }

    /// Trace display format.
    pub fn display_format(&self) -> DisplayFormat {
        self.settings.display_format
    }

    /// Measured S-parameter.
    pub fn parameter(&self) -> SParameter {
        self.settings.parameter
    }

    /// Binary transfer format.
    pub fn transfer_format(&self) -> TransferFormat {
        self.settings.transfer_format
    }

    /// Retry policy for short writes.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Replace the retry policy.
    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Poll policy for completion waits.
    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Replace the poll policy, e.g. to bound a wait that was unbounded at construction.
    pub fn set_poll_policy(&mut self, poll: PollPolicy) {
        self.poll = poll;
    }
}
