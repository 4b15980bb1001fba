//! Binary capture framing.
//!
//! After a triggered sweep the analyser streams the trace as one or more blocks, each
//! preceded by an 8-byte ASCII header holding the block length in bytes:
//!
//! ```text
//! [ "   25608" ][ 25608 bytes of REAL32 samples ] [ header ][ block ] ...
//! ```
//!
//! Samples are interleaved real/imaginary pairs, so a full trace holds
//! `2 * sample_points` elements regardless of the display format.

use super::scpi::{ByteOrder, TransferFormat};
use crate::error::{ChamberError, ChamberResult};
use bytes::Buf;
use num_complex::Complex64;

/// Length of the ASCII block-size header.
pub const HEADER_LEN: usize = 8;

/// Decode a block header into the number of elements that follow it.
///
/// Blocks announcing more than `max_elements` are rejected before anything is allocated.
pub(crate) fn parse_block_header(
    header: &[u8; HEADER_LEN],
    width: usize,
    max_elements: usize,
) -> ChamberResult<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| ChamberError::MalformedFrame(format!("non-ASCII block header {:?}", header)))?
        .trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');

    let bytes: usize = text.parse().map_err(|_| {
        ChamberError::MalformedFrame(format!("block header '{}' is not a byte count", text))
    })?;

    if bytes == 0 {
        return Err(ChamberError::MalformedFrame(
            "block header announces an empty block".to_string(),
        ));
    }
    if bytes % width != 0 {
        return Err(ChamberError::MalformedFrame(format!(
            "block of {} bytes is not a whole number of {}-byte elements",
            bytes, width
        )));
    }
    let elements = bytes / width;
    if elements > max_elements {
        return Err(ChamberError::MalformedFrame(format!(
            "block of {} elements exceeds the {} a full trace holds",
            elements, max_elements
        )));
    }
    Ok(elements)
}

/// Append the samples held in `block` to `out`.
pub(crate) fn decode_block(
    mut block: &[u8],
    format: TransferFormat,
    order: ByteOrder,
    out: &mut Vec<f64>,
) {
    let width = format.element_width();
    out.reserve(block.len() / width);
    while block.remaining() >= width {
        let value = match (format, order) {
            (TransferFormat::Real32, ByteOrder::LittleEndian) => block.get_f32_le() as f64,
            (TransferFormat::Real32, ByteOrder::BigEndian) => block.get_f32() as f64,
            (TransferFormat::Real64, ByteOrder::LittleEndian) => block.get_f64_le(),
            (TransferFormat::Real64, ByteOrder::BigEndian) => block.get_f64(),
        };
        out.push(value);
    }
}

/// One captured trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// Channel the sweep was captured on.
    pub channel: u32,
    /// Trace within the channel.
    pub trace: u32,
    /// Wire format the samples arrived in.
    pub format: TransferFormat,
    /// Interleaved real/imaginary samples.
    pub samples: Vec<f64>,
}

impl Capture {
    pub(crate) fn empty(channel: u32, trace: u32, format: TransferFormat) -> Self {
        Self {
            channel,
            trace,
            format,
            samples: Vec::new(),
        }
    }

    /// Number of elements (twice the number of points).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the trigger could not be armed and nothing was read.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Pair up the interleaved samples as complex points. A trailing odd element is
    /// ignored.
    pub fn complex_pairs(&self) -> Vec<Complex64> {
        self.samples
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect()
    }
}
