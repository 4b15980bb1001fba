//! SCPI command vocabulary of the network analyser.
//!
//! Commands are built as complete strings; the session sends them verbatim. Numeric
//! values are formatted with six decimals (`400000000.000000`), counts as plain integers.

use crate::error::ChamberError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reset the instrument to its preset state.
pub const PRESET: &str = ":SYST:PRES";
/// Operation-complete query; the device answers `1` once pending operations finish.
pub const OPERATION_COMPLETE_QUERY: &str = "*OPC?";
/// Arm the sweep on the external trigger input.
pub const TRIGGER_SOURCE_EXTERNAL: &str = ":TRIG:SOUR EXT";
/// Request a single triggered sweep.
pub const TRIGGER_SINGLE: &str = ":TRIG:SING";

/// Trace display format (`:CALC:FORM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayFormat {
    /// Log magnitude (`MLOG`).
    #[default]
    #[serde(alias = "MLOG")]
    LogMagnitude,
    /// Phase (`PHAS`).
    #[serde(alias = "PHAS")]
    Phase,
    /// Voltage standing wave ratio (`VSWR`).
    #[serde(alias = "VSWR")]
    Vswr,
    /// Smith chart (`SMIT`).
    #[serde(alias = "SMIT")]
    Smith,
}

/// Measured scattering parameter (`:CALC:PAR:DEF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SParameter {
    #[allow(missing_docs)]
    S11,
    #[allow(missing_docs)]
    S12,
    #[default]
    #[allow(missing_docs)]
    S21,
    #[allow(missing_docs)]
    S22,
}

/// Wire encoding of captured samples (`:FORM:DATA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFormat {
    /// 64-bit IEEE floats (`REAL`).
    #[serde(alias = "REAL")]
    Real64,
    /// 32-bit IEEE floats (`REAL32`).
    #[default]
    #[serde(alias = "REAL32")]
    Real32,
}

/// Byte order of binary capture blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Least significant byte first (the instrument's swapped order).
    #[default]
    LittleEndian,
    /// Most significant byte first (SCPI "normal" order).
    BigEndian,
}

macro_rules! wire_table {
    ($ty:ident { $($variant:ident => $mnemonic:literal),+ $(,)? }) => {
        impl $ty {
            /// Every member, in wire code order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// SCPI mnemonic sent on the wire.
            pub fn as_scpi(&self) -> &'static str {
                match self {
                    $($ty::$variant => $mnemonic),+
                }
            }

            /// Map a numeric code to a member; codes outside the table take the
            /// nearest end of it.
            pub fn from_code(code: i64) -> Self {
                let last = (Self::ALL.len() - 1) as i64;
                Self::ALL[code.clamp(0, last) as usize]
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_scpi())
            }
        }

        impl FromStr for $ty {
            type Err = ChamberError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|member| member.as_scpi().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        ChamberError::InvalidArgument(format!(
                            "unknown {} mnemonic '{}'",
                            stringify!($ty),
                            wanted
                        ))
                    })
            }
        }
    };
}

wire_table!(DisplayFormat {
    LogMagnitude => "MLOG",
    Phase => "PHAS",
    Vswr => "VSWR",
    Smith => "SMIT",
});

wire_table!(SParameter {
    S11 => "S11",
    S12 => "S12",
    S21 => "S21",
    S22 => "S22",
});

wire_table!(TransferFormat {
    Real64 => "REAL",
    Real32 => "REAL32",
});

impl TransferFormat {
    /// Bytes per sample on the wire.
    pub fn element_width(&self) -> usize {
        match self {
            TransferFormat::Real64 => 8,
            TransferFormat::Real32 => 4,
        }
    }
}

pub(crate) fn start_frequency(channel: u32, hz: f64) -> String {
    format!(":SENS{}:FREQ:STAR {:.6}", channel, hz)
}

pub(crate) fn stop_frequency(channel: u32, hz: f64) -> String {
    format!(":SENS{}:FREQ:STOP {:.6}", channel, hz)
}

pub(crate) fn frequency_range(channel: u32, start_hz: f64, stop_hz: f64) -> String {
    format!(
        "{};{}",
        start_frequency(channel, start_hz),
        stop_frequency(channel, stop_hz)
    )
}

pub(crate) fn power_level(port: u32, dbm: f64) -> String {
    format!(":SOUR{}:POW {:.6}", port, dbm)
}

pub(crate) fn if_bandwidth(channel: u32, hz: f64) -> String {
    format!(":SENS{}:BWID {:.6}", channel, hz)
}

pub(crate) fn sample_points(channel: u32, points: u32) -> String {
    format!(":SENS{}:SWE:POIN {}", channel, points)
}

pub(crate) fn display_format(channel: u32, format: DisplayFormat) -> String {
    format!(":CALC{}:FORM {}", channel, format)
}

pub(crate) fn parameter(channel: u32, trace: u32, parameter: SParameter) -> String {
    format!(":CALC{}:PAR{}:DEF {}", channel, trace, parameter)
}

pub(crate) fn transfer_format(format: TransferFormat) -> String {
    format!(":FORM:DATA {}", format)
}
