//! Telemetry decoder trait definition

use crate::model::{AirSample, AttitudeSample, EngineSample, FuelSample, GpsSample, NavSample, Target};
use crate::source::{ByteSource, SourceError};
use serde::{Deserialize, Serialize};

/// Result of one `decode` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOutcome {
    /// A complete, valid frame produced at least one update
    FrameApplied,
    /// Nothing usable yet (timeout, resync, unknown message type)
    NoFrame,
    /// Frame failed its checksum or length check
    BadFrame,
    /// A playback source hit end of data and was rewound
    SourceExhausted,
}

/// Per-decoder diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    pub frames: u64,
    pub bad: u64,
    pub unknown: u64,
    pub short_reads: u64,
    pub header_mismatches: u64,
}

/// The sample collections a decoder writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Attitude,
    Air,
    Gps,
    Nav,
    Engine,
    Fuel,
    Traffic,
}

/// A complete sample snapshot pushed by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryUpdate {
    Attitude(AttitudeSample),
    Air(AirSample),
    Gps(GpsSample),
    Nav(NavSample),
    Engine(EngineSample),
    Fuel(FuelSample),
    Target(Target),
}

impl TelemetryUpdate {
    pub fn kind(&self) -> SampleKind {
        match self {
            TelemetryUpdate::Attitude(_) => SampleKind::Attitude,
            TelemetryUpdate::Air(_) => SampleKind::Air,
            TelemetryUpdate::Gps(_) => SampleKind::Gps,
            TelemetryUpdate::Nav(_) => SampleKind::Nav,
            TelemetryUpdate::Engine(_) => SampleKind::Engine,
            TelemetryUpdate::Fuel(_) => SampleKind::Fuel,
            TelemetryUpdate::Target(_) => SampleKind::Traffic,
        }
    }
}

/// Trait for protocol-specific telemetry decoders
///
/// Each decoder is a small state machine that:
/// - Pulls bytes from a [`ByteSource`] until it has at most one frame
/// - Validates framing and checksum
/// - Converts the payload into canonical units and pushes sample snapshots
///
/// Decoders own their samples. The aircraft context keeps the latest
/// snapshot of each, one slot per declared [`SampleKind`].
pub trait TelemetryDecoder: Send {
    /// Protocol name (e.g., "MGL iEFIS", "Garmin G3X")
    fn name(&self) -> &str;

    /// Sample kinds this decoder fills, fixed for its lifetime
    fn provides(&self) -> &'static [SampleKind];

    /// Process at most one frame.
    ///
    /// Returns:
    /// - `Ok(outcome)` for every frame-level result, good or bad
    /// - `Err(_)` only when the byte source itself failed; the caller
    ///   should stop reading this input
    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError>;

    /// Counters accumulated since construction
    fn stats(&self) -> DecoderStats;
}
