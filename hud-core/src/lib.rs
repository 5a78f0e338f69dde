//! HUD Core Library
//!
//! This crate provides the aircraft data model, the decoder and byte-source
//! contracts, traffic target fusion and the unit/navigation math shared by
//! every avionics protocol decoder.

pub mod aircraft;
pub mod checksum;
pub mod decoder;
pub mod geomag;
pub mod model;
pub mod navmath;
pub mod source;
pub mod targets;
pub mod units;

pub use aircraft::{Aircraft, AircraftDelta, SampleSlots};
pub use decoder::{DecodeOutcome, DecoderStats, SampleKind, TelemetryDecoder, TelemetryUpdate};
pub use model::{FieldMask, FieldSource};
pub use source::{ByteSource, SourceError, SourceKind};
pub use targets::{BuoyPlacement, BuoySpeed, OwnshipFix, TargetSet};
