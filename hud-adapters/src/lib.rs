//! Avionics protocol decoders and byte sources

pub mod g3x;
pub mod grt_eis;
pub mod layout;
pub mod mgl;
pub mod nmea;
pub mod protocol;
pub mod skyview;
pub mod source;
pub mod stratux;
pub mod text;

pub use g3x::G3xDecoder;
pub use grt_eis::GrtEisDecoder;
pub use mgl::MglDecoder;
pub use nmea::NmeaDecoder;
pub use protocol::{DecoderOptions, Protocol};
pub use skyview::SkyviewDecoder;
pub use source::{CaptureSource, FileSource, MemorySource, SerialSource, UdpSource};
pub use stratux::StratuxDecoder;
