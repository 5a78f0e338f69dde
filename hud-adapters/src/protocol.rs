//! Protocol selection and per-protocol defaults

use crate::g3x::{G3xDecoder, EOL_LIVE, EOL_PLAYBACK};
use crate::grt_eis::GrtEisDecoder;
use crate::mgl::MglDecoder;
use crate::nmea::NmeaDecoder;
use crate::skyview::SkyviewDecoder;
use crate::stratux::StratuxDecoder;
use anyhow::anyhow;
use hud_core::TelemetryDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Mgl,
    G3x,
    Skyview,
    Stratux,
    Nmea,
    GrtEis,
}

/// Decoder knobs that only some protocols look at
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    /// Line terminator for G3X
    pub eol: u8,
    /// G3X AOA / slip smoothing
    pub smoothing: bool,
    /// GDL-90 CRC check
    pub verify_crc: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            eol: EOL_LIVE,
            smoothing: true,
            verify_crc: true,
        }
    }
}

impl DecoderOptions {
    /// Defaults for a playback source, where captures end lines in LF
    pub fn playback() -> Self {
        Self {
            eol: EOL_PLAYBACK,
            ..Self::default()
        }
    }
}

impl Protocol {
    pub const ALL: [Protocol; 6] = [
        Protocol::Mgl,
        Protocol::G3x,
        Protocol::Skyview,
        Protocol::Stratux,
        Protocol::Nmea,
        Protocol::GrtEis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Mgl => "mgl",
            Protocol::G3x => "g3x",
            Protocol::Skyview => "skyview",
            Protocol::Stratux => "stratux",
            Protocol::Nmea => "nmea",
            Protocol::GrtEis => "grt_eis",
        }
    }

    /// Serial baud rate when none is configured
    pub fn default_baud(&self) -> usize {
        match self {
            Protocol::Mgl | Protocol::G3x | Protocol::Skyview => 115_200,
            Protocol::Nmea => 4800,
            Protocol::GrtEis => 9600,
            // Stratux is UDP; the rate only matters for a serial GDL-90 box
            Protocol::Stratux => 115_200,
        }
    }

    /// Pause after each applied frame when replaying a capture, close to
    /// the device's native output rate
    pub fn default_playback_delay(&self) -> Duration {
        Duration::from_millis(match self {
            Protocol::Mgl | Protocol::G3x => 10,
            Protocol::Nmea => 50,
            Protocol::Skyview | Protocol::Stratux | Protocol::GrtEis => 80,
        })
    }

    pub fn decoder(&self, opts: &DecoderOptions) -> Box<dyn TelemetryDecoder> {
        match self {
            Protocol::Mgl => Box::new(MglDecoder::new()),
            Protocol::G3x => Box::new(G3xDecoder::new(opts.eol, opts.smoothing)),
            Protocol::Skyview => Box::new(SkyviewDecoder::new()),
            Protocol::Stratux => Box::new(StratuxDecoder::new(opts.verify_crc)),
            Protocol::Nmea => Box::new(NmeaDecoder::new()),
            Protocol::GrtEis => Box::new(GrtEisDecoder::new()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .or(match s.as_str() {
                "grt" | "eis" => Some(Protocol::GrtEis),
                "gdl90" | "levil" => Some(Protocol::Stratux),
                "dynon" => Some(Protocol::Skyview),
                "garmin" => Some(Protocol::G3x),
                _ => None,
            })
            .ok_or_else(|| anyhow!("unknown protocol '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hud_core::SampleKind;

    #[test]
    fn test_parse_names_and_aliases() {
        for p in Protocol::ALL {
            assert_eq!(p.as_str().parse::<Protocol>().unwrap(), p);
        }
        assert_eq!("GRT".parse::<Protocol>().unwrap(), Protocol::GrtEis);
        assert_eq!(" gdl90 ".parse::<Protocol>().unwrap(), Protocol::Stratux);
        assert!("avidyne".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Protocol::Nmea.default_baud(), 4800);
        assert_eq!(Protocol::GrtEis.default_baud(), 9600);
        assert_eq!(Protocol::Skyview.default_playback_delay(), Duration::from_millis(80));
        assert_eq!(Protocol::G3x.default_playback_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_decoder_factory() {
        let opts = DecoderOptions::default();
        let d = Protocol::Stratux.decoder(&opts);
        assert!(d.provides().contains(&SampleKind::Traffic));
        let d = Protocol::GrtEis.decoder(&opts);
        assert_eq!(d.name(), "GRT EIS");
        assert!(d.provides().contains(&SampleKind::Engine));
    }
}
