//! NMEA-0183 decoder
//!
//! `$`-prefixed comma-separated sentences with an optional `*hh` XOR
//! checksum. The standard sentences are matched on their three-letter
//! type regardless of talker (GP, GN, GL...); Garmin's proprietary PGRMZ
//! supplies pressure altitude.

use crate::text::{read_line, scan_for, Line, Scan};
use chrono::Utc;
use hud_core::checksum::{nmea_xor, parse_hex2, to_hex2};
use hud_core::model::{AirSample, GpsFix, GpsSample, NavSample};
use hud_core::source::ByteSource;
use hud_core::units::{knots_to_mph, meters_to_feet, wrap_360, NM_TO_MILES};
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use tracing::{debug, trace};

pub const START: u8 = b'$';

/// NMEA caps sentences at 82 characters; leave room for sloppy talkers
const MAX_SENTENCE: usize = 120;
const MAX_SCAN: usize = 512;

/// Parse `ddmm.mmmm` / `dddmm.mmmm` with its hemisphere letter
pub fn parse_coord(value: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
    if value.len() <= degree_digits {
        return None;
    }
    let degrees: f64 = value.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = value.get(degree_digits..)?.parse().ok()?;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => Some(-decimal),
        "N" | "E" => Some(decimal),
        _ => None,
    }
}

fn num(s: Option<&&str>) -> Option<f64> {
    s.and_then(|v| v.parse().ok())
}

fn text(s: Option<&&str>) -> Option<String> {
    s.filter(|v| !v.is_empty()).map(|v| v.to_string())
}

/// Time-of-day field trimmed to `hhmmss`
fn utc(s: Option<&&str>) -> Option<String> {
    s.and_then(|v| v.get(..6)).map(str::to_string)
}

/// Split `$...*hh` into the body and verify its checksum. A sentence
/// without a checksum is accepted.
fn verify(sentence: &[u8]) -> Result<&[u8], ()> {
    match sentence.iter().rposition(|&b| b == b'*') {
        Some(star) => {
            let (body, rest) = sentence.split_at(star);
            match parse_hex2(rest.get(1..3).ok_or(())?) {
                Some(cs) if cs == nmea_xor(body) => Ok(body),
                _ => Err(()),
            }
        }
        None => Ok(sentence),
    }
}

#[derive(Debug, Default)]
pub struct NmeaDecoder {
    gps: GpsSample,
    nav: NavSample,
    air: AirSample,
    stats: DecoderStats,
}

impl NmeaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one checksum-verified sentence body. Returns false for
    /// sentence types we don't handle.
    fn apply(&mut self, fields: &[&str], out: &mut Vec<TelemetryUpdate>) -> bool {
        let id = fields[0];
        let kind = if id == "PGRMZ" {
            id
        } else if id.len() == 5 {
            match id.get(2..) {
                Some(k) => k,
                None => return false,
            }
        } else {
            return false;
        };
        let f = |i: usize| fields.get(i);
        let now = Utc::now();

        match kind {
            "RMC" => {
                let g = &mut self.gps;
                g.utc_time = utc(f(1));
                if f(2).copied() != Some("A") {
                    g.fix = GpsFix::Acquiring;
                } else if !g.fix.has_position() {
                    g.fix = GpsFix::Fix2D;
                }
                if let (Some(lat), Some(lon)) = (
                    f(3).zip(f(4)).and_then(|(v, h)| parse_coord(v, h, 2)),
                    f(5).zip(f(6)).and_then(|(v, h)| parse_coord(v, h, 3)),
                ) {
                    g.lat = Some(lat);
                    g.lon = Some(lon);
                }
                if let Some(kt) = num(f(7)) {
                    g.ground_speed = Some(knots_to_mph(kt));
                }
                if let Some(trk) = num(f(8)) {
                    g.ground_track = Some(wrap_360(trk));
                }
                if let Some(var) = num(f(10)) {
                    g.mag_decl = Some(if f(11).copied() == Some("W") { -var } else { var });
                }
                g.updated = Some(now);
                out.push(TelemetryUpdate::Gps(g.clone()));
            }
            "GGA" => {
                let g = &mut self.gps;
                g.utc_time = utc(f(1));
                if let (Some(lat), Some(lon)) = (
                    f(2).zip(f(3)).and_then(|(v, h)| parse_coord(v, h, 2)),
                    f(4).zip(f(5)).and_then(|(v, h)| parse_coord(v, h, 3)),
                ) {
                    g.lat = Some(lat);
                    g.lon = Some(lon);
                }
                let quality = num(f(6)).map(|q| q as u8);
                g.fix = match quality {
                    Some(0) | None => GpsFix::Acquiring,
                    Some(6) => GpsFix::DeadReckoning,
                    Some(_) => GpsFix::Fix3D,
                };
                g.waas = quality.map(|q| q == 2);
                g.sats = num(f(7)).map(|s| s as u32);
                if let Some(m) = num(f(9)) {
                    g.alt = Some(meters_to_feet(m));
                }
                g.updated = Some(now);
                out.push(TelemetryUpdate::Gps(g.clone()));
            }
            "GLL" => {
                let g = &mut self.gps;
                if let (Some(lat), Some(lon)) = (
                    f(1).zip(f(2)).and_then(|(v, h)| parse_coord(v, h, 2)),
                    f(3).zip(f(4)).and_then(|(v, h)| parse_coord(v, h, 3)),
                ) {
                    g.lat = Some(lat);
                    g.lon = Some(lon);
                }
                g.utc_time = utc(f(5)).or(g.utc_time.take());
                if f(6).copied() == Some("V") {
                    g.fix = GpsFix::Acquiring;
                }
                g.updated = Some(now);
                out.push(TelemetryUpdate::Gps(g.clone()));
            }
            "VTG" => {
                let g = &mut self.gps;
                if let Some(trk) = num(f(1)) {
                    g.ground_track = Some(wrap_360(trk));
                }
                if let Some(kt) = num(f(5)) {
                    g.ground_speed = Some(knots_to_mph(kt));
                }
                g.updated = Some(now);
                out.push(TelemetryUpdate::Gps(g.clone()));
            }
            "RMB" => {
                let n = &mut self.nav;
                if let Some(xte) = num(f(2)) {
                    n.cross_track = Some(if f(3).copied() == Some("L") { -xte } else { xte });
                }
                n.waypoint_name = text(f(5)).or(n.waypoint_name.take());
                if let Some(nm) = num(f(10)) {
                    n.waypoint_distance = Some(nm * NM_TO_MILES);
                }
                if let Some(brg) = num(f(11)) {
                    n.waypoint_track = Some(wrap_360(brg));
                }
                n.updated = Some(now);
                out.push(TelemetryUpdate::Nav(n.clone()));
            }
            "BOD" => {
                let n = &mut self.nav;
                if let Some(brg) = num(f(1)) {
                    n.waypoint_track = Some(wrap_360(brg));
                }
                n.waypoint_name = text(f(5)).or(n.waypoint_name.take());
                n.updated = Some(now);
                out.push(TelemetryUpdate::Nav(n.clone()));
            }
            "BWC" => {
                let n = &mut self.nav;
                if let Some(brg) = num(f(6)) {
                    n.waypoint_track = Some(wrap_360(brg));
                }
                if let Some(nm) = num(f(10)) {
                    n.waypoint_distance = Some(nm * NM_TO_MILES);
                }
                n.waypoint_name = text(f(12)).or(n.waypoint_name.take());
                n.updated = Some(now);
                out.push(TelemetryUpdate::Nav(n.clone()));
            }
            "XTE" => {
                let n = &mut self.nav;
                if let Some(xte) = num(f(3)) {
                    n.cross_track = Some(if f(4).copied() == Some("L") { -xte } else { xte });
                }
                n.updated = Some(now);
                out.push(TelemetryUpdate::Nav(n.clone()));
            }
            "PGRMZ" => {
                let a = &mut self.air;
                if let Some(alt) = num(f(1)) {
                    let ft = if f(2).copied() == Some("M") { meters_to_feet(alt) } else { alt };
                    a.pressure_alt = Some(ft);
                    if let Some(baro) = a.baro {
                        a.apply_baro(baro);
                    }
                }
                a.updated = Some(now);
                out.push(TelemetryUpdate::Air(a.clone()));
            }
            _ => return false,
        }
        true
    }
}

impl TelemetryDecoder for NmeaDecoder {
    fn name(&self) -> &str {
        "NMEA-0183"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Gps, SampleKind::Nav, SampleKind::Air]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        match scan_for(source, &[START], MAX_SCAN)? {
            Scan::Found(_) => {}
            Scan::Idle => return Ok(source.idle_outcome()),
            Scan::Limit => return Ok(DecodeOutcome::NoFrame),
        }

        let sentence = match read_line(source, b'\n', MAX_SENTENCE)? {
            Line::Complete(s) => s,
            Line::Short(_) => {
                self.stats.short_reads += 1;
                return Ok(DecodeOutcome::NoFrame);
            }
            Line::Overlong => {
                self.stats.bad += 1;
                debug!("NMEA sentence without line end");
                return Ok(DecodeOutcome::BadFrame);
            }
        };
        let Ok(body) = verify(&sentence) else {
            self.stats.bad += 1;
            debug!(sentence = %String::from_utf8_lossy(&sentence), "NMEA checksum mismatch");
            return Ok(DecodeOutcome::BadFrame);
        };
        // NMEA is 7-bit ASCII
        if !body.is_ascii() {
            self.stats.bad += 1;
            debug!("NMEA sentence with non-ASCII bytes");
            return Ok(DecodeOutcome::BadFrame);
        }
        let Ok(body) = std::str::from_utf8(body) else {
            self.stats.bad += 1;
            return Ok(DecodeOutcome::BadFrame);
        };

        let fields: Vec<&str> = body.split(',').collect();
        if self.apply(&fields, out) {
            self.stats.frames += 1;
            Ok(DecodeOutcome::FrameApplied)
        } else {
            self.stats.unknown += 1;
            trace!(id = fields[0], "unhandled NMEA sentence");
            Ok(DecodeOutcome::NoFrame)
        }
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

/// Wrap a sentence body as `$body*hh\r\n`, for tests and simulators
pub fn encode_sentence(body: &str) -> Vec<u8> {
    let mut s = Vec::with_capacity(body.len() + 6);
    s.push(START);
    s.extend_from_slice(body.as_bytes());
    s.push(b'*');
    s.extend_from_slice(&to_hex2(nmea_xor(body.as_bytes())));
    s.extend_from_slice(b"\r\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn run(bytes: Vec<u8>) -> (NmeaDecoder, Vec<TelemetryUpdate>, Vec<DecodeOutcome>) {
        let mut dec = NmeaDecoder::new();
        let mut src = MemorySource::live(bytes);
        let mut out = Vec::new();
        let mut outcomes = Vec::new();
        while src.remaining() > 0 {
            outcomes.push(dec.decode(&mut src, &mut out).unwrap());
        }
        (dec, out, outcomes)
    }

    fn gps(u: &TelemetryUpdate) -> &GpsSample {
        match u {
            TelemetryUpdate::Gps(g) => g,
            other => panic!("expected gps, got {:?}", other.kind()),
        }
    }

    fn nav(u: &TelemetryUpdate) -> &NavSample {
        match u {
            TelemetryUpdate::Nav(n) => n,
            other => panic!("expected nav, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_parse_coord() {
        let lat = parse_coord("4807.038", "N", 2).unwrap();
        assert!((lat - (48.0 + 7.038 / 60.0)).abs() < 1e-12);
        let lon = parse_coord("01131.000", "W", 3).unwrap();
        assert!((lon + (11.0 + 31.0 / 60.0)).abs() < 1e-12);
        assert_eq!(parse_coord("", "N", 2), None);
        assert_eq!(parse_coord("4807.038", "", 2), None);
    }

    #[test]
    fn test_known_checksum_sentence() {
        let raw = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n".to_vec();
        let (dec, out, outcomes) = run(raw);
        assert_eq!(outcomes, vec![DecodeOutcome::FrameApplied]);
        let g = gps(&out[0]);
        assert_eq!(g.fix, GpsFix::Fix3D);
        assert_eq!(g.waas, Some(false));
        assert_eq!(g.sats, Some(8));
        assert!((g.alt.unwrap() - 545.4 * 3.28084).abs() < 1e-9);
        assert_eq!(g.utc_time.as_deref(), Some("123519"));
        assert_eq!(dec.stats().frames, 1);
    }

    #[test]
    fn test_rmc_any_talker() {
        let s = encode_sentence("GNRMC,225446,A,4916.45,N,12311.12,W,000.5,054.7,191194,020.3,E");
        let (_, out, _) = run(s);
        let g = gps(&out[0]);
        assert!((g.lat.unwrap() - (49.0 + 16.45 / 60.0)).abs() < 1e-9);
        assert!((g.lon.unwrap() + (123.0 + 11.12 / 60.0)).abs() < 1e-9);
        assert!((g.ground_speed.unwrap() - 0.5 * 1.15078).abs() < 1e-9);
        assert_eq!(g.ground_track, Some(54.7));
        assert_eq!(g.mag_decl, Some(20.3));
        assert!(g.fix.has_position());
    }

    #[test]
    fn test_gga_fix_mapping() {
        for (q, fix, waas) in [
            ("0", GpsFix::Acquiring, false),
            ("1", GpsFix::Fix3D, false),
            ("2", GpsFix::Fix3D, true),
            ("6", GpsFix::DeadReckoning, false),
        ] {
            let body = format!("GPGGA,000000,3700.000,N,12200.000,W,{q},05,1.0,10.0,M,,M,,");
            let (_, out, _) = run(encode_sentence(&body));
            let g = gps(&out[0]);
            assert_eq!(g.fix, fix, "quality {q}");
            assert_eq!(g.waas, Some(waas));
        }
    }

    #[test]
    fn test_checksum_mismatch_discards() {
        let mut s = encode_sentence("GPVTG,054.7,T,034.4,M,005.5,N,010.2,K");
        let star = s.iter().position(|&b| b == b'*').unwrap();
        s[star + 2] = if s[star + 2] == b'0' { b'1' } else { b'0' };
        let (dec, out, outcomes) = run(s);
        assert_eq!(outcomes, vec![DecodeOutcome::BadFrame]);
        assert!(out.is_empty());
        assert_eq!(dec.stats().bad, 1);
        assert_eq!(dec.gps, GpsSample::default());
    }

    #[test]
    fn test_rmb_and_xte() {
        let mut bytes =
            encode_sentence("GPRMB,A,0.66,L,003,004,4917.24,N,12309.57,W,001.3,052.5,000.5,V");
        bytes.extend(encode_sentence("GPXTE,A,A,0.67,R,N"));
        let (_, out, _) = run(bytes);
        let n = nav(&out[0]);
        assert_eq!(n.cross_track, Some(-0.66));
        assert_eq!(n.waypoint_name.as_deref(), Some("004"));
        assert!((n.waypoint_distance.unwrap() - 1.3 * 1.15078).abs() < 1e-9);
        assert_eq!(n.waypoint_track, Some(52.5));
        let n = nav(&out[1]);
        assert_eq!(n.cross_track, Some(0.67));
        assert_eq!(n.waypoint_name.as_deref(), Some("004"));
    }

    #[test]
    fn test_bod_and_bwc() {
        let mut bytes = encode_sentence("GPBOD,099.3,T,105.6,M,POINTB,POINTA");
        bytes.extend(encode_sentence(
            "GPBWC,220516,5130.02,N,00046.34,W,213.8,T,218.0,M,0004.6,N,EGLM",
        ));
        let (_, out, _) = run(bytes);
        assert_eq!(nav(&out[0]).waypoint_track, Some(99.3));
        assert_eq!(nav(&out[0]).waypoint_name.as_deref(), Some("POINTB"));
        let n = nav(&out[1]);
        assert_eq!(n.waypoint_track, Some(213.8));
        assert_eq!(n.waypoint_name.as_deref(), Some("EGLM"));
    }

    #[test]
    fn test_gll_southern_hemisphere() {
        let (_, out, _) = run(encode_sentence("GPGLL,3351.000,S,15112.000,E,010203,A"));
        let g = gps(&out[0]);
        assert!((g.lat.unwrap() + 33.85).abs() < 1e-9);
        assert!((g.lon.unwrap() - 151.2).abs() < 1e-9);
        assert_eq!(g.utc_time.as_deref(), Some("010203"));
    }

    #[test]
    fn test_pgrmz_pressure_altitude() {
        let (_, out, _) = run(encode_sentence("PGRMZ,2282,f,3"));
        let TelemetryUpdate::Air(a) = &out[0] else { panic!("expected air") };
        assert_eq!(a.pressure_alt, Some(2282.0));
    }

    #[test]
    fn test_unknown_sentence() {
        let (dec, out, outcomes) = run(encode_sentence("GPGSV,1,1,00"));
        assert_eq!(outcomes, vec![DecodeOutcome::NoFrame]);
        assert!(out.is_empty());
        assert_eq!(dec.stats().unknown, 1);
    }

    #[test]
    fn test_non_ascii_sentence_is_bad_frame() {
        let mut bytes = encode_sentence("GPRMC,12345\u{e9},A,4807.038,N,01131.000,E,022.4,084.4,230394,,");
        bytes.extend(b"$GPRMC,12345\xc3\xa9,A,4807.038,N,01131.000,E,022.4,084.4,230394,,\r\n");
        bytes.extend(encode_sentence("GPGLL,3351.000,S,15112.000,E,0102,A"));
        let (dec, out, outcomes) = run(bytes);
        assert_eq!(
            outcomes,
            vec![DecodeOutcome::BadFrame, DecodeOutcome::BadFrame, DecodeOutcome::FrameApplied]
        );
        assert_eq!(dec.stats().bad, 2);
        // short time field is dropped, not sliced
        assert_eq!(gps(&out[0]).utc_time, None);
    }

    #[test]
    fn test_partial_sentence_is_short_read() {
        let (dec, _, _) = run(b"$GPGGA,1235".to_vec());
        assert_eq!(dec.stats().short_reads, 1);
        assert_eq!(dec.stats().bad, 0);
    }
}
