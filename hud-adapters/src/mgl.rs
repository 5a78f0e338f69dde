//! MGL Avionics iEFIS binary decoder
//!
//! Frame: `0x05` sync, `0x02` STX, a six byte header
//! `{len, len ^ 0xFF, type, rate, count, version}` and a little-endian
//! payload whose size depends on the message type.

use crate::layout::{Endian, Field, FieldType::*, FrameLayout};
use chrono::Utc;
use hud_core::model::{AirSample, AttitudeSample, NavSample};
use hud_core::source::ByteSource;
use hud_core::units::{wrap_360, MGL_ASI_TO_MPH, METERS_TO_MILES};
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use tracing::{debug, trace};

pub const SYNC: u8 = 0x05;
pub const STX: u8 = 0x02;

pub const MSG_PRIMARY: u8 = 1;
pub const MSG_ATTITUDE: u8 = 3;
pub const MSG_NAV: u8 = 4;
pub const MSG_TRAFFIC: u8 = 6;
pub const MSG_NAV_EXT: u8 = 30;

/// Bytes scanned for a sync byte before giving control back
const MAX_SCAN: usize = 512;

// ============================================================================
// Payload layouts
// ============================================================================

pub mod attitude {
    use super::*;
    pub const HEADING: Field = Field::new("heading_mag", 0, U16);
    pub const PITCH: Field = Field::new("pitch", 2, I16);
    pub const BANK: Field = Field::new("bank", 4, I16);
    pub const YAW: Field = Field::new("yaw", 6, I16);
    pub const TURN_RATE: Field = Field::new("turn_rate", 8, I16);
    pub const SLIP: Field = Field::new("slip", 10, I16);
    pub const G_FORCE: Field = Field::new("g_force", 12, I16);
    pub const LR_FORCE: Field = Field::new("lr_force", 14, I16);
    pub const FR_FORCE: Field = Field::new("fr_force", 16, I16);
    pub const BANK_RATE: Field = Field::new("bank_rate", 18, I16);
    pub const PITCH_RATE: Field = Field::new("pitch_rate", 20, I16);
    pub const YAW_RATE: Field = Field::new("yaw_rate", 22, I16);
    pub const SENSOR_FLAGS: Field = Field::new("sensor_flags", 24, U8);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "mgl_attitude",
        len: 25,
        endian: Endian::Little,
        fields: &[
            HEADING, PITCH, BANK, YAW, TURN_RATE, SLIP, G_FORCE, LR_FORCE, FR_FORCE, BANK_RATE,
            PITCH_RATE, YAW_RATE, SENSOR_FLAGS,
        ],
    };
}

pub mod primary {
    use super::*;
    pub const PRESS_ALT: Field = Field::new("press_alt", 0, I32);
    pub const BARO_ALT: Field = Field::new("baro_alt", 4, I32);
    pub const ASI: Field = Field::new("asi", 8, U16);
    pub const TAS: Field = Field::new("tas", 10, U16);
    pub const AOA: Field = Field::new("aoa", 12, I16);
    pub const VSI: Field = Field::new("vsi", 14, I16);
    pub const BARO: Field = Field::new("baro", 16, U16);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "mgl_primary",
        len: 18,
        endian: Endian::Little,
        fields: &[PRESS_ALT, BARO_ALT, ASI, TAS, AOA, VSI, BARO],
    };
}

pub mod traffic {
    use super::*;
    pub const COUNT: Field = Field::new("count", 0, U8);
    pub const ALERTS: Field = Field::new("alerts", 1, U8);
    pub const NEAREST_ALERT: Field = Field::new("nearest_alert", 2, U8);
    pub const RESERVED: Field = Field::new("reserved", 3, U8);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "mgl_traffic",
        len: 4,
        endian: Endian::Little,
        fields: &[COUNT, ALERTS, NEAREST_ALERT, RESERVED],
    };
}

pub mod nav {
    use super::*;
    pub const FLAGS: Field = Field::new("flags", 0, U16);
    pub const HSI_SOURCE: Field = Field::new("hsi_source", 2, U8);
    pub const VNAV_SOURCE: Field = Field::new("vnav_source", 3, U8);
    pub const AP_MODE: Field = Field::new("ap_mode", 4, U8);
    pub const PAD: Field = Field::new("pad", 5, U8);
    pub const NEEDLE_ANGLE: Field = Field::new("hsi_needle_angle", 6, I16);
    pub const ROSE_HEADING: Field = Field::new("hsi_rose_heading", 8, U16);
    pub const DEVIATION: Field = Field::new("hsi_deviation", 10, I16);
    pub const VERT_DEVIATION: Field = Field::new("vertical_deviation", 12, I16);
    pub const HEADING_BUG: Field = Field::new("heading_bug", 14, I16);
    pub const ALTITUDE_BUG: Field = Field::new("altitude_bug", 16, I32);
    pub const WP_DISTANCE: Field = Field::new("wp_distance", 20, I32);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "mgl_nav",
        len: 24,
        endian: Endian::Little,
        fields: &[
            FLAGS, HSI_SOURCE, VNAV_SOURCE, AP_MODE, PAD, NEEDLE_ANGLE, ROSE_HEADING, DEVIATION,
            VERT_DEVIATION, HEADING_BUG, ALTITUDE_BUG, WP_DISTANCE,
        ],
    };
}

/// Full-scale HSI / vertical deviation
const DEVIATION_FULL_SCALE: f64 = 127.0;

/// Millibars to inHg
const MBAR_TO_INHG: f64 = 0.0295300;

fn payload_layout(msg_type: u8) -> Option<&'static FrameLayout> {
    match msg_type {
        MSG_PRIMARY => Some(&primary::LAYOUT),
        MSG_ATTITUDE => Some(&attitude::LAYOUT),
        MSG_TRAFFIC => Some(&traffic::LAYOUT),
        MSG_NAV | MSG_NAV_EXT => Some(&nav::LAYOUT),
        _ => None,
    }
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Debug, Default)]
pub struct MglDecoder {
    att: AttitudeSample,
    air: AirSample,
    nav: NavSample,
    traffic_count: Option<u8>,
    stats: DecoderStats,
}

impl MglDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets reported by the last traffic summary
    pub fn traffic_count(&self) -> Option<u8> {
        self.traffic_count
    }

    fn apply_attitude(&mut self, p: &[u8], out: &mut Vec<TelemetryUpdate>) {
        use attitude::*;
        let l = &LAYOUT;
        let a = &mut self.att;
        a.heading = Some(wrap_360(l.f64(p, &HEADING) / 10.0));
        a.pitch = Some(l.f64(p, &PITCH) / 10.0);
        a.roll = Some(l.f64(p, &BANK) / 10.0);
        a.yaw = Some(l.f64(p, &YAW) / 10.0);
        a.turn_rate = Some(l.f64(p, &TURN_RATE) / 10.0);
        a.slip_skid = Some(l.f64(p, &SLIP) / 100.0);
        a.vert_g = Some(l.f64(p, &G_FORCE) / 100.0);
        a.roll_rate = Some(l.f64(p, &BANK_RATE) / 10.0);
        a.pitch_rate = Some(l.f64(p, &PITCH_RATE) / 10.0);
        a.yaw_rate = Some(l.f64(p, &YAW_RATE) / 10.0);
        a.mark_updated(Utc::now());
        out.push(TelemetryUpdate::Attitude(a.clone()));
    }

    fn apply_primary(&mut self, p: &[u8], out: &mut Vec<TelemetryUpdate>) {
        use primary::*;
        let l = &LAYOUT;
        let a = &mut self.air;
        a.pressure_alt = Some(l.f64(p, &PRESS_ALT));
        a.alt = Some(l.f64(p, &BARO_ALT));
        let asi = l.f64(p, &ASI);
        if asi > 0.0 {
            a.ias = Some(asi * MGL_ASI_TO_MPH);
        } else {
            a.ias = Some(0.0);
        }
        let tas = l.f64(p, &TAS);
        a.tas = Some(if tas > 0.0 { tas * MGL_ASI_TO_MPH } else { 0.0 });
        a.aoa = Some(l.f64(p, &AOA));
        a.vsi = Some(l.f64(p, &VSI));
        let baro_inhg = l.f64(p, &BARO) / 10.0 * MBAR_TO_INHG;
        a.baro = Some(baro_inhg);
        a.baro_diff = Some(hud_core::units::baro_diff(baro_inhg));
        a.updated = Some(Utc::now());
        out.push(TelemetryUpdate::Air(a.clone()));
    }

    fn apply_nav(&mut self, p: &[u8], out: &mut Vec<TelemetryUpdate>) {
        use nav::*;
        let l = &LAYOUT;
        let n = &mut self.nav;
        let ap_mode = l.get(p, &AP_MODE).unwrap_or(0);
        n.ap_roll.engaged = Some(ap_mode & 0x01 != 0);
        n.ap_pitch.engaged = Some(ap_mode & 0x02 != 0);
        n.hsi_source = Some(l.get(p, &HSI_SOURCE).unwrap_or(0) as u8);
        n.waypoint_track = Some(wrap_360(l.f64(p, &NEEDLE_ANGLE)));
        n.cdi_deflection = Some(l.f64(p, &DEVIATION) * 100.0 / DEVIATION_FULL_SCALE);
        n.gs_deflection = Some(l.f64(p, &VERT_DEVIATION) * 100.0 / DEVIATION_FULL_SCALE);
        n.heading_bug = Some(wrap_360(l.f64(p, &HEADING_BUG)));
        n.altitude_bug = Some(l.f64(p, &ALTITUDE_BUG));
        n.waypoint_distance = Some(l.f64(p, &WP_DISTANCE) * METERS_TO_MILES);
        n.updated = Some(Utc::now());
        out.push(TelemetryUpdate::Nav(n.clone()));
    }
}

impl TelemetryDecoder for MglDecoder {
    fn name(&self) -> &str {
        "MGL iEFIS"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Attitude, SampleKind::Air, SampleKind::Nav]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        let mut scanned = 0;
        loop {
            match source.read_byte()? {
                None => return Ok(source.idle_outcome()),
                Some(SYNC) => break,
                Some(_) if scanned >= MAX_SCAN => return Ok(DecodeOutcome::NoFrame),
                Some(_) => scanned += 1,
            }
        }

        // a repeated sync byte may itself start the frame
        loop {
            match source.read_byte()? {
                Some(STX) => break,
                Some(SYNC) if scanned < MAX_SCAN => scanned += 1,
                Some(other) => {
                    trace!(byte = other, "sync without STX, resyncing");
                    return Ok(DecodeOutcome::NoFrame);
                }
                None => {
                    self.stats.short_reads += 1;
                    return Ok(DecodeOutcome::NoFrame);
                }
            }
        }

        let header = source.read_up_to(6)?;
        if header.len() < 6 {
            self.stats.short_reads += 1;
            return Ok(DecodeOutcome::NoFrame);
        }
        let (len, len_xor, msg_type) = (header[0], header[1], header[2]);
        if len ^ 0xFF != len_xor {
            self.stats.header_mismatches += 1;
            debug!(len, len_xor, msg_type, "MGL header length check mismatch");
        }

        let Some(layout) = payload_layout(msg_type) else {
            self.stats.unknown += 1;
            trace!(msg_type, "unhandled MGL message");
            return Ok(DecodeOutcome::NoFrame);
        };

        let payload = source.read_up_to(layout.len)?;
        if payload.len() < layout.len {
            self.stats.short_reads += 1;
            return Ok(DecodeOutcome::NoFrame);
        }

        match msg_type {
            MSG_ATTITUDE => self.apply_attitude(&payload, out),
            MSG_PRIMARY => self.apply_primary(&payload, out),
            MSG_NAV | MSG_NAV_EXT => self.apply_nav(&payload, out),
            MSG_TRAFFIC => {
                let count = traffic::LAYOUT.get(&payload, &traffic::COUNT).unwrap_or(0) as u8;
                trace!(count, "MGL traffic summary");
                self.traffic_count = Some(count);
            }
            _ => {}
        }
        self.stats.frames += 1;
        Ok(DecodeOutcome::FrameApplied)
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

/// Build a complete frame, for tests and simulators
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u8;
    let mut frame = vec![SYNC, STX, len, len ^ 0xFF, msg_type, 1, 0, 1];
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn decode_all(bytes: Vec<u8>) -> (MglDecoder, Vec<TelemetryUpdate>, Vec<DecodeOutcome>) {
        let mut dec = MglDecoder::new();
        let mut src = MemorySource::live(bytes);
        let mut out = Vec::new();
        let mut outcomes = Vec::new();
        for _ in 0..10 {
            let o = dec.decode(&mut src, &mut out).unwrap();
            outcomes.push(o);
            if src.remaining() == 0 {
                break;
            }
        }
        (dec, out, outcomes)
    }

    #[test]
    fn test_layouts_valid() {
        for l in [&attitude::LAYOUT, &primary::LAYOUT, &traffic::LAYOUT, &nav::LAYOUT] {
            l.validate().unwrap();
        }
    }

    #[test]
    fn test_attitude_frame() {
        use attitude::*;
        let payload = LAYOUT.encode(&[(&HEADING, 2705), (&PITCH, -50), (&BANK, 155), (&TURN_RATE, 30)]);
        let (dec, out, _) = decode_all(encode_frame(MSG_ATTITUDE, &payload));
        let TelemetryUpdate::Attitude(a) = &out[0] else { panic!("expected attitude") };
        assert_eq!(a.heading, Some(270.5));
        assert_eq!(a.pitch, Some(-5.0));
        assert_eq!(a.roll, Some(15.5));
        assert_eq!(a.turn_rate, Some(3.0));
        assert_eq!(dec.stats().frames, 1);
    }

    #[test]
    fn test_primary_frame_scales_airspeed() {
        use primary::*;
        let payload = LAYOUT.encode(&[(&PRESS_ALT, 4500), (&BARO_ALT, 4520), (&ASI, 2000), (&VSI, -300), (&BARO, 10132)]);
        let (_, out, _) = decode_all(encode_frame(MSG_PRIMARY, &payload));
        let TelemetryUpdate::Air(a) = &out[0] else { panic!("expected air") };
        assert!((a.ias.unwrap() - 2000.0 * MGL_ASI_TO_MPH).abs() < 1e-9);
        assert_eq!(a.pressure_alt, Some(4500.0));
        assert_eq!(a.vsi, Some(-300.0));
        assert!((a.baro.unwrap() - 29.92).abs() < 0.01);
    }

    #[test]
    fn test_zero_airspeed_not_scaled() {
        let payload = primary::LAYOUT.encode(&[]);
        let (_, out, _) = decode_all(encode_frame(MSG_PRIMARY, &payload));
        let TelemetryUpdate::Air(a) = &out[0] else { panic!("expected air") };
        assert_eq!(a.ias, Some(0.0));
    }

    #[test]
    fn test_nav_frame() {
        use nav::*;
        let payload = LAYOUT.encode(&[(&HEADING_BUG, 180), (&ALTITUDE_BUG, 6500), (&AP_MODE, 3), (&DEVIATION, -127)]);
        let (_, out, _) = decode_all(encode_frame(MSG_NAV_EXT, &payload));
        let TelemetryUpdate::Nav(n) = &out[0] else { panic!("expected nav") };
        assert_eq!(n.heading_bug, Some(180.0));
        assert_eq!(n.altitude_bug, Some(6500.0));
        assert_eq!(n.ap_roll.engaged, Some(true));
        assert_eq!(n.cdi_deflection, Some(-100.0));
    }

    #[test]
    fn test_traffic_summary_counts_frame() {
        let (dec, out, outcomes) = decode_all(encode_frame(MSG_TRAFFIC, &[3, 0, 0, 0]));
        assert!(out.is_empty());
        assert_eq!(outcomes[0], DecodeOutcome::FrameApplied);
        assert_eq!(dec.traffic_count(), Some(3));
    }

    #[test]
    fn test_header_mismatch_counted_but_applied() {
        let payload = attitude::LAYOUT.encode(&[(&attitude::PITCH, 10)]);
        let mut frame = encode_frame(MSG_ATTITUDE, &payload);
        frame[3] = 0x00;
        let (dec, out, _) = decode_all(frame);
        assert_eq!(dec.stats().header_mismatches, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_resync_after_garbage() {
        let payload = attitude::LAYOUT.encode(&[(&attitude::PITCH, 10)]);
        let mut bytes = vec![0xAA, 0x05, 0x99, 0x13];
        bytes.extend(encode_frame(MSG_ATTITUDE, &payload));
        let (_, out, outcomes) = decode_all(bytes);
        assert_eq!(outcomes[0], DecodeOutcome::NoFrame);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_doubled_sync_byte_keeps_frame() {
        let payload = attitude::LAYOUT.encode(&[(&attitude::PITCH, 10)]);
        let mut bytes = vec![SYNC];
        bytes.extend(encode_frame(MSG_ATTITUDE, &payload));
        let (dec, out, outcomes) = decode_all(bytes);
        assert_eq!(outcomes[0], DecodeOutcome::FrameApplied);
        assert_eq!(dec.stats().frames, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unknown_type_counted() {
        let (dec, out, _) = decode_all(encode_frame(0x42, &[0; 8]));
        assert_eq!(dec.stats().unknown, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_payload_is_short_read() {
        let payload = attitude::LAYOUT.encode(&[]);
        let mut frame = encode_frame(MSG_ATTITUDE, &payload);
        frame.truncate(frame.len() - 5);
        let (dec, out, _) = decode_all(frame);
        assert_eq!(dec.stats().short_reads, 1);
        assert_eq!(dec.stats().bad, 0);
        assert!(out.is_empty());
    }
}
