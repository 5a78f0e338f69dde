//! Stratux / GDL-90 decoder
//!
//! Frames are delimited by `0x7E` flag bytes, byte-stuffed with the `0x7D`
//! escape and end in a little-endian CRC-16-CCITT. One decode call handles
//! one frame; a UDP datagram usually carries several, so unstuffed frames
//! are queued and drained on later calls.
//!
//! Handled message ids:
//! - `0x00` heartbeat
//! - `0x0A` ownship report, `0x14` traffic report
//! - `0x0B` ownship geometric altitude
//! - `0x4C` Levil (`L`,`E`, sub id `0x01` AHRS)
//! - `0x65` ForeFlight (sub id `0x01` AHRS, `0x00` device id)

use crate::layout::{Endian, Field, FieldType::*, FrameLayout};
use chrono::Utc;
use hud_core::checksum::crc16_ccitt;
use hud_core::model::{AirSample, AttitudeSample, GpsFix, GpsSample, Target};
use hud_core::source::ByteSource;
use hud_core::units::{knots_to_mph, meters_to_feet, wrap_360};
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use std::collections::VecDeque;
use tracing::{debug, trace};

pub const FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;

pub const MSG_HEARTBEAT: u8 = 0x00;
pub const MSG_OWNSHIP: u8 = 0x0A;
pub const MSG_GEO_ALTITUDE: u8 = 0x0B;
pub const MSG_TRAFFIC: u8 = 0x14;
pub const MSG_LEVIL: u8 = 0x4C;
pub const MSG_FOREFLIGHT: u8 = 0x65;

const LON_LAT_RESOLUTION: f64 = 180.0 / 8_388_608.0;
const TRACK_RESOLUTION: f64 = 360.0 / 256.0;

const LEVIL_SUB_AHRS: u8 = 0x01;
const FOREFLIGHT_SUB_ID: u8 = 0x00;
const FOREFLIGHT_SUB_AHRS: u8 = 0x01;

/// Geometric altitude resolution, meters
const GEO_ALT_RESOLUTION_M: f64 = 5.0;

/// Levil "no data" marker
const LEVIL_NO_DATA: i64 = 32767;

/// Report length without CRC
const REPORT_LEN: usize = 28;

/// Longest frame we keep assembling before giving up on it
const MAX_FRAME: usize = 1024;

const READ_CHUNK: usize = 2048;

mod levil {
    use super::*;
    pub const ROLL: Field = Field::new("roll", 3, I16);
    pub const PITCH: Field = Field::new("pitch", 5, I16);
    pub const HEADING: Field = Field::new("heading", 7, I16);
    pub const SLIP: Field = Field::new("slip", 9, I16);
    pub const YAW_RATE: Field = Field::new("yaw_rate", 11, I16);
    pub const G: Field = Field::new("g", 13, I16);
    pub const IAS: Field = Field::new("ias", 15, I16);
    pub const PRESS_ALT: Field = Field::new("press_alt", 17, U16);
    pub const VSI: Field = Field::new("vsi", 19, I16);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "levil_ahrs",
        len: 21,
        endian: Endian::Big,
        fields: &[ROLL, PITCH, HEADING, SLIP, YAW_RATE, G, IAS, PRESS_ALT, VSI],
    };
}

mod foreflight {
    use super::*;
    pub const ROLL: Field = Field::new("roll", 2, I16);
    pub const PITCH: Field = Field::new("pitch", 4, I16);
    pub const HEADING: Field = Field::new("heading", 6, U16);
    pub const IAS: Field = Field::new("ias", 8, U16);
    pub const TAS: Field = Field::new("tas", 10, U16);

    pub static LAYOUT: FrameLayout = FrameLayout {
        name: "foreflight_ahrs",
        len: 12,
        endian: Endian::Big,
        fields: &[ROLL, PITCH, HEADING, IAS, TAS],
    };
}

/// Sign-extend a 24-bit GDL-90 latitude/longitude and convert to degrees
fn latlon(b: &[u8]) -> f64 {
    let mut raw = ((b[0] as i32) << 16) | ((b[1] as i32) << 8) | b[2] as i32;
    if raw & 0x80_0000 != 0 {
        raw -= 0x100_0000;
    }
    raw as f64 * LON_LAT_RESOLUTION
}

/// 12-bit vertical velocity in 64 fpm units. Unavailable and reserved
/// codes read as zero.
pub fn vertical_velocity(raw: u16) -> f64 {
    let raw = raw & 0xFFF;
    match raw {
        0x800 | 0x1FF..=0x7FF | 0x801..=0xE01 => 0.0,
        r if r & 0x800 != 0 => (r as i32 - 0x1000) as f64 * 64.0,
        r => r as f64 * 64.0,
    }
}

/// Fields shared by the ownship and traffic reports
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub address: u32,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub nic: u8,
    pub nacp: u8,
    /// mph
    pub speed: Option<f64>,
    /// ft/min
    pub vspeed: f64,
    pub track: f64,
    pub emitter: u8,
    pub callsign: Option<String>,
}

impl Report {
    pub fn parse(m: &[u8]) -> Option<Self> {
        if m.len() < REPORT_LEN {
            return None;
        }
        let address = ((m[2] as u32) << 16) | ((m[3] as u32) << 8) | m[4] as u32;
        let alt_raw = ((m[11] as u16) << 4) | (m[12] as u16 >> 4);
        let h_vel = ((m[14] as u16) << 4) | (m[15] as u16 >> 4);
        let v_vel = (((m[15] & 0x0F) as u16) << 8) | m[16] as u16;
        let callsign: String = m[19..27]
            .iter()
            .map(|&b| b as char)
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        Some(Self {
            address,
            lat: latlon(&m[5..8]),
            lon: latlon(&m[8..11]),
            alt: (alt_raw != 0xFFF).then(|| alt_raw as f64 * 25.0 - 1000.0),
            nic: m[13] >> 4,
            nacp: m[13] & 0x0F,
            speed: (h_vel != 0xFFF).then(|| knots_to_mph(h_vel as f64)),
            vspeed: vertical_velocity(v_vel),
            track: m[17] as f64 * TRACK_RESOLUTION,
            emitter: m[18],
            callsign: (!callsign.is_empty()).then_some(callsign),
        })
    }

    pub fn into_target(self, now: i64) -> Target {
        Target {
            address: Some(self.address),
            callsign: self.callsign,
            category: self.emitter,
            lat: Some(self.lat),
            lon: Some(self.lon),
            alt: self.alt,
            track: Some(self.track),
            speed: self.speed,
            vspeed: Some(self.vspeed),
            nic: Some(self.nic),
            nacp: Some(self.nacp),
            last_seen: now,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct StratuxDecoder {
    verify_crc: bool,
    carry: Vec<u8>,
    in_frame: bool,
    escaped: bool,
    pending: VecDeque<Vec<u8>>,
    att: AttitudeSample,
    air: AirSample,
    gps: GpsSample,
    gps_valid: bool,
    time_of_day: Option<u32>,
    stats: DecoderStats,
}

impl StratuxDecoder {
    pub fn new(verify_crc: bool) -> Self {
        Self {
            verify_crc,
            carry: Vec::with_capacity(64),
            in_frame: false,
            escaped: false,
            pending: VecDeque::new(),
            att: AttitudeSample::default(),
            air: AirSample::default(),
            gps: GpsSample::default(),
            gps_valid: false,
            time_of_day: None,
            stats: DecoderStats::default(),
        }
    }

    /// GPS-valid bit of the last heartbeat
    pub fn gps_valid(&self) -> bool {
        self.gps_valid
    }

    /// Seconds since UTC midnight from the last heartbeat
    pub fn time_of_day(&self) -> Option<u32> {
        self.time_of_day
    }

    /// Split raw bytes on flags, unstuffing as we go
    fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match b {
                FLAG => {
                    if self.in_frame && !self.carry.is_empty() {
                        self.pending.push_back(std::mem::take(&mut self.carry));
                    }
                    self.in_frame = true;
                    self.escaped = false;
                }
                _ if !self.in_frame => {}
                ESCAPE => self.escaped = true,
                _ => {
                    if self.carry.len() >= MAX_FRAME {
                        self.stats.bad += 1;
                        debug!("GDL-90 frame too long, dropped");
                        self.carry.clear();
                        self.in_frame = false;
                        continue;
                    }
                    let b = if self.escaped { b ^ 0x20 } else { b };
                    self.escaped = false;
                    self.carry.push(b);
                }
            }
        }
    }

    fn process(&mut self, frame: Vec<u8>, out: &mut Vec<TelemetryUpdate>) -> DecodeOutcome {
        if frame.len() < 3 {
            self.stats.bad += 1;
            return DecodeOutcome::BadFrame;
        }
        let (msg, crc) = frame.split_at(frame.len() - 2);
        if self.verify_crc {
            let expected = u16::from_le_bytes([crc[0], crc[1]]);
            if crc16_ccitt(msg) != expected {
                self.stats.bad += 1;
                debug!(id = msg[0], "GDL-90 CRC mismatch");
                return DecodeOutcome::BadFrame;
            }
        }

        let now = Utc::now();
        let applied = match msg[0] {
            MSG_HEARTBEAT if msg.len() >= 7 => {
                self.gps_valid = msg[1] & 0x80 != 0;
                let secs = (((msg[2] & 0x80) as u32) << 9) | ((msg[4] as u32) << 8) | msg[3] as u32;
                self.time_of_day = Some(secs);
                self.gps.utc_time = Some(format!(
                    "{:02}{:02}{:02}",
                    secs / 3600,
                    secs / 60 % 60,
                    secs % 60
                ));
                if !self.gps_valid {
                    self.gps.fix = GpsFix::Acquiring;
                }
                out.push(TelemetryUpdate::Gps(self.gps.clone()));
                true
            }
            MSG_OWNSHIP => match Report::parse(msg) {
                Some(r) => {
                    let g = &mut self.gps;
                    g.lat = Some(r.lat);
                    g.lon = Some(r.lon);
                    if r.alt.is_some() {
                        g.alt = r.alt;
                    }
                    g.ground_speed = r.speed;
                    g.ground_track = Some(r.track);
                    g.fix = if r.lat == 0.0 && r.lon == 0.0 {
                        GpsFix::Acquiring
                    } else {
                        GpsFix::Fix3D
                    };
                    g.updated = Some(now);
                    out.push(TelemetryUpdate::Gps(g.clone()));
                    true
                }
                None => false,
            },
            MSG_GEO_ALTITUDE if msg.len() >= 3 => {
                let meters = i16::from_be_bytes([msg[1], msg[2]]) as f64 * GEO_ALT_RESOLUTION_M;
                self.gps.alt = Some(meters_to_feet(meters));
                self.gps.updated = Some(now);
                out.push(TelemetryUpdate::Gps(self.gps.clone()));
                true
            }
            MSG_TRAFFIC => match Report::parse(msg) {
                Some(r) => {
                    trace!(address = r.address, callsign = ?r.callsign, "traffic report");
                    out.push(TelemetryUpdate::Target(r.into_target(now.timestamp())));
                    true
                }
                None => false,
            },
            MSG_LEVIL if msg.get(1) == Some(&b'E') && msg.get(2) == Some(&LEVIL_SUB_AHRS) => {
                let long_enough = msg.len() >= levil::LAYOUT.len;
                if long_enough {
                    self.levil_ahrs(msg, out);
                }
                long_enough
            }
            MSG_FOREFLIGHT if msg.get(1) == Some(&FOREFLIGHT_SUB_AHRS) => {
                let long_enough = msg.len() >= foreflight::LAYOUT.len;
                if long_enough {
                    self.foreflight_ahrs(msg, out);
                }
                long_enough
            }
            // device identification, nothing to apply
            MSG_FOREFLIGHT if msg.get(1) == Some(&FOREFLIGHT_SUB_ID) => true,
            MSG_HEARTBEAT | MSG_GEO_ALTITUDE => false,
            id => {
                self.stats.unknown += 1;
                trace!(id, sub_id = ?msg.get(1..3), "unhandled GDL-90 message");
                return DecodeOutcome::NoFrame;
            }
        };

        if applied {
            self.stats.frames += 1;
            DecodeOutcome::FrameApplied
        } else {
            self.stats.bad += 1;
            debug!(id = msg[0], len = msg.len(), "GDL-90 message too short");
            DecodeOutcome::BadFrame
        }
    }

    fn levil_ahrs(&mut self, m: &[u8], out: &mut Vec<TelemetryUpdate>) {
        use levil::*;
        let get = |f: &Field| LAYOUT.get(m, f).filter(|&v| v != LEVIL_NO_DATA);
        let now = Utc::now();

        let a = &mut self.att;
        a.roll = get(&ROLL).map(|v| v as f64 / 10.0);
        a.pitch = get(&PITCH).map(|v| v as f64 / 10.0);
        a.heading = get(&HEADING).map(|v| wrap_360(v as f64 / 10.0));
        a.slip_skid = get(&SLIP).map(|v| v as f64 / 10.0);
        a.yaw_rate = get(&YAW_RATE).map(|v| v as f64 / 10.0);
        a.vert_g = get(&G).map(|v| v as f64 / 10.0);
        a.mark_updated(now);

        let air = &mut self.air;
        air.ias = get(&IAS).map(|v| knots_to_mph(v as f64));
        air.pressure_alt = LAYOUT
            .get(m, &PRESS_ALT)
            .filter(|&v| v != 0xFFFF)
            .map(|v| v as f64 - 5000.0);
        air.vsi = get(&VSI).map(|v| v as f64);
        air.updated = Some(now);

        out.push(TelemetryUpdate::Attitude(self.att.clone()));
        out.push(TelemetryUpdate::Air(self.air.clone()));
    }

    fn foreflight_ahrs(&mut self, m: &[u8], out: &mut Vec<TelemetryUpdate>) {
        use foreflight::*;
        let now = Utc::now();
        let a = &mut self.att;
        a.roll = LAYOUT.get(m, &ROLL).filter(|&v| v != 0x7FFF).map(|v| v as f64 / 10.0);
        a.pitch = LAYOUT.get(m, &PITCH).filter(|&v| v != 0x7FFF).map(|v| v as f64 / 10.0);
        if let Some(raw) = LAYOUT.get(m, &HEADING).filter(|&v| v != 0xFFFF) {
            let hdg = (raw & 0x7FFF) as f64 / 10.0;
            a.heading = Some(if raw & 0x8000 != 0 {
                wrap_360(hdg)
            } else {
                // true heading, corrected when the declination is known
                wrap_360(hdg - self.gps.mag_decl.unwrap_or(0.0))
            });
        }
        a.mark_updated(now);

        let air = &mut self.air;
        air.ias = LAYOUT.get(m, &IAS).filter(|&v| v != 0xFFFF).map(|v| knots_to_mph(v as f64));
        air.tas = LAYOUT.get(m, &TAS).filter(|&v| v != 0xFFFF).map(|v| knots_to_mph(v as f64));
        air.updated = Some(now);

        out.push(TelemetryUpdate::Attitude(self.att.clone()));
        out.push(TelemetryUpdate::Air(self.air.clone()));
    }
}

impl TelemetryDecoder for StratuxDecoder {
    fn name(&self) -> &str {
        "Stratux GDL-90"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Attitude, SampleKind::Air, SampleKind::Gps, SampleKind::Traffic]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        if self.pending.is_empty() {
            let mut buf = [0u8; READ_CHUNK];
            let n = source.read(&mut buf)?;
            if n == 0 {
                return Ok(source.idle_outcome());
            }
            self.feed(&buf[..n]);
        }
        match self.pending.pop_front() {
            Some(frame) => Ok(self.process(frame, out)),
            None => Ok(DecodeOutcome::NoFrame),
        }
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

/// Append CRC, byte-stuff and wrap in flags, for tests and simulators
pub fn encode_frame(msg: &[u8]) -> Vec<u8> {
    let crc = crc16_ccitt(msg);
    let mut raw = msg.to_vec();
    raw.extend_from_slice(&crc.to_le_bytes());
    let mut framed = Vec::with_capacity(raw.len() + 4);
    framed.push(FLAG);
    for b in raw {
        if b == FLAG || b == ESCAPE {
            framed.push(ESCAPE);
            framed.push(b ^ 0x20);
        } else {
            framed.push(b);
        }
    }
    framed.push(FLAG);
    framed
}

/// Ownship / traffic report body, for tests and simulators
#[allow(clippy::too_many_arguments)]
pub fn encode_report(
    id: u8,
    address: u32,
    lat: f64,
    lon: f64,
    alt_raw: u16,
    speed_kt: u16,
    vvel_raw: u16,
    track_deg: f64,
    emitter: u8,
    callsign: &str,
) -> Vec<u8> {
    let to24 = |d: f64| {
        let wk = (d / LON_LAT_RESOLUTION).round() as i32;
        [(wk >> 16) as u8, (wk >> 8) as u8, wk as u8]
    };
    let mut m = vec![0u8; REPORT_LEN];
    m[0] = id;
    m[2] = (address >> 16) as u8;
    m[3] = (address >> 8) as u8;
    m[4] = address as u8;
    m[5..8].copy_from_slice(&to24(lat));
    m[8..11].copy_from_slice(&to24(lon));
    m[11] = (alt_raw >> 4) as u8;
    m[12] = ((alt_raw & 0x0F) << 4) as u8 | 0x09;
    m[13] = 0x8A;
    m[14] = (speed_kt >> 4) as u8;
    m[15] = (((speed_kt & 0x0F) << 4) | ((vvel_raw >> 8) & 0x0F)) as u8;
    m[16] = vvel_raw as u8;
    m[17] = (wrap_360(track_deg) / TRACK_RESOLUTION) as u8;
    m[18] = emitter;
    let mut cs = [b' '; 8];
    for (dst, src) in cs.iter_mut().zip(callsign.bytes()) {
        *dst = src;
    }
    m[19..27].copy_from_slice(&cs);
    m
}
