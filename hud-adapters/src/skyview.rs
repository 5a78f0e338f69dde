//! Dynon Skyview serial data decoder
//!
//! Each message starts with `!` followed by a type byte. Only the ADAHRS
//! message (`1`) is decoded: 72 fixed-width ASCII characters including a
//! two hex digit sum-8 checksum, then CR (optionally LF).

use crate::text::{field_int, scan_for, sum8_valid, Scan};
use chrono::Utc;
use hud_core::model::{AirSample, AttitudeSample};
use hud_core::source::ByteSource;
use hud_core::units::{baro_field_to_inhg, celsius_to_fahrenheit, knots_to_mph, wrap_360, TENTH_KNOTS_TO_MPH};
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use std::ops::Range;
use tracing::{debug, trace};

pub const SENTINEL: u8 = b'!';
pub const MSG_ADAHRS: u8 = b'1';

/// ADAHRS message length up to and including the checksum
pub const ADAHRS_LEN: usize = 72;

const MAX_SCAN: usize = 256;

const PITCH: Range<usize> = 11..15;
const ROLL: Range<usize> = 15..20;
const HEADING: Range<usize> = 20..23;
const IAS: Range<usize> = 23..27;
const PRESS_ALT: Range<usize> = 27..33;
const TURN_RATE: Range<usize> = 33..37;
const LAT_ACCEL: Range<usize> = 37..40;
const VERT_ACCEL: Range<usize> = 40..43;
const AOA: Range<usize> = 43..45;
const VSI: Range<usize> = 45..49;
const OAT: Range<usize> = 49..52;
const TAS: Range<usize> = 52..56;
const BARO: Range<usize> = 56..59;
const DENSITY_ALT: Range<usize> = 59..65;
const WIND_DIR: Range<usize> = 65..68;
const WIND_SPEED: Range<usize> = 68..70;

#[derive(Debug, Default)]
pub struct SkyviewDecoder {
    att: AttitudeSample,
    air: AirSample,
    stats: DecoderStats,
}

impl SkyviewDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&mut self, m: &[u8], out: &mut Vec<TelemetryUpdate>) {
        let f = |r: Range<usize>| field_int(&m[r]);
        let now = Utc::now();

        let a = &mut self.att;
        if let Some(v) = f(PITCH) {
            a.pitch = Some(v as f64 / 10.0);
        }
        if let Some(v) = f(ROLL) {
            a.roll = Some(v as f64 / 10.0);
        }
        if let Some(v) = f(HEADING) {
            a.heading = Some(wrap_360(v as f64));
        }
        if let Some(v) = f(TURN_RATE) {
            a.turn_rate = Some(v as f64 * 0.1);
        }
        if let Some(v) = f(LAT_ACCEL) {
            a.slip_skid = Some(v as f64 * 0.01);
        }
        if let Some(v) = f(VERT_ACCEL) {
            a.vert_g = Some(v as f64 * 0.1);
        }
        a.mark_updated(now);

        let air = &mut self.air;
        if let Some(v) = f(IAS) {
            air.ias = Some(v as f64 * TENTH_KNOTS_TO_MPH);
        }
        if let Some(v) = f(TAS) {
            air.tas = Some(v as f64 * TENTH_KNOTS_TO_MPH);
        }
        if let Some(v) = f(PRESS_ALT) {
            air.pressure_alt = Some(v as f64);
        }
        if let Some(v) = f(AOA) {
            air.aoa = Some(v as f64);
        }
        if let Some(v) = f(VSI) {
            air.vsi = Some(v as f64 * 10.0);
        }
        if let Some(v) = f(OAT) {
            air.oat = Some(celsius_to_fahrenheit(v as f64));
        }
        if let Some(v) = f(BARO) {
            air.apply_baro(baro_field_to_inhg(v as i32));
        }
        if let Some(v) = f(DENSITY_ALT) {
            air.density_alt = Some(v as f64);
        }
        if let Some(v) = f(WIND_DIR) {
            air.wind_dir = Some(wrap_360(v as f64));
        }
        if let Some(v) = f(WIND_SPEED) {
            air.wind_speed = Some(knots_to_mph(v as f64));
        }
        air.updated = Some(now);

        out.push(TelemetryUpdate::Attitude(self.att.clone()));
        out.push(TelemetryUpdate::Air(self.air.clone()));
    }
}

impl TelemetryDecoder for SkyviewDecoder {
    fn name(&self) -> &str {
        "Dynon Skyview"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Attitude, SampleKind::Air]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        match scan_for(source, &[SENTINEL], MAX_SCAN)? {
            Scan::Found(_) => {}
            Scan::Idle => return Ok(source.idle_outcome()),
            Scan::Limit => return Ok(DecodeOutcome::NoFrame),
        }

        let Some(msg_type) = source.read_byte()? else {
            self.stats.short_reads += 1;
            return Ok(DecodeOutcome::NoFrame);
        };
        if msg_type != MSG_ADAHRS {
            self.stats.unknown += 1;
            trace!(msg_type, "unhandled Skyview message");
            return Ok(DecodeOutcome::NoFrame);
        }

        // remainder through the checksum plus the CR
        let rest = source.read_up_to(ADAHRS_LEN - 2 + 1)?;
        if rest.len() < ADAHRS_LEN - 1 {
            self.stats.short_reads += 1;
            return Ok(DecodeOutcome::NoFrame);
        }
        let mut msg = Vec::with_capacity(ADAHRS_LEN + 1);
        msg.extend_from_slice(&[SENTINEL, msg_type]);
        msg.extend_from_slice(&rest);

        if msg[ADAHRS_LEN] != b'\r' {
            self.stats.bad += 1;
            debug!("Skyview ADAHRS missing CR");
            return Ok(DecodeOutcome::BadFrame);
        }
        let msg = &msg[..ADAHRS_LEN];
        if !sum8_valid(msg) {
            self.stats.bad += 1;
            debug!("Skyview ADAHRS checksum mismatch");
            return Ok(DecodeOutcome::BadFrame);
        }

        self.apply(msg, out);
        self.stats.frames += 1;
        Ok(DecodeOutcome::FrameApplied)
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}
