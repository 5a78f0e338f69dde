//! Garmin G3X text-out decoder
//!
//! Line oriented ASCII. `=` starts an EFIS sentence whose second byte is
//! the sentence id (`1` attitude/air data, `2` TAS and bugs, `7` AGL);
//! `@` starts the GPS sentence. EFIS sentences end in a two hex digit
//! additive checksum. The end-of-line byte is CR on a live port and LF in
//! logged captures.

use crate::text::{field_int, read_line, scan_for, sum8_valid, Line, Scan};
use chrono::{NaiveDate, Utc};
use hud_core::geomag;
use hud_core::model::{AirSample, AttitudeSample, GpsFix, GpsSample, NavSample};
use hud_core::navmath::RollingAverage;
use hud_core::source::ByteSource;
use hud_core::units::{
    celsius_to_fahrenheit, baro_field_to_inhg, knots_to_mph, wrap_360, METERS_TO_FEET, MPS_TO_MPH,
    TENTH_KNOTS_TO_MPH,
};
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use std::ops::Range;
use tracing::{debug, trace};

pub const EOL_LIVE: u8 = b'\r';
pub const EOL_PLAYBACK: u8 = b'\n';

pub const AOA_WINDOW: usize = 20;
pub const SLIP_WINDOW: usize = 10;

const MAX_SCAN: usize = 256;
const MAX_LINE: usize = 80;

// Sentence 1, full (57) and short (45) variants
mod s1 {
    use std::ops::Range;
    pub const LEN: usize = 57;
    pub const LEN_SHORT: usize = 45;
    pub const PITCH: Range<usize> = 11..15;
    pub const ROLL: Range<usize> = 15..20;
    pub const HEADING: Range<usize> = 20..23;
    pub const AIRSPEED: Range<usize> = 23..27;
    pub const PRESS_ALT: Range<usize> = 27..33;
    pub const TURN_RATE: Range<usize> = 33..37;
    pub const LAT_ACCEL: Range<usize> = 37..40;
    pub const VERT_ACCEL: Range<usize> = 40..43;
    pub const AOA: Range<usize> = 43..45;
    pub const VSI: Range<usize> = 45..49;
    pub const OAT: Range<usize> = 49..52;
    pub const ALTIMETER: Range<usize> = 52..55;
}

// Sentence 2, long (40) and short (28) variants
mod s2 {
    use std::ops::Range;
    pub const LEN: usize = 40;
    pub const LEN_SHORT: usize = 28;
    pub const TAS: Range<usize> = 11..15;
    pub const DENSITY_ALT: Range<usize> = 15..21;
    pub const HEADING_BUG: Range<usize> = 21..24;
    pub const ALTITUDE_BUG: Range<usize> = 24..30;
    pub const AIRSPEED_BUG: Range<usize> = 30..34;
    pub const VS_BUG: Range<usize> = 34..38;
    pub const SHORT_HEADING_BUG: Range<usize> = 15..18;
    pub const SHORT_AIRSPEED_BUG: Range<usize> = 18..22;
    pub const SHORT_VS_BUG: Range<usize> = 22..26;
}

// Sentence 7
mod s7 {
    use std::ops::Range;
    pub const LEN: usize = 20;
    pub const AGL: Range<usize> = 11..15;
    pub const GROUND_SPEED: Range<usize> = 15..18;
}

// GPS sentence, 55 bytes before the end of line
mod gps {
    use std::ops::Range;
    pub const LEN: usize = 55;
    pub const DATE: Range<usize> = 1..7;
    pub const TIME: Range<usize> = 7..13;
    pub const LAT_HEMI: usize = 13;
    pub const LAT_DEG: Range<usize> = 14..16;
    pub const LAT_MIN: Range<usize> = 16..21;
    pub const LON_HEMI: usize = 21;
    pub const LON_DEG: Range<usize> = 22..25;
    pub const LON_MIN: Range<usize> = 25..30;
    pub const STATUS: usize = 30;
    pub const ALT: Range<usize> = 34..40;
    pub const VEL_EW_DIR: usize = 40;
    pub const VEL_EW: Range<usize> = 41..45;
    pub const VEL_NS_DIR: usize = 45;
    pub const VEL_NS: Range<usize> = 46..50;
}

#[derive(Debug)]
pub struct G3xDecoder {
    eol: u8,
    smoothing: bool,
    att: AttitudeSample,
    air: AirSample,
    gps: GpsSample,
    nav: NavSample,
    aoa_avg: RollingAverage,
    slip_avg: RollingAverage,
    stats: DecoderStats,
}

impl G3xDecoder {
    pub fn new(eol: u8, smoothing: bool) -> Self {
        Self {
            eol,
            smoothing,
            att: AttitudeSample::default(),
            air: AirSample::default(),
            gps: GpsSample::default(),
            nav: NavSample::default(),
            aoa_avg: RollingAverage::new(AOA_WINDOW),
            slip_avg: RollingAverage::new(SLIP_WINDOW),
            stats: DecoderStats::default(),
        }
    }

    fn bad(&mut self, why: &str) -> DecodeOutcome {
        self.stats.bad += 1;
        debug!(reason = why, "bad G3X sentence");
        DecodeOutcome::BadFrame
    }

    fn applied(&mut self) -> DecodeOutcome {
        self.stats.frames += 1;
        DecodeOutcome::FrameApplied
    }

    fn sentence_1(&mut self, s: &[u8], out: &mut Vec<TelemetryUpdate>) {
        let f = |r: Range<usize>| s.get(r).and_then(field_int);
        let now = Utc::now();

        let a = &mut self.att;
        if let Some(p) = f(s1::PITCH) {
            a.pitch = Some(p as f64 / 10.0);
        }
        if let Some(r) = f(s1::ROLL) {
            a.roll = Some(-(r as f64 / 10.0));
        }
        if let Some(h) = f(s1::HEADING) {
            a.heading = Some(wrap_360(h as f64));
        }
        if let Some(t) = f(s1::TURN_RATE) {
            a.turn_rate = Some(t as f64 * 0.1);
        }
        if let Some(lat) = f(s1::LAT_ACCEL) {
            let slip = lat as f64 * 0.01;
            a.slip_skid = Some(if self.smoothing { self.slip_avg.push(slip) } else { slip });
        }
        if let Some(v) = f(s1::VERT_ACCEL) {
            a.vert_g = Some(v as f64 * 0.1);
        }
        a.mark_updated(now);

        let air = &mut self.air;
        if let Some(ias) = f(s1::AIRSPEED) {
            air.ias = Some(ias as f64 * TENTH_KNOTS_TO_MPH);
        }
        if let Some(palt) = f(s1::PRESS_ALT) {
            air.pressure_alt = Some(palt as f64);
        }
        if let Some(aoa) = f(s1::AOA) {
            let aoa = aoa as f64;
            air.aoa = Some(if self.smoothing { self.aoa_avg.push(aoa) } else { aoa });
        }
        if s.len() == s1::LEN {
            if let Some(vsi) = f(s1::VSI) {
                air.vsi = Some(vsi as f64 * 10.0);
            }
            if let Some(oat) = f(s1::OAT) {
                air.oat = Some(celsius_to_fahrenheit(oat as f64));
            }
            if let Some(raw) = f(s1::ALTIMETER) {
                air.apply_baro(baro_field_to_inhg(raw as i32));
            }
        }
        air.updated = Some(now);

        out.push(TelemetryUpdate::Attitude(self.att.clone()));
        out.push(TelemetryUpdate::Air(self.air.clone()));
    }

    fn sentence_2(&mut self, s: &[u8], out: &mut Vec<TelemetryUpdate>) {
        let f = |r: Range<usize>| s.get(r).and_then(field_int);
        let now = Utc::now();

        if let Some(tas) = f(s2::TAS) {
            self.air.tas = Some(tas as f64 * TENTH_KNOTS_TO_MPH);
        }
        let (hdg, spd, vs) = if s.len() == s2::LEN {
            if let Some(da) = f(s2::DENSITY_ALT) {
                self.air.density_alt = Some(da as f64);
            }
            if let Some(alt) = f(s2::ALTITUDE_BUG) {
                self.nav.altitude_bug = Some(alt as f64);
            }
            (s2::HEADING_BUG, s2::AIRSPEED_BUG, s2::VS_BUG)
        } else {
            (s2::SHORT_HEADING_BUG, s2::SHORT_AIRSPEED_BUG, s2::SHORT_VS_BUG)
        };
        if let Some(h) = f(hdg) {
            self.nav.heading_bug = Some(wrap_360(h as f64));
        }
        if let Some(b) = f(spd) {
            self.nav.airspeed_bug = Some(b as f64 * TENTH_KNOTS_TO_MPH);
        }
        if let Some(v) = f(vs) {
            self.nav.vs_bug = Some(v as f64 * 10.0);
        }
        self.air.updated = Some(now);
        self.nav.updated = Some(now);
        out.push(TelemetryUpdate::Air(self.air.clone()));
        out.push(TelemetryUpdate::Nav(self.nav.clone()));
    }

    fn sentence_7(&mut self, s: &[u8], out: &mut Vec<TelemetryUpdate>) {
        let now = Utc::now();
        if let Some(agl) = s.get(s7::AGL).and_then(field_int) {
            self.air.agl = Some(agl as f64);
            self.air.updated = Some(now);
        }
        if let Some(gs) = s.get(s7::GROUND_SPEED).and_then(field_int) {
            self.gps.ground_speed = Some(knots_to_mph(gs as f64));
            self.gps.updated = Some(now);
        }
        out.push(TelemetryUpdate::Air(self.air.clone()));
        out.push(TelemetryUpdate::Gps(self.gps.clone()));
    }

    fn gps_sentence(&mut self, s: &[u8], out: &mut Vec<TelemetryUpdate>) -> bool {
        let f = |r: Range<usize>| s.get(r).and_then(field_int);
        let signed = |dir: usize, r: Range<usize>, neg: u8| -> Option<f64> {
            let v = f(r)? as f64;
            Some(if s[dir] == neg { -v } else { v })
        };

        let (Some(lat_deg), Some(lat_min), Some(lon_deg), Some(lon_min)) =
            (f(gps::LAT_DEG), f(gps::LAT_MIN), f(gps::LON_DEG), f(gps::LON_MIN))
        else {
            return false;
        };
        let mut lat = lat_deg as f64 + lat_min as f64 / 1000.0 / 60.0;
        let mut lon = lon_deg as f64 + lon_min as f64 / 1000.0 / 60.0;
        if s[gps::LAT_HEMI] == b'S' {
            lat = -lat;
        }
        if s[gps::LON_HEMI] == b'W' {
            lon = -lon;
        }

        let g = &mut self.gps;
        g.lat = Some(lat);
        g.lon = Some(lon);
        let (fix, waas) = match s[gps::STATUS] {
            b'g' => (GpsFix::Fix2D, false),
            b'G' => (GpsFix::Fix3D, false),
            b'd' => (GpsFix::Fix2D, true),
            b'D' => (GpsFix::Fix3D, true),
            _ => (GpsFix::Acquiring, false),
        };
        g.fix = fix;
        g.waas = Some(waas);
        if let Some(alt_m) = f(gps::ALT) {
            g.alt = Some(alt_m as f64 * METERS_TO_FEET);
        }
        if let (Some(ve), Some(vn)) = (
            signed(gps::VEL_EW_DIR, gps::VEL_EW, b'W'),
            signed(gps::VEL_NS_DIR, gps::VEL_NS, b'S'),
        ) {
            let (ve, vn) = (ve / 10.0, vn / 10.0);
            g.ground_speed = Some(ve.hypot(vn) * MPS_TO_MPH);
            g.ground_track = Some(wrap_360(ve.atan2(vn).to_degrees()));
        }
        g.utc_time = std::str::from_utf8(&s[gps::TIME]).ok().map(str::to_string);

        let year = s
            .get(gps::DATE)
            .and_then(|d| std::str::from_utf8(d).ok())
            .and_then(|d| NaiveDate::parse_from_str(&format!("20{d}"), "%Y%m%d").ok())
            .map(geomag::decimal_year)
            .unwrap_or_else(|| geomag::decimal_year(Utc::now().date_naive()));
        g.mag_decl = geomag::declination(lat, lon, 0.0, year);
        g.updated = Some(Utc::now());

        out.push(TelemetryUpdate::Gps(g.clone()));
        true
    }
}

impl TelemetryDecoder for G3xDecoder {
    fn name(&self) -> &str {
        "Garmin G3X"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Attitude, SampleKind::Air, SampleKind::Gps, SampleKind::Nav]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        let marker = match scan_for(source, b"=@", MAX_SCAN)? {
            Scan::Found(m) => m,
            Scan::Idle => return Ok(source.idle_outcome()),
            Scan::Limit => return Ok(DecodeOutcome::NoFrame),
        };

        let mut sentence = vec![marker];
        match read_line(source, self.eol, MAX_LINE)? {
            Line::Complete(rest) => sentence.extend(rest),
            Line::Short(_) => {
                self.stats.short_reads += 1;
                return Ok(DecodeOutcome::NoFrame);
            }
            Line::Overlong => return Ok(self.bad("no end of line")),
        }

        if marker == b'@' {
            if sentence.len() != gps::LEN {
                return Ok(self.bad("GPS sentence length"));
            }
            if !self.gps_sentence(&sentence, out) {
                return Ok(self.bad("GPS position fields"));
            }
            return Ok(self.applied());
        }

        let Some(&id) = sentence.get(1) else {
            return Ok(self.bad("empty sentence"));
        };
        let expected: &[usize] = match id {
            b'1' => &[s1::LEN, s1::LEN_SHORT],
            b'2' => &[s2::LEN, s2::LEN_SHORT],
            b'7' => &[s7::LEN],
            _ => {
                self.stats.unknown += 1;
                trace!(id, "unhandled G3X sentence");
                return Ok(DecodeOutcome::NoFrame);
            }
        };
        if !expected.contains(&sentence.len()) {
            return Ok(self.bad("sentence length"));
        }
        if !sum8_valid(&sentence) {
            return Ok(self.bad("checksum"));
        }

        match id {
            b'1' => self.sentence_1(&sentence, out),
            b'2' => self.sentence_2(&sentence, out),
            _ => self.sentence_7(&sentence, out),
        }
        Ok(self.applied())
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}
