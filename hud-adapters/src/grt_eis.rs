//! Grand Rapids Technologies EIS engine monitor
//!
//! The EIS streams a `FE FF FE` header followed by a 63 byte big-endian
//! frame whose last byte is the one's complement of the 8-bit sum of the
//! header and everything before it.

use crate::layout::{Endian, Field, FieldType::*, FrameLayout};
use chrono::Utc;
use hud_core::checksum::ones_complement_sum8;
use hud_core::model::{AirSample, EngineSample, FuelSample};
use hud_core::source::ByteSource;
use hud_core::units::knots_to_mph;
use hud_core::{DecodeOutcome, DecoderStats, SampleKind, SourceError, TelemetryDecoder, TelemetryUpdate};
use std::time::Duration;
use tracing::{debug, trace};

pub const HEADER: [u8; 3] = [0xFE, 0xFF, 0xFE];
pub const FRAME_LEN: usize = 63;

const CYLINDERS: usize = 6;
const MAX_SCAN: usize = 512;

// ============================================================================
// Frame layout
// ============================================================================

pub const TACH: Field = Field::new("tach", 0, U16);
pub const CHT: [Field; CYLINDERS] = [
    Field::new("cht1", 2, U16),
    Field::new("cht2", 4, U16),
    Field::new("cht3", 6, U16),
    Field::new("cht4", 8, U16),
    Field::new("cht5", 10, U16),
    Field::new("cht6", 12, U16),
];
pub const EGT: [Field; CYLINDERS] = [
    Field::new("egt1", 14, U16),
    Field::new("egt2", 16, U16),
    Field::new("egt3", 18, U16),
    Field::new("egt4", 20, U16),
    Field::new("egt5", 22, U16),
    Field::new("egt6", 24, U16),
];
pub const AUX5: Field = Field::new("aux5", 26, U16);
pub const AUX6: Field = Field::new("aux6", 28, U16);
pub const AIRSPEED: Field = Field::new("airspeed", 30, U16);
pub const ALTITUDE: Field = Field::new("altitude", 32, I16);
pub const VOLTS: Field = Field::new("volts", 34, U16);
pub const FUEL_FLOW: Field = Field::new("fuel_flow", 36, U16);
pub const INTERNAL_TEMP: Field = Field::new("internal_temp", 38, U8);
pub const CARB_TEMP: Field = Field::new("carb_temp", 39, I8);
pub const ROC: Field = Field::new("rate_of_climb", 40, I8);
pub const OAT: Field = Field::new("oat", 41, I8);
pub const OIL_TEMP: Field = Field::new("oil_temp", 42, U16);
pub const OIL_PRESS: Field = Field::new("oil_press", 44, U8);
pub const AUX1: Field = Field::new("aux1", 45, U16);
pub const AUX2: Field = Field::new("aux2", 47, U16);
pub const AUX3: Field = Field::new("aux3", 49, U16);
pub const AUX4: Field = Field::new("aux4", 51, U16);
pub const COOLANT: Field = Field::new("coolant", 53, U16);
pub const HOBBS: Field = Field::new("hobbs", 55, U16);
pub const FUEL_QTY: Field = Field::new("fuel_qty", 57, U16);
pub const FLIGHT_HOURS: Field = Field::new("flight_hours", 59, U8);
pub const FLIGHT_MINUTES: Field = Field::new("flight_minutes", 60, U8);
pub const FLIGHT_SECONDS: Field = Field::new("flight_seconds", 61, U8);
pub const CHECKSUM: Field = Field::new("checksum", 62, U8);

pub static LAYOUT: FrameLayout = FrameLayout {
    name: "grt_eis",
    len: FRAME_LEN,
    endian: Endian::Big,
    fields: &[
        TACH, CHT[0], CHT[1], CHT[2], CHT[3], CHT[4], CHT[5], EGT[0], EGT[1], EGT[2], EGT[3],
        EGT[4], EGT[5], AUX5, AUX6, AIRSPEED, ALTITUDE, VOLTS, FUEL_FLOW, INTERNAL_TEMP, CARB_TEMP,
        ROC, OAT, OIL_TEMP, OIL_PRESS, AUX1, AUX2, AUX3, AUX4, COOLANT, HOBBS, FUEL_QTY,
        FLIGHT_HOURS, FLIGHT_MINUTES, FLIGHT_SECONDS, CHECKSUM,
    ],
};

/// Checksum over the header and the first 62 frame bytes
pub fn frame_checksum(frame: &[u8]) -> u8 {
    let mut bytes = Vec::with_capacity(HEADER.len() + FRAME_LEN - 1);
    bytes.extend_from_slice(&HEADER);
    bytes.extend_from_slice(&frame[..FRAME_LEN - 1]);
    ones_complement_sum8(&bytes)
}

#[derive(Debug, Default)]
pub struct GrtEisDecoder {
    engine: EngineSample,
    fuel: FuelSample,
    air: AirSample,
    aux: [u16; 6],
    internal_temp: Option<f64>,
    carb_temp: Option<f64>,
    flight_time: Option<Duration>,
    stats: DecoderStats,
}

impl GrtEisDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw values of the six auxiliary inputs, in input order
    pub fn aux(&self) -> [u16; 6] {
        self.aux
    }

    /// Carburetor temperature, °F
    pub fn carb_temp(&self) -> Option<f64> {
        self.carb_temp
    }

    /// EIS internal temperature, °F
    pub fn internal_temp(&self) -> Option<f64> {
        self.internal_temp
    }

    /// Flight timer
    pub fn flight_time(&self) -> Option<Duration> {
        self.flight_time
    }

    /// Slide a three byte window until it matches the header
    fn sync(&mut self, source: &mut dyn ByteSource) -> Result<Option<DecodeOutcome>, SourceError> {
        let mut window = [0u8; 3];
        for scanned in 0..MAX_SCAN {
            let Some(b) = source.read_byte()? else {
                return Ok(Some(if scanned == 0 {
                    source.idle_outcome()
                } else {
                    DecodeOutcome::NoFrame
                }));
            };
            window = [window[1], window[2], b];
            if window == HEADER {
                return Ok(None);
            }
        }
        Ok(Some(DecodeOutcome::NoFrame))
    }

    fn apply(&mut self, f: &[u8], out: &mut Vec<TelemetryUpdate>) {
        let l = &LAYOUT;
        let now = Utc::now();

        let e = &mut self.engine;
        e.rpm = Some(l.f64(f, &TACH));
        e.cht = CHT.iter().map(|c| l.f64(f, c)).collect();
        e.egt = EGT.iter().map(|c| l.f64(f, c)).collect();
        e.volts1 = Some(l.f64(f, &VOLTS) / 10.0);
        e.fuel_flow = Some(l.f64(f, &FUEL_FLOW) / 10.0);
        e.oil_temp = Some(l.f64(f, &OIL_TEMP));
        e.oil_press = Some(l.f64(f, &OIL_PRESS));
        e.coolant_temp = Some(l.f64(f, &COOLANT));
        e.hobbs = Some(l.f64(f, &HOBBS) / 10.0);
        e.updated = Some(now);

        let fuel = &mut self.fuel;
        let qty = l.f64(f, &FUEL_QTY) / 10.0;
        fuel.levels = vec![qty];
        fuel.remaining = Some(qty);
        fuel.endurance_min = e.fuel_flow.filter(|&ff| ff > 0.0).map(|ff| qty / ff * 60.0);
        fuel.updated = Some(now);

        let a = &mut self.air;
        a.ias = Some(knots_to_mph(l.f64(f, &AIRSPEED)));
        a.pressure_alt = Some(l.f64(f, &ALTITUDE));
        a.vsi = Some(l.f64(f, &ROC) * 100.0);
        a.oat = Some(l.f64(f, &OAT));
        a.updated = Some(now);

        for (slot, field) in self.aux.iter_mut().zip([AUX1, AUX2, AUX3, AUX4, AUX5, AUX6]) {
            *slot = l.get(f, &field).unwrap_or(0) as u16;
        }
        self.internal_temp = Some(l.f64(f, &INTERNAL_TEMP));
        self.carb_temp = Some(l.f64(f, &CARB_TEMP));
        self.flight_time = Some(Duration::from_secs(
            l.f64(f, &FLIGHT_HOURS) as u64 * 3600
                + l.f64(f, &FLIGHT_MINUTES) as u64 * 60
                + l.f64(f, &FLIGHT_SECONDS) as u64,
        ));

        out.push(TelemetryUpdate::Engine(self.engine.clone()));
        out.push(TelemetryUpdate::Fuel(self.fuel.clone()));
        out.push(TelemetryUpdate::Air(self.air.clone()));
    }
}

impl TelemetryDecoder for GrtEisDecoder {
    fn name(&self) -> &str {
        "GRT EIS"
    }

    fn provides(&self) -> &'static [SampleKind] {
        &[SampleKind::Engine, SampleKind::Fuel, SampleKind::Air]
    }

    fn decode(
        &mut self,
        source: &mut dyn ByteSource,
        out: &mut Vec<TelemetryUpdate>,
    ) -> Result<DecodeOutcome, SourceError> {
        if let Some(outcome) = self.sync(source)? {
            return Ok(outcome);
        }

        let frame = source.read_up_to(FRAME_LEN)?;
        if frame.len() < FRAME_LEN {
            self.stats.short_reads += 1;
            return Ok(DecodeOutcome::NoFrame);
        }

        let expected = frame_checksum(&frame);
        if frame[FRAME_LEN - 1] != expected {
            self.stats.bad += 1;
            debug!(got = frame[FRAME_LEN - 1], expected, "GRT EIS checksum mismatch");
            return Ok(DecodeOutcome::BadFrame);
        }

        trace!(rpm = LAYOUT.f64(&frame, &TACH), "GRT EIS frame");
        self.apply(&frame, out);
        self.stats.frames += 1;
        Ok(DecodeOutcome::FrameApplied)
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

/// Header plus frame with the checksum filled in, for tests and simulators
pub fn encode_frame(values: &[(&Field, i64)]) -> Vec<u8> {
    let mut frame = LAYOUT.encode(values);
    frame[FRAME_LEN - 1] = frame_checksum(&frame);
    let mut bytes = HEADER.to_vec();
    bytes.extend(frame);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn sample_frame() -> Vec<u8> {
        let (cht, egt) = (CHT, EGT);
        let mut values = vec![
            (&TACH, 2400),
            (&AIRSPEED, 110),
            (&ALTITUDE, 5500),
            (&VOLTS, 138),
            (&FUEL_FLOW, 92),
            (&ROC, -5),
            (&OAT, -10),
            (&OIL_TEMP, 190),
            (&OIL_PRESS, 62),
            (&COOLANT, 0),
            (&HOBBS, 12345),
            (&FUEL_QTY, 230),
            (&CARB_TEMP, 40),
            (&AUX1, 7),
            (&FLIGHT_HOURS, 1),
            (&FLIGHT_MINUTES, 2),
            (&FLIGHT_SECONDS, 3),
        ];
        for (i, (c, e)) in cht.iter().zip(egt.iter()).enumerate() {
            values.push((c, 350 + i as i64));
            values.push((e, 1350 + i as i64));
        }
        encode_frame(&values)
    }

    fn run(bytes: Vec<u8>) -> (GrtEisDecoder, Vec<TelemetryUpdate>, DecodeOutcome) {
        let mut dec = GrtEisDecoder::new();
        let mut src = MemorySource::live(bytes);
        let mut out = Vec::new();
        let outcome = dec.decode(&mut src, &mut out).unwrap();
        (dec, out, outcome)
    }

    #[test]
    fn test_layout_valid() {
        LAYOUT.validate().unwrap();
        assert_eq!(LAYOUT.fields.len(), 36);
    }

    #[test]
    fn test_frame_decodes() {
        let (dec, out, outcome) = run(sample_frame());
        assert_eq!(outcome, DecodeOutcome::FrameApplied);
        assert_eq!(out.len(), 3);

        let TelemetryUpdate::Engine(e) = &out[0] else { panic!("expected engine") };
        assert_eq!(e.rpm, Some(2400.0));
        assert_eq!(e.cht, vec![350.0, 351.0, 352.0, 353.0, 354.0, 355.0]);
        assert_eq!(e.egt[5], 1355.0);
        assert_eq!(e.volts1, Some(13.8));
        assert_eq!(e.fuel_flow, Some(9.2));
        assert_eq!(e.oil_press, Some(62.0));
        assert_eq!(e.hobbs, Some(1234.5));

        let TelemetryUpdate::Fuel(fuel) = &out[1] else { panic!("expected fuel") };
        assert_eq!(fuel.remaining, Some(23.0));
        assert!((fuel.endurance_min.unwrap() - 23.0 / 9.2 * 60.0).abs() < 1e-9);

        let TelemetryUpdate::Air(a) = &out[2] else { panic!("expected air") };
        assert_eq!(a.pressure_alt, Some(5500.0));
        assert_eq!(a.vsi, Some(-500.0));
        assert_eq!(a.oat, Some(-10.0));

        assert_eq!(dec.carb_temp(), Some(40.0));
        assert_eq!(dec.aux()[0], 7);
        assert_eq!(dec.flight_time(), Some(Duration::from_secs(3723)));
    }

    #[test]
    fn test_checksum_corruption_discards() {
        for bit in 0..8 {
            let mut bytes = sample_frame();
            let last = bytes.len() - 1;
            bytes[last] ^= 1 << bit;
            let (dec, out, outcome) = run(bytes);
            assert_eq!(outcome, DecodeOutcome::BadFrame);
            assert!(out.is_empty());
            assert_eq!(dec.engine, EngineSample::default());
            assert_eq!(dec.stats().bad, 1);
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut bytes = vec![0x00, 0xFE, 0xFE, 0x12];
        bytes.extend(sample_frame());
        let (_, _, outcome) = run(bytes);
        assert_eq!(outcome, DecodeOutcome::FrameApplied);
    }

    #[test]
    fn test_short_frame() {
        let mut bytes = sample_frame();
        bytes.truncate(30);
        let (dec, _, outcome) = run(bytes);
        assert_eq!(outcome, DecodeOutcome::NoFrame);
        assert_eq!(dec.stats().short_reads, 1);
        assert_eq!(dec.stats().bad, 0);
    }

    #[test]
    fn test_zero_fuel_flow_has_no_endurance() {
        let (_, out, _) = run(encode_frame(&[(&FUEL_QTY, 100)]));
        let TelemetryUpdate::Fuel(fuel) = &out[1] else { panic!("expected fuel") };
        assert_eq!(fuel.endurance_min, None);
    }
}
