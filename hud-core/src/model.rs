//! Aircraft telemetry data model
//!
//! Normalized sample types that decoders fill and the display reads.
//! Every value is optional: a field is `None` until some source reports it.
//!
//! Canonical units: speeds mph, altitudes ft, temperatures °F, pressure
//! settings inHg, distances statute miles, angles degrees.
//!
//! Each sample type lists its fields explicitly through [`FieldSource`],
//! which the API combines with a [`FieldMask`] for selective output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::str::FromStr;

/// Emitter category used for synthetic buoy markers
pub const CATEGORY_BUOY: u8 = 100;

/// Emitter category used for mesh radio nodes
pub const CATEGORY_MESH: u8 = 101;

// === Attitude ===

/// Calibration quality per sensor axis, 0 (uncalibrated) to 3 (fully calibrated)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub system: Option<u8>,
    pub gyro: Option<u8>,
    pub accel: Option<u8>,
    pub mag: Option<u8>,
}

/// Attitude / IMU sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    /// Pitch, degrees, nose up positive
    pub pitch: Option<f64>,
    /// Roll, degrees
    pub roll: Option<f64>,
    /// Magnetic heading 0-360
    pub heading: Option<f64>,
    pub yaw: Option<f64>,
    /// Degrees per second
    pub turn_rate: Option<f64>,
    pub pitch_rate: Option<f64>,
    pub roll_rate: Option<f64>,
    pub yaw_rate: Option<f64>,
    /// Slip/skid, g (positive = ball right)
    pub slip_skid: Option<f64>,
    /// Vertical load factor, g
    pub vert_g: Option<f64>,
    pub calibration: Calibration,
    /// Update rate derived from inter-arrival time
    pub sample_rate_hz: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
}

impl AttitudeSample {
    /// Stamp the sample and derive the update rate from the previous stamp
    pub fn mark_updated(&mut self, now: DateTime<Utc>) {
        if let Some(prev) = self.updated {
            let dt = (now - prev).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
            if dt > 0.0 {
                self.sample_rate_hz = Some(1.0 / dt);
            }
        }
        self.updated = Some(now);
    }
}

// === Air data ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirSample {
    /// Indicated airspeed, mph
    pub ias: Option<f64>,
    /// True airspeed, mph
    pub tas: Option<f64>,
    /// Pressure altitude, ft
    pub pressure_alt: Option<f64>,
    /// Indicated altitude (baro corrected), ft
    pub alt: Option<f64>,
    pub density_alt: Option<f64>,
    /// Height above ground, ft
    pub agl: Option<f64>,
    /// Angle of attack. 0-100 percent or raw code depending on source
    pub aoa: Option<f64>,
    /// Vertical speed, ft/min
    pub vsi: Option<f64>,
    /// Outside air temperature, °F
    pub oat: Option<f64>,
    /// Altimeter setting, inHg
    pub baro: Option<f64>,
    /// `baro - 29.9213`
    pub baro_diff: Option<f64>,
    /// Wind direction (from), degrees
    pub wind_dir: Option<f64>,
    /// Wind speed, mph
    pub wind_speed: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
}

impl AirSample {
    /// Set the altimeter and recompute indicated altitude from pressure altitude
    pub fn apply_baro(&mut self, baro_inhg: f64) {
        self.baro = Some(baro_inhg);
        self.baro_diff = Some(crate::units::baro_diff(baro_inhg));
        if let Some(palt) = self.pressure_alt {
            self.alt = Some(crate::units::indicated_altitude(palt, baro_inhg).round());
        }
    }
}

// === GPS ===

/// GPS fix quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsFix {
    #[default]
    Acquiring,
    DeadReckoning,
    Fix2D,
    Fix3D,
    Fix2DImu,
    Fix3DImu,
}

impl GpsFix {
    pub fn code(&self) -> u8 {
        match self {
            GpsFix::Acquiring => 0,
            GpsFix::DeadReckoning => 1,
            GpsFix::Fix2D => 2,
            GpsFix::Fix3D => 3,
            GpsFix::Fix2DImu => 4,
            GpsFix::Fix3DImu => 5,
        }
    }

    pub fn has_position(&self) -> bool {
        !matches!(self, GpsFix::Acquiring | GpsFix::DeadReckoning)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    /// Decimal degrees, south negative
    pub lat: Option<f64>,
    /// Decimal degrees, west negative
    pub lon: Option<f64>,
    /// Altitude MSL, ft
    pub alt: Option<f64>,
    /// Ground speed, mph
    pub ground_speed: Option<f64>,
    /// Ground track, degrees true
    pub ground_track: Option<f64>,
    pub sats: Option<u32>,
    pub fix: GpsFix,
    pub waas: Option<bool>,
    /// Magnetic declination, degrees (east positive)
    pub mag_decl: Option<f64>,
    /// UTC time-of-day as reported by the receiver (hhmmss)
    pub utc_time: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

// === Navigation / autopilot ===

/// Autopilot state for one axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AutopilotAxis {
    pub engaged: Option<bool>,
    pub force: Option<f64>,
    pub position: Option<f64>,
    pub slip: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavSample {
    pub ap_roll: AutopilotAxis,
    pub ap_pitch: AutopilotAxis,
    pub ap_yaw: AutopilotAxis,
    pub heading_bug: Option<f64>,
    pub altitude_bug: Option<f64>,
    pub airspeed_bug: Option<f64>,
    pub vs_bug: Option<f64>,
    pub waypoint_name: Option<String>,
    /// Distance to waypoint, statute miles
    pub waypoint_distance: Option<f64>,
    /// Bearing/desired track to waypoint, degrees
    pub waypoint_track: Option<f64>,
    /// Course deviation, percent of full scale (-100 .. 100)
    pub cdi_deflection: Option<f64>,
    /// Glide slope / vertical deviation, percent of full scale
    pub gs_deflection: Option<f64>,
    /// Cross-track error, nautical miles, negative = steer left
    pub cross_track: Option<f64>,
    pub hsi_source: Option<u8>,
    pub transponder_code: Option<u16>,
    pub transponder_status: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

// === Engine / fuel ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSample {
    pub rpm: Option<f64>,
    /// psi
    pub oil_press: Option<f64>,
    /// °F
    pub oil_temp: Option<f64>,
    /// inHg
    pub manifold_press: Option<f64>,
    /// gal/h
    pub fuel_flow: Option<f64>,
    /// psi
    pub fuel_press: Option<f64>,
    /// Per-cylinder head temperatures, °F. Length fixed by the source (6 or 8)
    pub cht: Vec<f64>,
    /// Per-cylinder exhaust temperatures, °F
    pub egt: Vec<f64>,
    pub coolant_temp: Option<f64>,
    pub volts1: Option<f64>,
    pub volts2: Option<f64>,
    pub amps: Option<f64>,
    /// Engine hours
    pub hobbs: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelSample {
    /// Per-tank fuel levels, gallons
    pub levels: Vec<f64>,
    /// Total fuel remaining, gallons
    pub remaining: Option<f64>,
    /// Endurance at current burn, minutes
    pub endurance_min: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
}

// === Traffic ===

/// Text payload received from a mesh/traffic node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub sender_address: Option<u32>,
    pub sender_callsign: Option<String>,
    pub recipient_address: Option<u32>,
    pub text: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// A tracked traffic contact, mesh node or synthetic buoy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Station id (ICAO address, mesh node id, buoy number)
    pub address: Option<u32>,
    pub callsign: Option<String>,
    /// Emitter category: 0 unknown .. 15 spacecraft, 100 buoy, 101 mesh node
    pub category: u8,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// ft
    pub alt: Option<f64>,
    /// degrees
    pub track: Option<f64>,
    /// mph
    pub speed: Option<f64>,
    /// ft/min
    pub vspeed: Option<f64>,
    pub nic: Option<u8>,
    pub nacp: Option<u8>,
    /// Unix seconds
    pub last_seen: i64,
    /// Distance from own-ship, statute miles
    pub distance: Option<f64>,
    /// Bearing from own-ship, degrees true
    pub bearing: Option<f64>,
    /// `alt - ownship alt`, ft
    pub alt_diff: Option<f64>,
    /// Set only for synthetic buoys
    pub buoy_num: Option<u32>,
    pub last_payload: Option<PayloadMessage>,
}

impl Target {
    pub fn new(address: u32, last_seen: i64) -> Self {
        Self {
            address: Some(address),
            last_seen,
            ..Default::default()
        }
    }

    pub fn is_buoy(&self) -> bool {
        self.buoy_num.is_some() || self.category == CATEGORY_BUOY
    }

    pub fn is_mesh(&self) -> bool {
        self.category == CATEGORY_MESH
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

// === Field registry ===

/// Explicit field listing for a sample type
pub trait FieldSource {
    /// Every known field with its current value (`null` when unknown)
    fn fields(&self) -> Vec<(&'static str, Value)>;

    /// Fields selected by `mask`, skipping unknown values
    fn to_json_filtered(&self, mask: Option<&FieldMask>) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.fields() {
            if value.is_null() {
                continue;
            }
            if mask.map(|m| m.includes(name)).unwrap_or(true) {
                map.insert(name.to_string(), value);
            }
        }
        Value::Object(map)
    }
}

fn stamp(t: &Option<DateTime<Utc>>) -> Value {
    t.map(|t| json!(t.to_rfc3339())).unwrap_or(Value::Null)
}

impl FieldSource for AttitudeSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("pitch", json!(self.pitch)),
            ("roll", json!(self.roll)),
            ("heading", json!(self.heading)),
            ("yaw", json!(self.yaw)),
            ("turn_rate", json!(self.turn_rate)),
            ("pitch_rate", json!(self.pitch_rate)),
            ("roll_rate", json!(self.roll_rate)),
            ("yaw_rate", json!(self.yaw_rate)),
            ("slip_skid", json!(self.slip_skid)),
            ("vert_g", json!(self.vert_g)),
            ("cal_system", json!(self.calibration.system)),
            ("cal_gyro", json!(self.calibration.gyro)),
            ("cal_accel", json!(self.calibration.accel)),
            ("cal_mag", json!(self.calibration.mag)),
            ("sample_rate_hz", json!(self.sample_rate_hz)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

impl FieldSource for AirSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("ias", json!(self.ias)),
            ("tas", json!(self.tas)),
            ("pressure_alt", json!(self.pressure_alt)),
            ("alt", json!(self.alt)),
            ("density_alt", json!(self.density_alt)),
            ("agl", json!(self.agl)),
            ("aoa", json!(self.aoa)),
            ("vsi", json!(self.vsi)),
            ("oat", json!(self.oat)),
            ("baro", json!(self.baro)),
            ("baro_diff", json!(self.baro_diff)),
            ("wind_dir", json!(self.wind_dir)),
            ("wind_speed", json!(self.wind_speed)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

impl FieldSource for GpsSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("lat", json!(self.lat)),
            ("lon", json!(self.lon)),
            ("gps_alt", json!(self.alt)),
            ("ground_speed", json!(self.ground_speed)),
            ("ground_track", json!(self.ground_track)),
            ("sats", json!(self.sats)),
            ("fix", json!(self.fix.code())),
            ("waas", json!(self.waas)),
            ("mag_decl", json!(self.mag_decl)),
            ("utc_time", json!(self.utc_time)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

impl FieldSource for NavSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("ap_roll_engaged", json!(self.ap_roll.engaged)),
            ("ap_pitch_engaged", json!(self.ap_pitch.engaged)),
            ("ap_yaw_engaged", json!(self.ap_yaw.engaged)),
            ("heading_bug", json!(self.heading_bug)),
            ("altitude_bug", json!(self.altitude_bug)),
            ("airspeed_bug", json!(self.airspeed_bug)),
            ("vs_bug", json!(self.vs_bug)),
            ("waypoint_name", json!(self.waypoint_name)),
            ("waypoint_distance", json!(self.waypoint_distance)),
            ("waypoint_track", json!(self.waypoint_track)),
            ("cdi_deflection", json!(self.cdi_deflection)),
            ("gs_deflection", json!(self.gs_deflection)),
            ("cross_track", json!(self.cross_track)),
            ("hsi_source", json!(self.hsi_source)),
            ("transponder_code", json!(self.transponder_code)),
            ("transponder_status", json!(self.transponder_status)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

impl FieldSource for EngineSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        let opt_vec = |v: &Vec<f64>| if v.is_empty() { Value::Null } else { json!(v) };
        vec![
            ("rpm", json!(self.rpm)),
            ("oil_press", json!(self.oil_press)),
            ("oil_temp", json!(self.oil_temp)),
            ("manifold_press", json!(self.manifold_press)),
            ("fuel_flow", json!(self.fuel_flow)),
            ("fuel_press", json!(self.fuel_press)),
            ("cht", opt_vec(&self.cht)),
            ("egt", opt_vec(&self.egt)),
            ("coolant_temp", json!(self.coolant_temp)),
            ("volts1", json!(self.volts1)),
            ("volts2", json!(self.volts2)),
            ("amps", json!(self.amps)),
            ("hobbs", json!(self.hobbs)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

impl FieldSource for FuelSample {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            (
                "fuel_levels",
                if self.levels.is_empty() { Value::Null } else { json!(self.levels) },
            ),
            ("fuel_remaining", json!(self.remaining)),
            ("endurance_min", json!(self.endurance_min)),
            ("updated", stamp(&self.updated)),
        ]
    }
}

// === Field Masking for Selective Output ===

/// Specifies which fields to include in serialized output
#[derive(Debug, Clone, Default)]
pub struct FieldMask {
    fields: HashSet<String>,
}

impl FieldMask {
    /// Create a mask from a comma-separated list of field names
    pub fn parse(fields: &str) -> Self {
        let fields: HashSet<String> = fields
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self { fields }
    }

    /// Check if a field should be included
    pub fn includes(&self, field: &str) -> bool {
        self.fields.contains(&field.to_lowercase())
    }
}

impl FromStr for FieldMask {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
