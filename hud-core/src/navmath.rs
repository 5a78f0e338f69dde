//! Navigation math: geodesy, airspeed, density altitude, wind and smoothing

use crate::units::{celsius_to_fahrenheit, fahrenheit_to_celsius, wrap_360};
use geo::{GeodesicBearing, GeodesicDestination, GeodesicDistance, Point};
use std::collections::VecDeque;

/// Sea-level standard temperature, kelvin
const STD_TEMP_K: f64 = 288.15;

/// Standard temperature lapse rate, °C per foot
const STD_LAPSE_C_PER_FT: f64 = 0.0019812;

/// Inverse geodesic on WGS-84: forward azimuth (degrees, -180..180) and
/// surface distance (meters) from `from` to `to`, both `(lat, lon)`.
///
/// `None` when the solution is not finite.
pub fn inverse(from: (f64, f64), to: (f64, f64)) -> Option<(f64, f64)> {
    let a = Point::new(from.1, from.0);
    let b = Point::new(to.1, to.0);
    let azimuth = a.geodesic_bearing(b);
    let distance = a.geodesic_distance(&b);
    if azimuth.is_finite() && distance.is_finite() {
        Some((azimuth, distance))
    } else {
        None
    }
}

/// Direct geodesic on WGS-84: the `(lat, lon)` reached travelling
/// `distance_m` from `from` on initial azimuth `bearing_deg`.
pub fn direct(from: (f64, f64), bearing_deg: f64, distance_m: f64) -> Option<(f64, f64)> {
    let dest = Point::new(from.1, from.0).geodesic_destination(bearing_deg, distance_m);
    if dest.y().is_finite() && dest.x().is_finite() {
        Some((dest.y(), dest.x()))
    } else {
        None
    }
}

/// Map a signed azimuth onto 0..360
pub fn azimuth_to_bearing(azimuth: f64) -> f64 {
    if azimuth < 0.0 {
        360.0 - azimuth.abs()
    } else {
        azimuth
    }
}

/// Standard-atmosphere density ratio for a pressure altitude and OAT (°F)
pub fn density_ratio(pressure_alt_ft: f64, oat_f: f64) -> f64 {
    let delta = (1.0 - 6.8755856e-6 * pressure_alt_ft).powf(5.2558797);
    let theta = (fahrenheit_to_celsius(oat_f) + 273.15) / STD_TEMP_K;
    delta / theta
}

/// True airspeed from indicated airspeed (any speed unit)
pub fn ias_to_tas(ias: f64, pressure_alt_ft: f64, oat_f: f64) -> f64 {
    ias / density_ratio(pressure_alt_ft, oat_f).sqrt()
}

/// Indicated airspeed from true airspeed (any speed unit)
pub fn tas_to_ias(tas: f64, pressure_alt_ft: f64, oat_f: f64) -> f64 {
    tas * density_ratio(pressure_alt_ft, oat_f).sqrt()
}

/// Density altitude, ft
pub fn density_altitude(pressure_alt_ft: f64, oat_f: f64) -> f64 {
    145442.16 * (1.0 - density_ratio(pressure_alt_ft, oat_f).powf(0.234969))
}

/// ISA temperature at a pressure altitude, °F
pub fn standard_temp_f(pressure_alt_ft: f64) -> f64 {
    celsius_to_fahrenheit(15.0 - STD_LAPSE_C_PER_FT * pressure_alt_ft)
}

/// Wind solved from the ground vector (track/speed) and air vector
/// (true heading/TAS). Returns `(direction_from_deg, speed)` in the input
/// speed unit, or `None` when any input is not finite.
pub fn wind_triangle(
    ground_track: f64,
    ground_speed: f64,
    true_heading: f64,
    tas: f64,
) -> Option<(f64, f64)> {
    let (trk, hdg) = (ground_track.to_radians(), true_heading.to_radians());
    let wx = ground_speed * trk.sin() - tas * hdg.sin();
    let wy = ground_speed * trk.cos() - tas * hdg.cos();
    let speed = wx.hypot(wy);
    if !speed.is_finite() {
        return None;
    }
    if speed < 1e-9 {
        return Some((0.0, 0.0));
    }
    let toward = wx.atan2(wy).to_degrees();
    Some((wrap_360(toward + 180.0), speed))
}

/// Trailing moving average over the last `capacity` samples
#[derive(Debug, Clone)]
pub struct RollingAverage {
    window: VecDeque<f64>,
    capacity: usize,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Add a sample and return the current mean
    pub fn push(&mut self, value: f64) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.mean().unwrap_or(value)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
