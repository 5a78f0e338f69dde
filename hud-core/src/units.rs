//! Unit conversions used by the protocol decoders
//!
//! The aircraft model stores everything in one canonical unit per quantity:
//! speeds in statute miles per hour, altitudes in feet, temperatures in
//! degrees Fahrenheit, pressure settings in inches of mercury and distances
//! in statute miles. Decoders convert at the edge using the helpers below.

/// Knots to statute miles per hour
pub const KNOTS_TO_MPH: f64 = 1.15078;

/// Tenths of a knot to mph (G3X / Skyview airspeed fields)
pub const TENTH_KNOTS_TO_MPH: f64 = 0.115078;

/// Meters to feet
pub const METERS_TO_FEET: f64 = 3.28084;

/// Meters to statute miles
pub const METERS_TO_MILES: f64 = 0.0006213712;

/// Statute miles to meters
pub const MILES_TO_METERS: f64 = 1609.344;

/// Nautical miles to statute miles
pub const NM_TO_MILES: f64 = 1.15078;

/// Meters per second to mph
pub const MPS_TO_MPH: f64 = 2.23694;

/// Standard sea-level altimeter setting (inHg)
pub const STANDARD_BARO_INHG: f64 = 29.9213;

/// Altimeter correction, inHg per foot of altitude
pub const INHG_PER_FOOT: f64 = 0.00108;

/// MGL airspeed scale applied to raw ASI/TAS fields
pub const MGL_ASI_TO_MPH: f64 = 0.05399565;

pub fn knots_to_mph(kt: f64) -> f64 {
    kt * KNOTS_TO_MPH
}

pub fn meters_to_feet(m: f64) -> f64 {
    m * METERS_TO_FEET
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Decode the three-digit altimeter field shared by G3X and Skyview:
/// hundredths of inHg above 27.50.
pub fn baro_field_to_inhg(raw: i32) -> f64 {
    (raw as f64 + 2750.0) / 100.0
}

/// Deviation of a baro setting from standard pressure
pub fn baro_diff(baro_inhg: f64) -> f64 {
    baro_inhg - STANDARD_BARO_INHG
}

/// Indicated altitude for a given pressure altitude and altimeter setting
pub fn indicated_altitude(pressure_alt_ft: f64, baro_inhg: f64) -> f64 {
    pressure_alt_ft + baro_diff(baro_inhg) / INHG_PER_FOOT
}

/// Normalize any angle in degrees to `[0, 360)`
pub fn wrap_360(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}
