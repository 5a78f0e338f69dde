//! Magnetic declination from a truncated World Magnetic Model
//!
//! WMM 2020 main-field coefficients through degree and order 4, with
//! secular variation applied to the dipole and quadrupole terms. Accurate to
//! a few degrees over populated latitudes, which is enough to turn a GPS
//! track into a magnetic heading for display.

use chrono::{Datelike, NaiveDate};

const MAX_DEGREE: usize = 4;
const EPOCH: f64 = 2020.0;

/// Geomagnetic reference radius, km
const REFERENCE_RADIUS_KM: f64 = 6371.2;

const WGS84_A_KM: f64 = 6378.137;
const WGS84_F: f64 = 1.0 / 298.257223563;

/// (n, m, g, h, g_dot, h_dot) in nT and nT/yr
const COEFFICIENTS: [(usize, usize, f64, f64, f64, f64); 14] = [
    (1, 0, -29404.8, 0.0, 6.7, 0.0),
    (1, 1, -1450.9, 4652.5, 7.7, -25.1),
    (2, 0, -2499.6, 0.0, -11.5, 0.0),
    (2, 1, 2982.0, -2991.6, -7.1, -30.2),
    (2, 2, 1677.0, -734.6, -2.2, -23.9),
    (3, 0, 1363.2, 0.0, 0.0, 0.0),
    (3, 1, -2381.2, -82.1, 0.0, 0.0),
    (3, 2, 1236.2, 241.9, 0.0, 0.0),
    (3, 3, 525.7, -543.4, 0.0, 0.0),
    (4, 0, 903.0, 0.0, 0.0, 0.0),
    (4, 1, 809.5, 281.9, 0.0, 0.0),
    (4, 2, 86.3, -158.4, 0.0, 0.0),
    (4, 3, -309.4, 199.7, 0.0, 0.0),
    (4, 4, 48.0, -349.7, 0.0, 0.0),
];

type Table = [[f64; MAX_DEGREE + 1]; MAX_DEGREE + 1];

/// Decimal year for a calendar date, e.g. 2024-07-02 -> 2024.5
pub fn decimal_year(date: NaiveDate) -> f64 {
    let days = if date.leap_year() { 366.0 } else { 365.0 };
    date.year() as f64 + date.ordinal0() as f64 / days
}

/// Declination in degrees (east positive) at a geodetic position.
///
/// Returns `None` at the poles, where declination is undefined.
pub fn declination(lat_deg: f64, lon_deg: f64, alt_km: f64, year: f64) -> Option<f64> {
    if !lat_deg.is_finite() || !lon_deg.is_finite() || lat_deg.abs() >= 89.999 {
        return None;
    }

    // geodetic -> geocentric
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let phi = lat_deg.to_radians();
    let rc = WGS84_A_KM / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let p = (rc + alt_km) * phi.cos();
    let z = (rc * (1.0 - e2) + alt_km) * phi.sin();
    let r = p.hypot(z);
    let phi_c = (z / r).asin();

    // cos and sin of colatitude
    let ct = phi_c.sin();
    let st = phi_c.cos();

    let (legendre, d_legendre) = gauss_legendre(ct, st);
    let schmidt = schmidt_factors();

    let lambda = lon_deg.to_radians();
    let dt = year - EPOCH;
    let (mut north, mut east, mut down) = (0.0, 0.0, 0.0);

    for &(n, m, g, h, g_dot, h_dot) in COEFFICIENTS.iter() {
        let g = (g + dt * g_dot) * schmidt[n][m];
        let h = (h + dt * h_dot) * schmidt[n][m];
        let ar = (REFERENCE_RADIUS_KM / r).powi(n as i32 + 2);
        let (sm, cm) = (m as f64 * lambda).sin_cos();
        let t = g * cm + h * sm;

        north += ar * t * d_legendre[n][m];
        east += ar * m as f64 * (g * sm - h * cm) * legendre[n][m] / st;
        down -= (n as f64 + 1.0) * ar * t * legendre[n][m];
    }

    // rotate back to the geodetic frame
    let psi = phi_c - phi;
    let north = north * psi.cos() - down * psi.sin();

    let decl = east.atan2(north).to_degrees();
    decl.is_finite().then_some(decl)
}

/// Gauss-normalized associated Legendre functions and their colatitude derivatives
fn gauss_legendre(ct: f64, st: f64) -> (Table, Table) {
    let mut p = [[0.0; MAX_DEGREE + 1]; MAX_DEGREE + 1];
    let mut dp = [[0.0; MAX_DEGREE + 1]; MAX_DEGREE + 1];
    p[0][0] = 1.0;

    for n in 1..=MAX_DEGREE {
        for m in 0..=n {
            if n == m {
                p[n][n] = st * p[n - 1][n - 1];
                dp[n][n] = st * dp[n - 1][n - 1] + ct * p[n - 1][n - 1];
            } else if n == 1 {
                p[1][0] = ct;
                dp[1][0] = -st;
            } else {
                let k = (((n - 1) * (n - 1)) as f64 - (m * m) as f64)
                    / (((2 * n - 1) * (2 * n - 3)) as f64);
                p[n][m] = ct * p[n - 1][m] - k * p[n - 2][m];
                dp[n][m] = ct * dp[n - 1][m] - st * p[n - 1][m] - k * dp[n - 2][m];
            }
        }
    }
    (p, dp)
}

/// Factors converting Schmidt semi-normalized coefficients for use with
/// Gauss-normalized functions
fn schmidt_factors() -> Table {
    let mut s = [[0.0; MAX_DEGREE + 1]; MAX_DEGREE + 1];
    s[0][0] = 1.0;
    for n in 1..=MAX_DEGREE {
        s[n][0] = s[n - 1][0] * (2 * n - 1) as f64 / n as f64;
        for m in 1..=n {
            let j = if m == 1 { 2.0 } else { 1.0 };
            s[n][m] = s[n][m - 1] * (((n - m + 1) as f64 * j) / (n + m) as f64).sqrt();
        }
    }
    s
}
