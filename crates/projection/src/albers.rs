//! Albers Equal Area Conic projection on an ellipsoid.
//!
//! Used by US census and watershed layers (EPSG:5070, "CONUS Albers").
//! Equal-area, so intersected areas in projected meters are meaningful.
//!
//! Formulas follow Snyder, "Map Projections: A Working Manual" (1987),
//! equations 14-1 to 14-21 (forward) and 3-16 (iterative inverse).

use std::f64::consts::PI;

/// GRS80 semi-major axis (meters)
pub const GRS80_A: f64 = 6_378_137.0;
/// GRS80 inverse flattening
pub const GRS80_INV_F: f64 = 298.257_222_101;

/// Albers Equal Area parameters and derived constants.
#[derive(Debug, Clone)]
pub struct AlbersEqualArea {
    /// Semi-major axis (meters)
    pub a: f64,
    /// First eccentricity
    pub e: f64,
    /// Central meridian in radians
    pub lon0: f64,
    /// Latitude of origin in radians
    pub lat0: f64,
    /// First standard parallel in radians
    pub lat1: f64,
    /// Second standard parallel in radians
    pub lat2: f64,
    /// Cone constant
    n: f64,
    /// Snyder's C
    c: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl AlbersEqualArea {
    /// Create a projection from parameters in degrees on an ellipsoid given
    /// by semi-major axis and inverse flattening.
    pub fn new(
        lat0_deg: f64,
        lon0_deg: f64,
        lat1_deg: f64,
        lat2_deg: f64,
        a: f64,
        inv_f: f64,
    ) -> Self {
        let to_rad = PI / 180.0;
        let lat0 = lat0_deg * to_rad;
        let lon0 = lon0_deg * to_rad;
        let lat1 = lat1_deg * to_rad;
        let lat2 = lat2_deg * to_rad;

        let f = 1.0 / inv_f;
        let e = (2.0 * f - f * f).sqrt();

        let m1 = m(lat1, e);
        let m2 = m(lat2, e);
        let q0 = q(lat0, e);
        let q1 = q(lat1, e);
        let q2 = q(lat2, e);

        let n = if (lat1 - lat2).abs() < 1e-10 {
            lat1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).max(0.0).sqrt() / n;

        Self {
            a,
            e,
            lon0,
            lat0,
            lat1,
            lat2,
            n,
            c,
            rho0,
        }
    }

    /// NAD83 / Conus Albers (EPSG:5070): GRS80, standard parallels
    /// 29.5N and 45.5N, origin 23N 96W, no false easting/northing.
    pub fn conus() -> Self {
        Self::new(23.0, -96.0, 29.5, 45.5, GRS80_A, GRS80_INV_F)
    }

    /// Geographic (lon, lat in degrees) to projected (x, y in meters).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;

        let mut dlon = lon_deg * to_rad - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        let rho = self.a * (self.c - self.n * q(lat, self.e)).max(0.0).sqrt() / self.n;
        let theta = self.n * dlon;

        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }

    /// Projected (x, y in meters) to geographic (lon, lat in degrees).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;

        let dy = self.rho0 - y;
        let mut rho = (x * x + dy * dy).sqrt();
        let theta = if self.n < 0.0 {
            rho = -rho;
            (-x).atan2(-dy)
        } else {
            x.atan2(dy)
        };

        let q_val = (self.c - (rho * self.n / self.a).powi(2)) / self.n;
        let lat = self.latitude_from_q(q_val);
        let lon = self.lon0 + theta / self.n;

        (lon * to_deg, lat * to_deg)
    }

    /// Invert `q(lat)` by fixed-point iteration.
    fn latitude_from_q(&self, q_val: f64) -> f64 {
        let e = self.e;
        let e2 = e * e;

        // Values of q beyond the pole limit map to the poles
        let q_pole = 1.0 - (1.0 - e2) / (2.0 * e) * ((1.0 - e) / (1.0 + e)).ln();
        if (q_val.abs() - q_pole.abs()).abs() < 1e-12 || q_val.abs() > q_pole.abs() {
            return (PI / 2.0).copysign(q_val);
        }

        let mut lat = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..25 {
            let sin = lat.sin();
            let one_minus = 1.0 - e2 * sin * sin;
            let delta = one_minus * one_minus / (2.0 * lat.cos())
                * (q_val / (1.0 - e2) - sin / one_minus
                    + 1.0 / (2.0 * e) * ((1.0 - e * sin) / (1.0 + e * sin)).ln());
            lat += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        lat
    }
}

fn m(lat: f64, e: f64) -> f64 {
    let sin = lat.sin();
    lat.cos() / (1.0 - e * e * sin * sin).sqrt()
}

fn q(lat: f64, e: f64) -> f64 {
    let sin = lat.sin();
    let e2 = e * e;
    (1.0 - e2) * (sin / (1.0 - e2 * sin * sin) - 1.0 / (2.0 * e) * ((1.0 - e * sin) / (1.0 + e * sin)).ln())
}
