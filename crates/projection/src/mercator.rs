//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::PI;

/// Sphere radius used by Web Mercator (WGS84 semi-major axis)
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit that makes the projected world square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Geographic (lon, lat in degrees) to Web Mercator (x, y in meters).
///
/// Latitudes are clamped to +/- [`MAX_LATITUDE`].
pub fn forward(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = EARTH_RADIUS * lon_deg.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
    (x, y)
}

/// Web Mercator (x, y in meters) to geographic (lon, lat in degrees).
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}
