//! Synthetic fields and geometries.
//!
//! Fields built here use a unit-cell transform by default: cell `(col, row)`
//! covers `x in [col, col + 1]` and `y in [height - row - 1, height - row]`,
//! so areas come out in cells.

use geo::{polygon, MultiPolygon, Polygon};
use pipecast_common::{CrsCode, Field, GeoTransform};

/// Transform with unit cells whose bottom-left corner is at the origin.
pub fn unit_transform(height: usize) -> GeoTransform {
    GeoTransform::new(0.0, height as f64, 1.0, -1.0)
}

/// Field from a function of (col, row), with a unit-cell transform.
pub fn field_from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Field {
    field_from_fn_with(width, height, unit_transform(height), CrsCode::Epsg4326, f)
}

/// Field from a function of (col, row) with an explicit transform and CRS.
pub fn field_from_fn_with(
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: CrsCode,
    f: impl Fn(usize, usize) -> f32,
) -> Field {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(f(col, row));
        }
    }
    Field::new(data, width, height, transform, crs).expect("synthetic field is well-formed")
}

/// Field of `background` with a rectangular block of `value` covering
/// `rows` x `cols` (inclusive ranges).
///
/// ```
/// use test_utils::block_field;
///
/// let field = block_field(10, 10, (2, 4), (2, 4), 50.0, 0.0);
/// assert_eq!(field.data().iter().filter(|&&v| v == 50.0).count(), 9);
/// ```
pub fn block_field(
    width: usize,
    height: usize,
    rows: (usize, usize),
    cols: (usize, usize),
    value: f32,
    background: f32,
) -> Field {
    field_from_fn(width, height, |c, r| {
        if r >= rows.0 && r <= rows.1 && c >= cols.0 && c <= cols.1 {
            value
        } else {
            background
        }
    })
}

/// Field drawn from an ASCII picture: `#` cells get `value`, `.` cells 0,
/// `?` cells NaN.
pub fn field_from_picture(rows: &[&str], value: f32) -> Field {
    let width = rows.first().map_or(0, |r| r.len());
    let cells: Vec<Vec<char>> = rows.iter().map(|r| r.chars().collect()).collect();
    field_from_fn(width, rows.len(), |c, r| match cells[r][c] {
        '#' => value,
        '?' => f32::NAN,
        _ => 0.0,
    })
}

/// Creates a grid with random-ish but deterministic precipitation values.
///
/// Uses a simple hash-based approach for reproducibility. About a quarter of
/// the cells get up to 50 mm, the rest are dry.
pub fn create_precipitation_grid(width: usize, height: usize, seed: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let hash = simple_hash(col as u32, row as u32, seed);
            let precip = if hash % 4 == 0 {
                (hash % 5000) as f32 / 100.0
            } else {
                0.0
            };
            data.push(precip);
        }
    }
    data
}

/// Deterministic precipitation field on a unit-cell transform.
pub fn precipitation_field(width: usize, height: usize, seed: u32) -> Field {
    Field::new(
        create_precipitation_grid(width, height, seed),
        width,
        height,
        unit_transform(height),
        CrsCode::Epsg4326,
    )
    .expect("synthetic field is well-formed")
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// Axis-aligned rectangle polygon.
pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
}

/// Axis-aligned rectangle as a one-polygon multipolygon.
pub fn rect_multipolygon(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![rect(x0, y0, x1, y1)])
}
