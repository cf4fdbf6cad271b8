//! ESRI ASCII Grid (`.asc`) reading and writing.
//!
//! Header keys are case-insensitive. Cell size is given either as
//! `cellsize` or as separate `dx`/`dy`; the lower-left reference is either
//! the corner (`xllcorner`/`yllcorner`) or the center of the lower-left cell
//! (`xllcenter`/`yllcenter`). Rows are stored north to south.

use crate::write_atomic;
use pipecast_common::{CrsCode, Field, GeoTransform, PipecastError, PipecastResult};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// NODATA marker used when writing.
pub const NODATA_VALUE: f64 = -9999.0;

const HEADER_KEYS: &[&str] = &[
    "ncols",
    "nrows",
    "xllcorner",
    "yllcorner",
    "xllcenter",
    "yllcenter",
    "cellsize",
    "dx",
    "dy",
    "nodata_value",
];

/// Parse an ASCII grid. The format carries no CRS, so it is supplied.
pub fn parse_ascii_grid(text: &str, crs: CrsCode) -> PipecastResult<Field> {
    let mut header: HashMap<String, f64> = HashMap::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.peek() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            lines.next();
            continue;
        };
        let key = key.to_ascii_lowercase();
        if !HEADER_KEYS.contains(&key.as_str()) {
            break;
        }
        let value = parts
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| PipecastError::invalid_grid(format!("bad header line '{}'", line)))?;
        header.insert(key, value);
        lines.next();
    }

    let get = |key: &str| header.get(key).copied();
    let required = |key: &str| {
        get(key).ok_or_else(|| PipecastError::invalid_grid(format!("missing header '{}'", key)))
    };

    let ncols = required("ncols")?;
    let nrows = required("nrows")?;
    if ncols < 1.0 || nrows < 1.0 || ncols.fract() != 0.0 || nrows.fract() != 0.0 {
        return Err(PipecastError::invalid_grid(format!(
            "invalid grid shape {} x {}",
            ncols, nrows
        )));
    }
    let (width, height) = (ncols as usize, nrows as usize);

    let (dx, dy) = match (get("cellsize"), get("dx"), get("dy")) {
        (Some(size), _, _) => (size, size),
        (None, Some(dx), Some(dy)) => (dx, dy),
        _ => return Err(PipecastError::invalid_grid("missing 'cellsize' or 'dx'/'dy'")),
    };

    let (west, south) = match (get("xllcorner"), get("yllcorner")) {
        (Some(x), Some(y)) => (x, y),
        _ => match (get("xllcenter"), get("yllcenter")) {
            (Some(x), Some(y)) => (x - dx / 2.0, y - dy / 2.0),
            _ => return Err(PipecastError::invalid_grid("missing lower-left reference")),
        },
    };

    let nodata = get("nodata_value");
    let mut data = Vec::with_capacity(width * height);
    for token in lines.flat_map(str::split_whitespace) {
        let value: f64 = token
            .parse()
            .map_err(|_| PipecastError::invalid_grid(format!("bad cell value '{}'", token)))?;
        let missing = nodata.map(|nd| (value - nd).abs() < 1e-9).unwrap_or(false);
        data.push(if missing { f32::NAN } else { value as f32 });
    }

    let transform = GeoTransform::new(west, south + dy * height as f64, dx, -dy);
    Field::new(data, width, height, transform, crs)
}

/// Render a field as an ASCII grid. NaN cells are written as
/// [`NODATA_VALUE`].
pub fn format_ascii_grid(field: &Field) -> String {
    let t = field.transform();
    let (dx, dy) = (t.pixel_width, t.pixel_height.abs());
    let south = t.origin_y - dy * field.height() as f64;

    let mut out = String::with_capacity(field.data().len() * 6 + 128);
    let _ = writeln!(out, "ncols {}", field.width());
    let _ = writeln!(out, "nrows {}", field.height());
    let _ = writeln!(out, "xllcorner {}", t.origin_x);
    let _ = writeln!(out, "yllcorner {}", south);
    if (dx - dy).abs() < 1e-12 {
        let _ = writeln!(out, "cellsize {}", dx);
    } else {
        let _ = writeln!(out, "dx {}", dx);
        let _ = writeln!(out, "dy {}", dy);
    }
    let _ = writeln!(out, "NODATA_value {}", NODATA_VALUE);

    for row in field.data().chunks(field.width()) {
        let line: Vec<String> = row
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    v.to_string()
                } else {
                    NODATA_VALUE.to_string()
                }
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

/// Read an ASCII grid from disk.
pub async fn read_ascii_grid(path: &Path, crs: CrsCode) -> PipecastResult<Field> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_ascii_grid(&text, crs)
        .map_err(|e| PipecastError::invalid_grid(format!("{}: {}", path.display(), e)))
}

/// Write `field` to `path` and its CRS to a `.prj` sidecar next to it.
pub async fn write_ascii_grid(path: &Path, field: &Field) -> PipecastResult<()> {
    write_atomic(path, format_ascii_grid(field).as_bytes()).await?;
    write_atomic(&path.with_extension("prj"), field.crs().esri_wkt().as_bytes()).await
}
