//! Ranked AOI lists as CSV.

use crate::write_atomic;
use ensemble::RankedAoi;
use pipecast_common::PipecastResult;
use std::path::Path;

pub const RANKED_CSV_COLUMNS: &[&str] = &[
    "rank",
    "bin",
    "ensemble_probability",
    "mean_value",
    "population_affected",
    "score",
    "aoi_id",
    "date",
    "forecast_hour",
    "member",
    "method",
    "area",
    "population_source",
];

/// Render `ranked` as CSV with a header row.
pub fn format_ranked_csv(ranked: &[RankedAoi]) -> String {
    let mut out = RANKED_CSV_COLUMNS.join(",");
    out.push('\n');

    for r in ranked {
        let origin = r.aoi.origin.as_ref();
        let row = [
            r.rank.to_string(),
            r.aoi.bin.clone().unwrap_or_default(),
            format!("{:.6}", r.ensemble_probability),
            format!("{:.4}", r.aoi.mean_value),
            format!("{:.3}", r.population_affected),
            format!("{:.6}", r.score),
            r.aoi.id.clone(),
            origin
                .map(|o| o.date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            origin.map(|o| o.forecast_hour.to_string()).unwrap_or_default(),
            origin.map(|o| o.member.to_string()).unwrap_or_default(),
            origin.map(|o| o.method.to_string()).unwrap_or_default(),
            format!("{:.6}", r.aoi.area),
            r.population_source.as_str().to_string(),
        ];
        let cells: Vec<String> = row.iter().map(|c| escape(c)).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn escape(cell: &str) -> String {
    if cell.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

pub async fn write_ranked_csv(path: &Path, ranked: &[RankedAoi]) -> PipecastResult<()> {
    write_atomic(path, format_ranked_csv(ranked).as_bytes()).await
}
