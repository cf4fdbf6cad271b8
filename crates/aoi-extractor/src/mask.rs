//! Binary exceedance masks.

use pipecast_common::{Field, PipecastError, PipecastResult};

/// Cells of a field meeting a threshold, row-major.
#[derive(Debug, Clone)]
pub struct ExceedanceMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl ExceedanceMask {
    /// Build the mask `value >= threshold`.
    ///
    /// Fails with `InvalidThreshold` for a non-finite threshold and with
    /// `InvalidGrid` when the field holds no finite value at all.
    pub fn build(field: &Field, threshold: f64) -> PipecastResult<Self> {
        if !threshold.is_finite() {
            return Err(PipecastError::invalid_threshold(format!(
                "threshold must be finite, got {}",
                threshold
            )));
        }
        if field.data().len() != field.width() * field.height() {
            return Err(PipecastError::invalid_grid(format!(
                "data length {} does not match {}x{} grid",
                field.data().len(),
                field.width(),
                field.height()
            )));
        }
        if field.finite_count() == 0 {
            return Err(PipecastError::invalid_grid(
                "field contains no finite values",
            ));
        }

        // Comparisons with NaN are false, so missing cells never exceed
        let cells = field
            .data()
            .iter()
            .map(|&v| f64::from(v) >= threshold)
            .collect();

        Ok(Self {
            width: field.width(),
            height: field.height(),
            cells,
        })
    }

    /// Mask from raw cells; used by tests and by probability rasters.
    pub fn from_cells(cells: Vec<bool>, width: usize, height: usize) -> Option<Self> {
        (cells.len() == width * height).then_some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn get(&self, col: i64, row: i64) -> bool {
        if col < 0 || row < 0 || col as usize >= self.width || row as usize >= self.height {
            return false;
        }
        self.cells[row as usize * self.width + col as usize]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
