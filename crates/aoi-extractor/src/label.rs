//! 8-connected component labeling of exceedance masks.

use crate::ExceedanceMask;

/// Label value for cells outside any component.
pub const UNLABELED: u32 = 0;

/// Column and row offsets of the 8 neighbours.
const DX: [i64; 8] = [1, 1, 1, 0, -1, -1, -1, 0];
const DY: [i64; 8] = [-1, 0, 1, 1, 1, 0, -1, -1];

/// One maximal 8-connected group of exceeding cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Label in the label grid (1-based)
    pub label: u32,
    /// Row-major cell indices, sorted ascending
    pub cells: Vec<usize>,
}

impl Component {
    /// Smallest row-major index; identifies the component independently of
    /// discovery order.
    pub fn anchor(&self) -> usize {
        self.cells[0]
    }
}

/// Label the connected components of `mask`.
///
/// Seeds are visited in the order given by `seeds` (any permutation of
/// cell indices, or a subset; indices out of range are ignored). The set of
/// components does not depend on that order. Components are returned sorted
/// by anchor, and the returned label grid is renumbered to match.
pub fn label_components(
    mask: &ExceedanceMask,
    seeds: impl IntoIterator<Item = usize>,
) -> (Vec<Component>, Vec<u32>) {
    let width = mask.width() as i64;
    let height = mask.height() as i64;
    let cells = mask.cells();
    let mut labels = vec![UNLABELED; cells.len()];
    let mut components: Vec<Component> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for seed in seeds {
        if seed >= cells.len() || !cells[seed] || labels[seed] != UNLABELED {
            continue;
        }

        let label = components.len() as u32 + 1;
        let mut members = Vec::new();
        labels[seed] = label;
        stack.push(seed);

        while let Some(idx) = stack.pop() {
            members.push(idx);
            let col = (idx as i64) % width;
            let row = (idx as i64) / width;

            for n in 0..8 {
                let col_n = col + DX[n];
                let row_n = row + DY[n];
                if col_n < 0 || col_n >= width || row_n < 0 || row_n >= height {
                    continue;
                }
                let neighbor = (row_n * width + col_n) as usize;
                if cells[neighbor] && labels[neighbor] == UNLABELED {
                    labels[neighbor] = label;
                    stack.push(neighbor);
                }
            }
        }

        members.sort_unstable();
        components.push(Component {
            label,
            cells: members,
        });
    }

    // Canonical numbering: by anchor cell
    components.sort_by_key(|c| c.anchor());
    let mut remap = vec![UNLABELED; components.len() + 1];
    for (i, component) in components.iter_mut().enumerate() {
        remap[component.label as usize] = i as u32 + 1;
        component.label = i as u32 + 1;
    }
    for l in labels.iter_mut() {
        *l = remap[*l as usize];
    }

    (components, labels)
}

/// Row-major seed order.
pub fn row_major(mask: &ExceedanceMask) -> std::ops::Range<usize> {
    0..mask.width() * mask.height()
}
