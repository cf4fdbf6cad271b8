//! Exact boundary tracing of a component's cell union.
//!
//! Works in index space: vertex `(x, y)` is the corner at column `x`, row
//! `y`, with `y` growing downwards. Every cell side shared with a
//! non-member cell becomes one directed unit edge, oriented so the member
//! cell lies on its right (clockwise on screen). Edges are linked into
//! closed rings, and rings that revisit a vertex are split there so every
//! ring is simple. Exterior rings then have positive signed area and holes
//! negative.

use crate::Component;
use std::collections::HashMap;

/// Ring of index-space vertices, implicitly closed (first != last).
pub type Ring = Vec<(i64, i64)>;

/// A polygon in index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPolygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    start: (i64, i64),
    end: (i64, i64),
}

impl Edge {
    fn direction(&self) -> (i64, i64) {
        (self.end.0 - self.start.0, self.end.1 - self.start.1)
    }
}

/// Trace the polygons covering exactly the cells of `component`.
///
/// `labels` is the label grid produced alongside the component. Collinear
/// vertices are removed; the footprint area is preserved exactly.
pub fn trace_component(
    component: &Component,
    labels: &[u32],
    width: usize,
    height: usize,
) -> Vec<IndexPolygon> {
    let edges = boundary_edges(component, labels, width, height);
    let rings: Vec<Ring> = link_rings(&edges)
        .into_iter()
        .flat_map(split_at_repeated_vertices)
        .map(remove_collinear)
        .filter(|r| r.len() >= 4)
        .collect();

    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) =
        rings.into_iter().partition(|r| signed_area2(r) > 0);

    let mut polygons: Vec<IndexPolygon> = exteriors
        .into_iter()
        .map(|exterior| IndexPolygon {
            exterior,
            holes: Vec::new(),
        })
        .collect();

    for hole in holes {
        let Some((px, py)) = edge_midpoint(&hole) else {
            continue;
        };
        let owner = polygons
            .iter()
            .enumerate()
            .filter(|(_, p)| contains_doubled(&p.exterior, px, py))
            .min_by_key(|(_, p)| signed_area2(&p.exterior))
            .map(|(i, _)| i);
        if let Some(i) = owner {
            polygons[i].holes.push(hole);
        }
    }

    polygons
}

/// One directed edge per member-cell side facing a non-member cell.
fn boundary_edges(component: &Component, labels: &[u32], width: usize, height: usize) -> Vec<Edge> {
    let is_member = |col: i64, row: i64| -> bool {
        col >= 0
            && row >= 0
            && (col as usize) < width
            && (row as usize) < height
            && labels[row as usize * width + col as usize] == component.label
    };

    let mut edges = Vec::new();
    for &idx in &component.cells {
        let c = (idx % width) as i64;
        let r = (idx / width) as i64;

        if !is_member(c, r - 1) {
            edges.push(Edge { start: (c, r), end: (c + 1, r) });
        }
        if !is_member(c + 1, r) {
            edges.push(Edge { start: (c + 1, r), end: (c + 1, r + 1) });
        }
        if !is_member(c, r + 1) {
            edges.push(Edge { start: (c + 1, r + 1), end: (c, r + 1) });
        }
        if !is_member(c - 1, r) {
            edges.push(Edge { start: (c, r + 1), end: (c, r) });
        }
    }
    edges
}

/// Link directed edges into closed rings.
///
/// Where two rings touch at a vertex (diagonal pinch) there are two
/// outgoing edges; the right turn is taken so each ring stays simple.
fn link_rings(edges: &[Edge]) -> Vec<Ring> {
    let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;

        let mut ring = Vec::new();
        let mut current = start;
        loop {
            ring.push(edges[current].start);

            let dir = edges[current].direction();
            let next = outgoing
                .get(&edges[current].end)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&e| !used[e] || e == start)
                .min_by_key(|&e| turn_rank(dir, edges[e].direction()));

            match next {
                Some(e) if e == start => break,
                Some(e) => {
                    used[e] = true;
                    current = e;
                }
                None => break,
            }
        }
        rings.push(ring);
    }

    rings
}

/// Split a closed ring into simple rings at vertices it visits twice.
///
/// Right turns keep diagonal member cells apart, so the two non-member
/// cells at a pinch end up on one ring; that ring touches itself at the
/// pinch vertex and is cut there. The pieces touch at a single point.
fn split_at_repeated_vertices(ring: Ring) -> Vec<Ring> {
    let mut pieces = Vec::new();
    let mut stack: Ring = Vec::with_capacity(ring.len());
    let mut position: HashMap<(i64, i64), usize> = HashMap::new();

    for vertex in ring {
        if let Some(&p) = position.get(&vertex) {
            let piece: Ring = stack.split_off(p + 1);
            for v in &piece {
                position.remove(v);
            }
            let mut closed = Vec::with_capacity(piece.len() + 1);
            closed.push(vertex);
            closed.extend(piece);
            pieces.push(closed);
        } else {
            position.insert(vertex, stack.len());
            stack.push(vertex);
        }
    }
    if !stack.is_empty() {
        pieces.push(stack);
    }
    pieces
}

/// Preference of turning from `from` to `to`: right, straight, left, back.
fn turn_rank(from: (i64, i64), to: (i64, i64)) -> u8 {
    let right = (-from.1, from.0);
    if to == right {
        0
    } else if to == from {
        1
    } else if to == (-right.0, -right.1) {
        2
    } else {
        3
    }
}

fn remove_collinear(ring: Ring) -> Ring {
    let n = ring.len();
    if n < 3 {
        return ring;
    }
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            (cur.0 - prev.0) * (next.1 - cur.1) - (cur.1 - prev.1) * (next.0 - cur.0) != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed shoelace area; positive for exterior rings.
pub fn signed_area2(ring: &Ring) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// A point in doubled coordinates half a cell along one of the ring's
/// vertical edges. Its doubled y is odd, so it never lies on a vertex row.
fn edge_midpoint(ring: &Ring) -> Option<(i64, i64)> {
    let n = ring.len();
    (0..n).find_map(|i| {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        (a.0 == b.0).then(|| (2 * a.0, 2 * a.1 + (b.1 - a.1).signum()))
    })
}

/// Even-odd containment of a doubled-coordinate point, counting crossings
/// of vertical edges strictly to the right.
fn contains_doubled(ring: &Ring, px: i64, py: i64) -> bool {
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let (ax, ay) = (2 * ring[i].0, 2 * ring[i].1);
        let (bx, by) = (2 * ring[(i + 1) % n].0, 2 * ring[(i + 1) % n].1);
        if ax == bx && (ay > py) != (by > py) && ax > px {
            inside = !inside;
        }
    }
    inside
}
