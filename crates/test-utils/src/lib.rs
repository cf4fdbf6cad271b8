//! Shared test utilities for the pipecast workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic precipitation fields and polygons
//! - Common fixtures (dates, members, AOIs)
//! - Temporary directory helpers
//! - Approximate-equality assertion macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that two geometries cover the same area, by comparing the areas
/// of both and of their intersection.
///
/// ```ignore
/// use test_utils::assert_same_footprint;
///
/// assert_same_footprint!(aoi.geometry, expected, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_same_footprint {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        use geo::{Area, BooleanOps};
        let left = &$left;
        let right = &$right;
        let common = left.intersection(right).unsigned_area();
        $crate::assert_approx_eq!(left.unsigned_area(), right.unsigned_area(), $epsilon);
        $crate::assert_approx_eq!(common, left.unsigned_area(), $epsilon);
    }};
}
