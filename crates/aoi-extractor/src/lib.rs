//! Threshold-based Area of Interest extraction.
//!
//! Turns a gridded field into polygons delimiting the regions where the
//! field meets a threshold:
//!
//! 1. [`mask`]: binary exceedance mask (`value >= threshold`, NaN never
//!    exceeds)
//! 2. [`label`]: 8-connected component labeling
//! 3. [`trace`]: exact boundary tracing of each component's cell union
//! 4. simplification, area filtering and optional land clipping ([`clip`])
//!
//! The result for a given field, threshold and configuration does not depend
//! on the order in which cells are visited.

pub mod clip;
pub mod extractor;
pub mod label;
pub mod mask;
pub mod trace;

pub use extractor::{AoiExtractor, ExtractorConfig};
pub use label::{label_components, Component};
pub use mask::ExceedanceMask;
