//! Layer enrichment for Areas of Interest.
//!
//! Auxiliary layers (population, watersheds, arbitrary user layers) are
//! registered in a [`LayerRegistry`], loaded once per process through a
//! [`LayerCache`], and applied to AOIs by the [`LayerEnricher`]. Every
//! statistic is stored under `<layer>.<stat>`; a layer that cannot be
//! loaded or reprojected leaves `<layer>.status = unavailable(<reason>)`
//! and never blocks the other layers.

pub mod cache;
pub mod enricher;
pub mod error;
pub mod layer;
pub mod registry;
pub mod remote;
pub mod source;

pub use cache::LayerCache;
pub use enricher::{EnrichmentLayer, LayerEnricher, LayerState};
pub use error::{LayerLoadError, LayerResult};
pub use layer::{LayerFeature, LayerKind, LoadedLayer, VectorLayer};
pub use registry::{LayerEntry, LayerRegistry};
pub use remote::{RemoteGeoJsonSource, RemoteSourceConfig};
pub use source::{GeoJsonFileSource, LayerSource, StaticLayerSource};
