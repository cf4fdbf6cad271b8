//! Ensemble aggregation and risk ranking.
//!
//! Per-member AOI sets for one (date, hour, bin) are rasterized onto a
//! shared [`AnalysisGrid`](pipecast_common::AnalysisGrid) and averaged into
//! a [`ProbabilityRaster`]. The [`RiskRanker`] then scores AOIs by ensemble
//! probability times affected population.

pub mod aggregate;
pub mod consensus;
pub mod member;
pub mod rank;

pub use aggregate::{EnsembleAggregator, ProbabilityRaster};
pub use consensus::consensus_regions;
pub use member::{EnsembleMember, MemberOutcome, MissingMemberPolicy};
pub use rank::{PopulationSource, RankedAoi, RiskRanker};
