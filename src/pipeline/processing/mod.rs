// Cleaning phases: normalization, exact dedup and perplexity scoring

pub mod dedup;
pub mod normalize;
pub mod quality_gate;

pub use dedup::DedupPhase;
pub use normalize::Normalizer;
pub use quality_gate::{BucketScheme, QualityScorer};
