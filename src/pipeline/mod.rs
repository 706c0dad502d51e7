// Cleaning pipeline: configuration, phases, orchestration and run statistics

pub mod orchestrator;
pub mod phase;
pub mod pipeline_config;
pub mod processing;
pub mod stats;

pub use orchestrator::{PipelineOrchestrator, RunOutcome};
pub use phase::Phase;
pub use pipeline_config::PipelineConfig;
pub use stats::PipelineStats;
