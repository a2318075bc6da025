pub mod batch;
pub mod collaborative;
pub mod content_based;
pub mod hybrid;
pub mod providers;
pub mod recommendations;
pub mod similarity;

pub use batch::{BatchOrchestrator, BatchPhase, BatchSummary};
pub use hybrid::HybridWeights;
pub use providers::{MediaAttributeProvider, TmdbProvider};
pub use recommendations::{EngineSettings, RecommendationEngine};
