//! Summary production: the coordinator and the typing simulator it drives

pub mod streaming;
pub mod summarize;

// Re-export the main entry points for convenience
pub use streaming::{StreamingSimulation, simulate};
pub use summarize::{SummaryCoordinator, SummaryHandle, SummaryOutcome};
