pub mod config;
pub mod intelligence; // Lab verification + drug interactions
pub mod models;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::processor::{build_orchestrator, AnalysisError, AnalysisOrchestrator};
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `RUST_LOG`, falling back to the crate default.
/// Logs go to stderr so stdout stays clean JSON.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    // A second call (tests, embedding hosts) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
