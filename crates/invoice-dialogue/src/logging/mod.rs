//! Decision trace: structured records of every rule firing and fallback

mod tracer;
pub mod types;

pub use tracer::DecisionTracer;
pub use types::{TraceEntry, TraceStage, TraceStatus};

use tracing_subscriber::EnvFilter;

/// JSON subscriber for host binaries. A second call is a no-op.
pub fn init_subscriber(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .try_init();
}
