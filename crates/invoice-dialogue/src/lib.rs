pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{PatternConfig, Settings};
pub use logging::DecisionTracer;
pub use services::conversation::{ResultSummary, TopicController, TopicPhase, TurnResult};
pub use services::router::{QueryModeRouter, RouteRequest};
pub use services::store::{MemorySessionStore, SessionStore};
pub use utils::{DialogueError, DialogueResult};
