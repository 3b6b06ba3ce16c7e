pub mod classifier;
pub mod conversation;
pub mod extractors;
pub mod intent_shape;
pub mod router;
pub mod store;

pub use classifier::{Classification, DecisionClassifier};
pub use conversation::{TopicController, TurnResult};
pub use intent_shape::IntentShapeAnalyzer;
pub use router::{QueryModeRouter, RouteRequest};
pub use store::{MemorySessionStore, SessionStore, StateRepository};
