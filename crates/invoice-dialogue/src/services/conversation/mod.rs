//! Topic continuity
//!
//! Decides, turn by turn, whether a message continues the active topic,
//! starts a new one or needs clarification, and keeps session state in
//! step with that decision.

mod clarification;
mod legacy;
pub mod manager;
pub mod types;

pub use clarification::{ClarificationResolver, ResumeOutcome};
pub use legacy::LegacyHeuristics;
pub use manager::TopicController;
pub use types::{Clock, FixedClock, ResultSummary, SystemClock, TopicPhase, TurnResult};
