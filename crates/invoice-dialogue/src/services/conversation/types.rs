use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationState, DecisionKind, QueryMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPhase {
    NoTopic,
    ActiveTopic,
    AwaitingClarification,
}

impl TopicPhase {
    pub fn of(state: &ConversationState) -> Self {
        if state.awaiting_clarification() {
            Self::AwaitingClarification
        } else if state.active_topic.is_some() {
            Self::ActiveTopic
        } else {
            Self::NoTopic
        }
    }
}

/// Outcome of one turn, handed back to the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub decision: DecisionKind,
    /// Rule or fallback that produced the decision.
    pub rule: String,
    pub needs_clarification: bool,
    pub fused_query: String,
    pub missing_slots: Vec<String>,
    pub clarification_prompt: Option<String>,
    /// Mode implied by the fused query text, before plan-aware routing.
    pub provisional_mode: Option<QueryMode>,
    pub state: ConversationState,
}

/// What the assistant answered, fed back after execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSummary {
    pub reply: String,
    /// Entity names in the result set, for later pronoun resolution.
    pub entity_candidates: Vec<String>,
    /// Invoice identifiers in the result set.
    pub invoice_candidates: Vec<String>,
}

/// Source of "today" for relative time phrases.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
