//! Decision classifier: previous slots + new message -> one decision,
//! fused slots and a fused query, or no decision at all.

pub mod fusion;
pub mod policy;
mod rules;

pub use policy::{fuse_slots, plan_kind_for};
pub(crate) use rules::seed_delta;

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PatternConfig;
use crate::models::{ConversationState, DecisionKind, SlotDelta, Slots};
use crate::services::extractors::MessageHints;

use rules::{ordered_rules, Rule};

pub const VENDOR_GUARD_RULE: &str = "vendor_guard";

const VENDOR_PROMPT: &str =
    "Which vendor do you mean? Name one, or say \"all vendors\" for a vendor-wide total.";

/// Read-only view of one turn.
pub struct ClassifierInput<'a> {
    pub message: &'a str,
    pub hints: &'a MessageHints,
    pub state: &'a ConversationState,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub decision: DecisionKind,
    /// Name of the rule that produced the decision.
    pub rule: String,
    pub reason: String,
    pub slots: Slots,
    pub fused_query: String,
    pub missing_slots: Vec<String>,
    pub clarification_prompt: Option<String>,
}

impl Classification {
    pub fn new(
        decision: DecisionKind,
        rule: &str,
        reason: impl Into<String>,
        slots: Slots,
        fused_query: impl Into<String>,
    ) -> Self {
        Self {
            decision,
            rule: rule.to_string(),
            reason: reason.into(),
            slots,
            fused_query: fused_query.into(),
            missing_slots: Vec::new(),
            clarification_prompt: None,
        }
    }

    pub fn clarification(
        rule: &str,
        reason: impl Into<String>,
        slots: Slots,
        fused_query: impl Into<String>,
        missing_slots: Vec<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            decision: DecisionKind::Clarification,
            missing_slots,
            clarification_prompt: Some(prompt.into()),
            ..Self::new(DecisionKind::Clarification, rule, reason, slots, fused_query)
        }
    }

    pub fn needs_clarification(&self) -> bool {
        self.decision == DecisionKind::Clarification
    }
}

/// Vendor scope with no vendor named and no "all vendors" confirmation
/// becomes a clarification. Applied after every decision source.
pub fn apply_vendor_guard(classification: Classification) -> Classification {
    if classification.needs_clarification() || !classification.slots.is_unscoped_vendor() {
        return classification;
    }

    warn!(
        rule = %classification.rule,
        decision = classification.decision.as_str(),
        "vendor scope without a vendor name, asking for clarification"
    );
    let reason = format!(
        "{} produced vendor scope without a vendor name ({})",
        classification.rule, classification.reason
    );
    Classification::clarification(
        VENDOR_GUARD_RULE,
        reason,
        classification.slots,
        classification.fused_query,
        vec!["vendor_name".to_string()],
        VENDOR_PROMPT,
    )
}

pub struct DecisionClassifier {
    config: Arc<PatternConfig>,
    rules: Vec<Rule>,
}

impl DecisionClassifier {
    pub fn new(config: Arc<PatternConfig>) -> Self {
        Self {
            config,
            rules: ordered_rules(),
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Rule names with their nominal decisions, in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, DecisionKind)> + '_ {
        self.rules.iter().map(|r| (r.name, r.decision))
    }

    /// First matching rule wins. `None` means no rule fired and the caller
    /// should fall back to its own heuristics.
    pub fn classify(&self, input: &ClassifierInput<'_>) -> Option<Classification> {
        let rule = self
            .rules
            .iter()
            .find(|rule| (rule.applies)(&self.config, input))?;

        let outcome = (rule.resolve)(&self.config, input);
        let slots = self.fuse(outcome.decision, &input.state.slots, &outcome.delta);
        debug!(
            rule = rule.name,
            decision = outcome.decision.as_str(),
            "classifier rule fired: {}",
            outcome.reason
        );

        Some(apply_vendor_guard(Classification::new(
            outcome.decision,
            rule.name,
            outcome.reason,
            slots,
            outcome.fused_query,
        )))
    }

    pub fn fuse(&self, decision: DecisionKind, previous: &Slots, delta: &SlotDelta) -> Slots {
        fuse_slots(&self.config, decision, previous, delta)
    }
}
