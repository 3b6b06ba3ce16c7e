//! Heuristics used only when the classifier reports no decision.
//! They never override a classifier result.

use tracing::debug;

use crate::config::PatternConfig;
use crate::models::{DecisionKind, SlotDelta};
use crate::services::classifier::{
    fuse_slots, fusion, plan_kind_for, seed_delta, Classification, ClassifierInput,
};
use crate::services::intent_shape::IntentShapeAnalyzer;
use crate::utils::text::{find_phrase, trim_query, word_count};

pub struct LegacyHeuristics<'a> {
    config: &'a PatternConfig,
    short_max_words: usize,
}

impl<'a> LegacyHeuristics<'a> {
    pub fn new(config: &'a PatternConfig, short_max_words: usize) -> Self {
        Self {
            config,
            short_max_words,
        }
    }

    pub fn decide(&self, input: &ClassifierInput<'_>) -> Classification {
        let hints = input.hints;
        let state = input.state;
        let topic = state.active_topic.as_ref();

        if let Some(phrase) = find_phrase(&hints.normalized, &self.config.phrases.list_intent)
            .or_else(|| find_phrase(&hints.normalized, &self.config.phrases.reset))
        {
            return self.new_topic(input, "legacy_list_or_reset", format!("'{}' starts over", phrase));
        }

        if let Some(topic) = topic {
            if hints.names_other_than(Some(&topic.value)) {
                let reason = format!(
                    "name '{}' differs from topic '{}'",
                    hints.name.as_deref().unwrap_or_default(),
                    topic.value
                );
                return self.new_topic(input, "legacy_topic_shift", reason);
            }
        }

        let shape = IntentShapeAnalyzer::analyze(input.message);
        if IntentShapeAnalyzer::is_abrupt_change(state.last_intent_shape, shape) {
            let reason = format!(
                "intent shape jumped from {:?} to {:?}",
                state.last_intent_shape, shape
            );
            return self.new_topic(input, "legacy_shape_change", reason);
        }

        let has_context = topic.is_some() || state.slots.has_non_time_context();
        if has_context && hints.name.is_none() && self.is_short_question(&hints.normalized) {
            return self.fuse(input, "legacy_short_question", "short question continues the topic");
        }

        if let Some(topic) = topic {
            let reason = format!("continues active {} topic '{}'", topic.role, topic.value);
            return self.fuse(input, "legacy_active_topic", reason);
        }

        self.new_topic(input, "legacy_seed", "no prior topic")
    }

    fn is_short_question(&self, normalized: &str) -> bool {
        let Some(first) = normalized.split_whitespace().next() else {
            return false;
        };
        word_count(normalized) <= self.short_max_words
            && self.config.phrases.question_openers.iter().any(|o| o == first)
    }

    fn new_topic(
        &self,
        input: &ClassifierInput<'_>,
        rule: &str,
        reason: impl Into<String>,
    ) -> Classification {
        let delta = seed_delta(input, input.hints.seed_role());
        let slots = fuse_slots(self.config, DecisionKind::NewTopic, &input.state.slots, &delta);
        let reason = reason.into();
        debug!(rule, "legacy fallback -> new_topic: {}", reason);
        Classification::new(DecisionKind::NewTopic, rule, reason, slots, trim_query(input.message))
    }

    fn fuse(&self, input: &ClassifierInput<'_>, rule: &str, reason: impl Into<String>) -> Classification {
        let hints = input.hints;
        let previous = &input.state.slots;

        let role = hints.name_role.or(previous.entity_role);
        let metric = hints.metric.clone();
        let delta = SlotDelta {
            entity_role: hints.name_role,
            entity_name: hints.name.clone(),
            all_vendors: hints.all_vendors.then_some(true),
            plan_kind: metric.as_deref().and_then(|m| plan_kind_for(role, m)),
            metric,
            period: hints.period.as_ref().map(|m| m.period.clone()),
            ..Default::default()
        };
        let slots = fuse_slots(self.config, DecisionKind::Fuse, previous, &delta);

        let mut query = trim_query(input.message);
        if let Some(topic) = &input.state.active_topic {
            query = fusion::append_topic(&query, &topic.value);
        }
        let fused_query = fusion::append_time(
            &query,
            previous.period().as_ref(),
            input.today,
            &input.state.time_cache,
        );

        let reason = reason.into();
        debug!(rule, "legacy fallback -> fuse: {}", reason);
        Classification::new(DecisionKind::Fuse, rule, reason, slots, fused_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActiveTopic, ConversationState, EntityRole, IntentShape, Slots};
    use crate::services::extractors::MessageHints;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    fn decide(message: &str, state: &ConversationState) -> Classification {
        let config = PatternConfig::builtin();
        let hints = MessageHints::extract(&config, message, state, today(), EntityRole::Student);
        LegacyHeuristics::new(&config, 8).decide(&ClassifierInput {
            message,
            hints: &hints,
            state,
            today: today(),
        })
    }

    fn jack() -> ConversationState {
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, "Jack Garcia", "spend for Jack Garcia");
        state.slots = Slots {
            entity_role: Some(EntityRole::Student),
            entity_name: Some("Jack Garcia".into()),
            metric: Some("spend".into()),
            ..Default::default()
        };
        state.last_intent_shape = IntentShape::StudentMetrics;
        state
    }

    #[test]
    fn test_fuse_with_active_topic() {
        let c = decide("Now give me invoice details for August", &jack());
        assert_eq!(c.decision, DecisionKind::Fuse);
        assert_eq!(c.rule, "legacy_active_topic");
        assert_eq!(
            c.fused_query,
            "Now give me invoice details for August for Jack Garcia"
        );
        assert_eq!(c.slots.entity_name.as_deref(), Some("Jack Garcia"));
        assert_eq!(c.slots.month.as_deref(), Some("August"));
    }

    #[test]
    fn test_short_question_fuses() {
        let c = decide("why so high?", &jack());
        assert_eq!(c.decision, DecisionKind::Fuse);
        assert_eq!(c.rule, "legacy_short_question");
        assert_eq!(c.fused_query, "why so high for Jack Garcia");
    }

    #[test]
    fn test_list_intent_starts_over() {
        let c = decide("list all students with invoices", &jack());
        assert_eq!(c.decision, DecisionKind::NewTopic);
        assert!(c.slots.entity_name.is_none());
    }

    #[test]
    fn test_different_name_is_new_topic() {
        let c = decide("And Mia Chen?", &jack());
        assert_eq!(c.decision, DecisionKind::NewTopic);
        assert_eq!(c.rule, "legacy_topic_shift");
        assert_eq!(c.slots.entity_name.as_deref(), Some("Mia Chen"));
        assert_eq!(c.slots.entity_role, Some(EntityRole::Student));
    }

    #[test]
    fn test_seed_without_topic() {
        let c = decide("highest invoices", &ConversationState::new());
        assert_eq!(c.decision, DecisionKind::NewTopic);
        assert_eq!(c.rule, "legacy_seed");
        assert!(c.slots.is_empty());
    }
}
