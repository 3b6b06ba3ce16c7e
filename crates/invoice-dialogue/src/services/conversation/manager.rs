/// manager.rs
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{load_patterns, DialogueConfig, PatternConfig, Settings};
use crate::logging::{DecisionTracer, TraceEntry, TraceStage, TraceStatus};
use crate::models::{
    ActiveTopic, ConversationState, DecisionKind, EntityRole, HistoryRole, NormalizedIntent,
    QueryMode, ResolvedEntities, RoutingDecision, SemanticPlan, Slots,
};
use crate::services::classifier::{
    apply_vendor_guard, seed_delta, Classification, ClassifierInput, DecisionClassifier,
    VENDOR_GUARD_RULE,
};
use crate::services::extractors::{MessageHints, ReferenceResolution, ReferenceResolver};
use crate::services::intent_shape::IntentShapeAnalyzer;
use crate::services::router::{QueryModeRouter, RouteRequest};
use crate::services::store::{LoadOutcome, SessionStore, StateRepository};
use crate::utils::error::DialogueResult;
use crate::utils::text::{push_unique, trim_query};

use super::clarification::{ClarificationResolver, ResumeOutcome};
use super::legacy::LegacyHeuristics;
use super::types::{Clock, ResultSummary, SystemClock, TopicPhase, TurnResult};

const EMPTY_MESSAGE_RULE: &str = "empty_message";
const PENDING_RULE: &str = "clarification_pending";
const RESUME_RULE: &str = "clarification_resume";
const NAME_SHIFT_RULE: &str = "explicit_name_shift";

const EMPTY_PROMPT: &str = "What would you like to know about invoices, students or vendors?";

/// Orchestrates one conversational turn: load, extract, classify, apply,
/// persist. A turn never fails; store problems degrade to a fresh state
/// and are traced.
pub struct TopicController {
    repository: StateRepository,
    classifier: DecisionClassifier,
    router: QueryModeRouter,
    config: Arc<PatternConfig>,
    tracer: DecisionTracer,
    clock: Arc<dyn Clock>,
    settings: DialogueConfig,
}

impl TopicController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: Arc<PatternConfig>,
        settings: DialogueConfig,
        tracer: DecisionTracer,
    ) -> Self {
        let repository =
            StateRepository::new(store, settings.key_prefix.clone(), settings.session_ttl());
        Self {
            repository,
            classifier: DecisionClassifier::new(config.clone()),
            router: QueryModeRouter::new(config.clone()),
            config,
            tracer,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Build from loaded settings, reading the pattern table they name.
    pub fn from_settings(settings: &Settings, store: Arc<dyn SessionStore>) -> DialogueResult<Self> {
        let config = Arc::new(load_patterns(settings)?);
        let tracer = DecisionTracer::new(settings.tracing.queue_capacity);
        info!(
            "TopicController ready: ttl={}s, history={}",
            settings.dialogue.session_ttl_seconds, settings.dialogue.max_history_entries
        );
        Ok(Self::new(store, config, settings.dialogue.clone(), tracer))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tracer(&self) -> &DecisionTracer {
        &self.tracer
    }

    pub fn router(&self) -> &QueryModeRouter {
        &self.router
    }

    pub fn classifier(&self) -> &DecisionClassifier {
        &self.classifier
    }

    pub async fn load_state(&self, session_key: &str) -> ConversationState {
        let outcome = self.repository.load(session_key).await;
        self.trace_load(session_key, &outcome);
        outcome.into_state()
    }

    pub async fn phase(&self, session_key: &str) -> TopicPhase {
        TopicPhase::of(&self.load_state(session_key).await)
    }

    pub async fn handle_turn(&self, session_key: &str, message: &str) -> TurnResult {
        let mut state = self.load_state(session_key).await;

        let message = message.trim();
        if message.is_empty() {
            self.trace(
                TraceEntry::builder(session_key, TraceStage::Clarification, EMPTY_MESSAGE_RULE)
                    .status(TraceStatus::Anomaly)
                    .reason("empty message, nothing to route")
                    .build(),
            );
            return TurnResult {
                decision: DecisionKind::Clarification,
                rule: EMPTY_MESSAGE_RULE.to_string(),
                needs_clarification: true,
                fused_query: String::new(),
                missing_slots: vec!["question".to_string()],
                clarification_prompt: Some(EMPTY_PROMPT.to_string()),
                provisional_mode: None,
                state,
            };
        }

        let today = self.clock.today();
        let previous_slots = state.slots.clone();

        let resumed = self.resume_clarification(session_key, &mut state, message);
        let hints = MessageHints::extract(
            &self.config,
            message,
            &state,
            today,
            self.settings.default_name_role,
        );
        let classification = match resumed {
            Some(classification) => classification,
            None => self.classify(session_key, message, &hints, &state, today),
        };

        self.apply(session_key, &mut state, &classification, message);
        let provisional_mode = if classification.needs_clarification() {
            None
        } else {
            self.record_period(&mut state, &classification, &hints, &previous_slots);
            self.provisional_mode(session_key, &mut state, &classification)
        };

        state.push_history(HistoryRole::User, message, self.settings.max_history_entries);
        state.turn_count += 1;
        state.touch();
        self.persist(session_key, &state).await;

        debug!(
            session = %session_key,
            decision = classification.decision.as_str(),
            rule = %classification.rule,
            "Turn handled: {}",
            classification.fused_query
        );

        TurnResult {
            decision: classification.decision,
            rule: classification.rule,
            needs_clarification: classification.decision == DecisionKind::Clarification,
            fused_query: classification.fused_query,
            missing_slots: classification.missing_slots,
            clarification_prompt: classification.clarification_prompt,
            provisional_mode,
            state,
        }
    }

    /// Route a fused query once the collaborators have produced a plan,
    /// resolved entities and a normalized intent.
    pub async fn route(
        &self,
        session_key: &str,
        plan: &SemanticPlan,
        entities: &ResolvedEntities,
        intent: &NormalizedIntent,
    ) -> RoutingDecision {
        let state = self.load_state(session_key).await;
        let decision = self.router.route(RouteRequest {
            plan,
            entities,
            intent,
            state: &state,
            today: self.clock.today(),
        });

        self.trace(
            TraceEntry::builder(session_key, TraceStage::Router, decision.mode.as_str())
                .status(TraceStatus::Info)
                .reason(decision.notes.join("; "))
                .field("primary_entities", decision.primary_entities.clone())
                .field("time_window", decision.time_window.as_str())
                .build(),
        );
        decision
    }

    /// Feed back what the assistant answered so later pronouns and
    /// placeholders can resolve against it.
    pub async fn record_result(&self, session_key: &str, summary: ResultSummary) -> DialogueResult<()> {
        let mut state = self.load_state(session_key).await;

        let mut entities = Vec::new();
        for name in &summary.entity_candidates {
            push_unique(&mut entities, name);
        }
        let mut invoices = Vec::new();
        for id in &summary.invoice_candidates {
            push_unique(&mut invoices, id);
        }
        // Replaced wholesale, never merged with the previous result.
        state.candidate_entities = entities;
        state.last_invoice_candidates = invoices;

        if !summary.reply.trim().is_empty() {
            state.push_history(
                HistoryRole::Assistant,
                &summary.reply,
                self.settings.max_history_entries,
            );
        }
        state.touch();
        self.repository.save(session_key, &state).await
    }

    pub async fn reset_session(&self, session_key: &str) -> DialogueResult<()> {
        info!("Resetting session {}", session_key);
        self.repository.clear(session_key).await
    }

    fn resume_clarification(
        &self,
        session_key: &str,
        state: &mut ConversationState,
        message: &str,
    ) -> Option<Classification> {
        if !state.awaiting_clarification() {
            return None;
        }

        match ClarificationResolver::new(&self.config).resume(state, message) {
            ResumeOutcome::Abandoned => {
                self.trace(
                    TraceEntry::builder(session_key, TraceStage::Clarification, "clarification_abandoned")
                        .status(TraceStatus::Info)
                        .reason("reply starts over instead of answering")
                        .field("missing_slots", state.missing_slots.clone())
                        .build(),
                );
                state.clear_clarification();
                None
            }
            ResumeOutcome::Completed {
                slots,
                fused_query,
                resolved,
            } => {
                let keys: Vec<String> = resolved.keys().cloned().collect();
                let reason = format!("filled {}", keys.join(", "));
                self.trace(
                    TraceEntry::builder(session_key, TraceStage::Clarification, RESUME_RULE)
                        .status(TraceStatus::Fired)
                        .reason(reason.clone())
                        .field("resolved", keys)
                        .build(),
                );
                state.clear_clarification();
                Some(apply_vendor_guard(Classification::new(
                    DecisionKind::Fuse,
                    RESUME_RULE,
                    reason,
                    slots,
                    fused_query,
                )))
            }
            ResumeOutcome::Pending { missing, resolved } => {
                state.resolved_slots = resolved;
                let prompt = format!("I still need: {}.", missing.join(", "));
                Some(Classification::clarification(
                    PENDING_RULE,
                    "reply left slots unfilled",
                    state.slots.clone(),
                    state.pending_query.clone().unwrap_or_default(),
                    missing,
                    prompt,
                ))
            }
        }
    }

    fn classify(
        &self,
        session_key: &str,
        message: &str,
        hints: &MessageHints,
        state: &ConversationState,
        today: NaiveDate,
    ) -> Classification {
        match &hints.reference {
            ReferenceResolution::Ambiguous { slot, candidates } => {
                let reason = format!("{} candidates for a reference", candidates.len());
                self.trace(
                    TraceEntry::builder(session_key, TraceStage::Reference, "ambiguous_reference")
                        .status(TraceStatus::Info)
                        .reason(reason.clone())
                        .field("candidates", candidates.clone())
                        .build(),
                );
                return Classification::clarification(
                    "ambiguous_reference",
                    reason,
                    state.slots.clone(),
                    trim_query(message),
                    vec![slot.clone()],
                    format!("Which one do you mean: {}?", candidates.join(", ")),
                );
            }
            ReferenceResolution::NotReferenced => {}
            other => self.trace(
                TraceEntry::builder(session_key, TraceStage::Reference, other.label())
                    .status(TraceStatus::Info)
                    .reason(format!("reference {}", other.label()))
                    .build(),
            ),
        }

        let resolved_message = match &hints.reference {
            ReferenceResolution::Invoice(id) => {
                ReferenceResolver::new(&self.config).substitute_invoice(message, id)
            }
            _ => message.to_string(),
        };
        let input = ClassifierInput {
            message: &resolved_message,
            hints,
            state,
            today,
        };

        let classification = match self.classifier.classify(&input) {
            Some(classification) => {
                self.trace_classification(session_key, TraceStage::Classifier, TraceStatus::Fired, &classification);
                classification
            }
            None => {
                let legacy = LegacyHeuristics::new(&self.config, self.settings.legacy_short_max_words);
                let classification = apply_vendor_guard(legacy.decide(&input));
                self.trace_classification(
                    session_key,
                    TraceStage::LegacyFallback,
                    TraceStatus::Fallback,
                    &classification,
                );
                classification
            }
        };

        if classification.rule == VENDOR_GUARD_RULE {
            self.trace(
                TraceEntry::builder(session_key, TraceStage::VendorGuard, VENDOR_GUARD_RULE)
                    .status(TraceStatus::Anomaly)
                    .reason(classification.reason.clone())
                    .build(),
            );
        }

        self.check_name_shift(session_key, classification, &input)
    }

    /// A continuation that names a different entity than the topic is a
    /// new topic, whatever produced it.
    fn check_name_shift(
        &self,
        session_key: &str,
        classification: Classification,
        input: &ClassifierInput<'_>,
    ) -> Classification {
        let Some(topic) = &input.state.active_topic else {
            return classification;
        };
        let hints = input.hints;
        if !classification.decision.is_continuation() || !hints.names_other_than(Some(&topic.value)) {
            return classification;
        }

        let reason = format!(
            "{} continued '{}' but the message names '{}'",
            classification.rule,
            topic.value,
            hints.name.as_deref().unwrap_or_default()
        );
        self.trace(
            TraceEntry::builder(session_key, TraceStage::TopicShift, NAME_SHIFT_RULE)
                .status(TraceStatus::Fired)
                .reason(reason.clone())
                .build(),
        );

        let delta = seed_delta(input, hints.seed_role());
        let slots = self.classifier.fuse(DecisionKind::NewTopic, &input.state.slots, &delta);
        apply_vendor_guard(Classification::new(
            DecisionKind::NewTopic,
            NAME_SHIFT_RULE,
            reason,
            slots,
            trim_query(input.message),
        ))
    }

    fn apply(
        &self,
        session_key: &str,
        state: &mut ConversationState,
        classification: &Classification,
        message: &str,
    ) {
        match classification.decision {
            DecisionKind::Clarification => {
                if classification.rule != PENDING_RULE {
                    state.resolved_slots.clear();
                }
                // The parked query may no longer be about the topic.
                let keeps_topic = state.active_topic.as_ref().is_some_and(|topic| {
                    classification
                        .slots
                        .entity_name
                        .as_deref()
                        .is_some_and(|name| topic.matches(name))
                });
                if !keeps_topic {
                    state.active_topic = None;
                }
                state.missing_slots = classification.missing_slots.clone();
                state.pending_query = Some(classification.fused_query.clone());
                state.slots = classification.slots.clone();
                self.trace(
                    TraceEntry::builder(session_key, TraceStage::Clarification, &classification.rule)
                        .status(TraceStatus::Info)
                        .reason(classification.reason.clone())
                        .field("missing_slots", classification.missing_slots.clone())
                        .build(),
                );
                return;
            }
            DecisionKind::NewTopic => {
                let previous = state.active_topic.as_ref().map(|t| t.value.clone());
                state.reset_topic();
                state.slots = classification.slots.clone();
                state.active_topic = self.seed_topic(&classification.slots, &classification.fused_query);

                if let Some(previous) = previous {
                    let next = state.active_topic.as_ref().map(|t| t.value.clone());
                    self.trace(
                        TraceEntry::builder(session_key, TraceStage::TopicShift, &classification.rule)
                            .status(TraceStatus::Info)
                            .reason(format!("topic '{}' cleared", previous))
                            .field("previous", previous)
                            .field("next", next)
                            .build(),
                    );
                }
            }
            _ => {
                state.slots = classification.slots.clone();
                self.refresh_topic(state, classification);
            }
        }

        state.last_fused_query = Some(classification.fused_query.clone());
        state.last_intent_shape = IntentShapeAnalyzer::analyze(message);
    }

    fn seed_topic(&self, slots: &Slots, fused_query: &str) -> Option<ActiveTopic> {
        let name = slots.entity_name.as_deref()?;
        let role = match slots.entity_role {
            Some(role @ (EntityRole::Student | EntityRole::Vendor | EntityRole::Clinician)) => role,
            Some(_) => return None,
            None => self.settings.default_name_role,
        };
        ActiveTopic::new(role, name, fused_query)
    }

    fn refresh_topic(&self, state: &mut ConversationState, classification: &Classification) {
        let fused = &classification.fused_query;
        let name = classification.slots.entity_name.as_deref();
        let same_topic = match (&state.active_topic, name) {
            (Some(topic), Some(name)) => topic.matches(name),
            (Some(_), None) => true,
            (None, _) => false,
        };

        if same_topic {
            if let Some(topic) = state.active_topic.as_mut() {
                topic.last_query = fused.clone();
            }
        } else if name.is_some() {
            state.active_topic = self.seed_topic(&classification.slots, fused);
        }
    }

    /// Keep the time cache in step with the slots it shadows.
    fn record_period(
        &self,
        state: &mut ConversationState,
        classification: &Classification,
        hints: &MessageHints,
        previous_slots: &Slots,
    ) {
        let Some(current) = classification.slots.period() else {
            return;
        };
        if Some(&current) == previous_slots.period().as_ref() && !state.time_cache.is_empty() {
            return;
        }

        match &hints.period {
            Some(found) if found.period.kind == current.kind && found.period.month == current.month => {
                state.time_cache.record(&found.period, found.explicit_month)
            }
            _ => {
                let explicit = current.month.is_some();
                state.time_cache.record(&current, explicit)
            }
        }
    }

    /// Mode implied by the fused query, applied before routing so a
    /// non-entity-scoped mode drops the topic in the same turn.
    fn provisional_mode(
        &self,
        session_key: &str,
        state: &mut ConversationState,
        classification: &Classification,
    ) -> Option<QueryMode> {
        let text = self.router.detect_text_mode(&classification.fused_query);
        let explicit = text.as_ref().filter(|m| m.is_explicit()).map(|m| m.mode);
        let rule_mode = match classification.decision {
            DecisionKind::ProviderTimeFollowup => classification.slots.mode,
            _ => None,
        };

        let mode = explicit
            .or(rule_mode)
            .or(text.map(|m| m.mode))
            .or(classification.slots.mode)
            .or_else(|| {
                classification
                    .slots
                    .entity_role
                    .and_then(QueryMode::default_for_role)
            })?;
        state.slots.mode = Some(mode);

        if mode.is_non_entity_scoped() {
            if let Some(topic) = state.active_topic.take() {
                self.trace(
                    TraceEntry::builder(session_key, TraceStage::Override, "non_entity_scoped_mode")
                        .status(TraceStatus::Fired)
                        .reason(format!("{} does not carry an entity filter", mode))
                        .field("cleared_topic", topic.value)
                        .build(),
                );
            }
        }
        Some(mode)
    }

    async fn persist(&self, session_key: &str, state: &ConversationState) {
        if let Err(e) = self.repository.save(session_key, state).await {
            warn!("Failed to persist session {}: {}", session_key, e);
            self.trace(
                TraceEntry::builder(session_key, TraceStage::Store, "save_failed")
                    .status(TraceStatus::Anomaly)
                    .reason(e.to_string())
                    .build(),
            );
        }
    }

    fn trace_load(&self, session_key: &str, outcome: &LoadOutcome) {
        let (status, reason) = match outcome {
            LoadOutcome::Found(state) => (TraceStatus::Info, format!("turn {}", state.turn_count)),
            LoadOutcome::Missing => (TraceStatus::Info, "no stored state".to_string()),
            LoadOutcome::Malformed(e) => (TraceStatus::Anomaly, format!("discarded malformed state: {}", e)),
            LoadOutcome::Unavailable(e) => (TraceStatus::Anomaly, format!("store unavailable: {}", e)),
        };
        self.trace(
            TraceEntry::builder(session_key, TraceStage::Store, outcome.label())
                .status(status)
                .reason(reason)
                .build(),
        );
    }

    fn trace_classification(
        &self,
        session_key: &str,
        stage: TraceStage,
        status: TraceStatus,
        classification: &Classification,
    ) {
        self.trace(
            TraceEntry::builder(session_key, stage, &classification.rule)
                .status(status)
                .reason(classification.reason.clone())
                .field("decision", classification.decision.as_str())
                .field("fused_query", classification.fused_query.clone())
                .build(),
        );
    }

    fn trace(&self, entry: TraceEntry) {
        self.tracer.record(entry);
    }
}
