//! Query mode router.
//!
//! Turns the advisory semantic plan, resolved entities and conversation
//! state into exactly one [`RoutingDecision`]. Precedence, highest first:
//!
//! 1. explicit top-N phrasing (entity scope cleared)
//! 2. drilldown / line-item language
//! 3. trigger table, ties broken by [`QueryMode::PRIORITY`]
//! 4. plan kind, which overrides an ambiguous trigger match but yields to
//!    unanimous triggers for a more specific mode
//! 5. inheritance of the active student/vendor topic and cached month
//! 6. provider + time safe-fallback for student breakdowns
//! 7. terminal guard on district-wide provider breakdowns
//!
//! Every step that changes the outcome leaves a note on the decision.

pub mod triggers;

pub use triggers::{TextModeMatch, TextModeSource, TriggerHit, DEFAULT_TOP_N};

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PatternConfig;
use crate::models::{
    ConversationState, DateRange, EntityRole, NormalizedIntent, QueryMode, ResolvedEntities,
    RoutingDecision, SemanticPlan, TimeWindowKind,
};
use crate::services::extractors::periods::{month_name, month_number};
use crate::services::extractors::{MetricDetector, PeriodExtractor, PeriodMatch};
use crate::utils::text::{find_phrase, normalize, push_unique};

/// Inputs for one routing call.
pub struct RouteRequest<'a> {
    pub plan: &'a SemanticPlan,
    pub entities: &'a ResolvedEntities,
    pub intent: &'a NormalizedIntent,
    pub state: &'a ConversationState,
    pub today: NaiveDate,
}

pub struct QueryModeRouter {
    config: Arc<PatternConfig>,
}

impl QueryModeRouter {
    pub fn new(config: Arc<PatternConfig>) -> Self {
        Self { config }
    }

    /// Mode implied by text alone (precedence steps 1-3).
    pub fn detect_text_mode(&self, text: &str) -> Option<TextModeMatch> {
        triggers::detect_text_mode(&self.config, &normalize(text))
    }

    pub fn route(&self, request: RouteRequest<'_>) -> RoutingDecision {
        let RouteRequest {
            plan,
            entities,
            intent,
            state,
            today,
        } = request;

        let normalized = normalize(&intent.text);
        let period = PeriodExtractor::extract(&intent.text, today, &state.time_cache);
        let text_mode = self.detect_text_mode(&intent.text);
        let mut notes = Vec::new();

        // Steps 1-4
        let explicit = text_mode.as_ref().is_some_and(TextModeMatch::is_explicit);
        let mut mode = self.select_mode(plan, text_mode.as_ref(), &mut notes);
        let top_n = text_mode.as_ref().and_then(|m| m.top_n);

        // Step 5, with vendor containment
        let (mut primary_type, mut primary_entities) =
            self.primary_entities(plan, entities, intent, &mut notes);

        if mode == Some(QueryMode::TopInvoices) {
            if primary_type.is_some() || !primary_entities.is_empty() {
                notes.push("top_n: entity scope cleared".to_string());
            }
            primary_type = None;
            primary_entities.clear();
        }

        let entity_scoped = mode.map_or(true, |m| !m.is_non_entity_scoped());
        if primary_entities.is_empty() && entity_scoped {
            if let Some(topic) = state
                .active_topic
                .as_ref()
                .filter(|t| matches!(t.role, EntityRole::Student | EntityRole::Vendor))
            {
                primary_type = Some(topic.role);
                primary_entities.push(topic.value.clone());
                notes.push(format!("inherit: {} '{}' from active topic", topic.role, topic.value));
            }
        }

        let mut time = self.resolve_time(plan, period.as_ref(), state, entity_scoped, &mut notes);

        // A generic provider breakdown for one student.
        if mode == Some(QueryMode::ProviderBreakdown) && primary_type == Some(EntityRole::Student) {
            let refined = student_provider_mode(&time);
            notes.push(format!("refine: provider_breakdown -> {} for student", refined));
            mode = Some(refined);
        }

        // Default mode when nothing above decided.
        let mut mode = match mode {
            Some(mode) => mode,
            None => {
                let fallback = primary_type
                    .and_then(QueryMode::default_for_role)
                    .map(|m| (m, "primary role"))
                    .or_else(|| state.slots.mode.map(|m| (m, "conversation slot")))
                    .unwrap_or((QueryMode::DistrictSummary, "no other signal"));
                notes.push(format!("default: {} ({})", fallback.0, fallback.1));
                fallback.0
            }
        };

        // Step 6: provider + time safe-fallback.
        if !explicit && primary_type == Some(EntityRole::Student) {
            let provider_focus = find_phrase(&normalized, &self.config.phrases.provider_focus);
            let hours_cost = find_phrase(&normalized, &self.config.phrases.hours_cost);
            let school_year_only =
                time.kind == TimeWindowKind::SchoolYear && time.month_names.is_empty();
            if provider_focus.is_some()
                && hours_cost.is_some()
                && (!time.month_names.is_empty() || school_year_only)
            {
                let forced = student_provider_mode(&time);
                if forced != mode {
                    notes.push(format!(
                        "safe_fallback: student provider + hours/cost with a time window -> {}",
                        forced
                    ));
                }
                mode = forced;
            }
        }

        let mut decision = RoutingDecision::new(mode);
        decision.primary_entity_type = primary_type;
        decision.primary_entities = primary_entities;
        decision.time_window = time.kind;
        decision.month_names = std::mem::take(&mut time.month_names);
        decision.date_range = time.date_range;
        decision.top_n = top_n;
        decision.metrics = self.resolve_metrics(plan, &normalized, state);
        decision.needs_invoice_details = mode == QueryMode::InvoiceDetails;
        decision.needs_provider_breakdown = mode.is_provider_breakdown();

        // Step 7: terminal guard.
        if mode == QueryMode::ProviderBreakdown && decision.primary_entities.is_empty() {
            decision.needs_provider_breakdown = false;
            notes.push("terminal_guard: district-wide provider breakdown runs once".to_string());
        }

        for note in notes {
            debug!("route note: {}", note);
            decision.note(note);
        }
        info!(
            mode = decision.mode.as_str(),
            primary = ?decision.primary_entity_type,
            entities = decision.primary_entities.len(),
            "routed query"
        );
        decision
    }

    fn select_mode(
        &self,
        plan: &SemanticPlan,
        text_mode: Option<&TextModeMatch>,
        notes: &mut Vec<String>,
    ) -> Option<QueryMode> {
        if let Some(m) = text_mode.filter(|m| m.is_explicit()) {
            let why = match m.source {
                TextModeSource::TopN => "top_n: explicit top phrasing",
                _ => "drilldown: line-item language",
            };
            notes.push(format!("{} -> {}", why, m.mode));
            return Some(m.mode);
        }

        let trigger = text_mode.filter(|m| m.source == TextModeSource::Trigger);
        let plan_mode = plan.kind.as_deref().and_then(QueryMode::from_plan_kind);
        if plan.kind.is_some() && plan_mode.is_none() {
            notes.push(format!(
                "plan: unknown kind '{}' ignored",
                plan.kind.as_deref().unwrap_or_default()
            ));
        }

        match (trigger, plan_mode) {
            (Some(t), Some(p)) if t.mode == p => {
                notes.push(format!("trigger and plan agree on {}", p));
                Some(p)
            }
            (Some(t), Some(p)) if t.is_unanimous() && t.mode.specificity() > p.specificity() => {
                notes.push(format!(
                    "trigger: unanimous {} outranks plan {}",
                    t.mode, p
                ));
                Some(t.mode)
            }
            (Some(t), Some(p)) => {
                notes.push(format!("plan: {} overrides trigger {}", p, t.mode));
                Some(p)
            }
            (Some(t), None) => {
                let phrases: Vec<&str> = t.hits.iter().map(|h| h.phrase.as_str()).collect();
                notes.push(format!("trigger: {} via {:?}", t.mode, phrases));
                Some(t.mode)
            }
            (None, Some(p)) => {
                notes.push(format!("plan: {}", p));
                Some(p)
            }
            (None, None) => None,
        }
    }

    fn primary_entities(
        &self,
        plan: &SemanticPlan,
        entities: &ResolvedEntities,
        intent: &NormalizedIntent,
        notes: &mut Vec<String>,
    ) -> (Option<EntityRole>, Vec<String>) {
        let role = plan.primary_entity_type.or_else(|| {
            [EntityRole::Student, EntityRole::Vendor, EntityRole::Clinician]
                .into_iter()
                .find(|r| !entities.get(*r).is_empty())
        });
        let Some(role) = role else {
            return (None, Vec::new());
        };

        let mut names = Vec::new();
        for name in plan.primary_entities.iter().chain(entities.get(role)) {
            push_unique(&mut names, name);
        }

        match role {
            EntityRole::Vendor => {
                if !intent.vendor_scoped || entities.get(EntityRole::Vendor).is_empty() {
                    notes.push(
                        "vendor_containment: vendor filter dropped (not vendor-scoped or unresolved)"
                            .to_string(),
                    );
                    return (None, Vec::new());
                }
            }
            EntityRole::Student => {
                let vendors = entities.get(EntityRole::Vendor);
                let before = names.len();
                names.retain(|n| !vendors.iter().any(|v| v.eq_ignore_ascii_case(n)));
                if names.len() != before {
                    notes.push("vendor_containment: vendor names stripped from student scope".to_string());
                }
            }
            _ => {}
        }

        (Some(role), names)
    }

    fn resolve_time(
        &self,
        plan: &SemanticPlan,
        period: Option<&PeriodMatch>,
        state: &ConversationState,
        inherit: bool,
        notes: &mut Vec<String>,
    ) -> RoutedTime {
        let mut month_names = Vec::new();
        for month in &plan.month_names {
            match month_number(month).and_then(month_name) {
                Some(canonical) => push_unique(&mut month_names, canonical),
                None => push_unique(&mut month_names, month),
            }
        }
        if month_names.is_empty() {
            if let Some(month) = period.and_then(|p| p.period.month.as_deref()) {
                month_names.push(month.to_string());
            }
        }

        let mut kind = plan
            .time_window
            .filter(|k| *k != TimeWindowKind::Unspecified)
            .or_else(|| period.map(|p| p.period.kind))
            .unwrap_or(TimeWindowKind::Unspecified);

        let mut date_range = plan.date_range.or_else(|| {
            let p = &period?.period;
            Some(DateRange {
                start: p.start?,
                end: p.end?,
            })
        });

        let explicit_time = !month_names.is_empty() || kind != TimeWindowKind::Unspecified;
        if inherit && !explicit_time {
            if let Some(month) = &state.time_cache.last_month {
                month_names.push(month.clone());
                kind = TimeWindowKind::ExplicitMonth;
                if state.time_cache.last_period_type == Some(TimeWindowKind::ExplicitMonth) {
                    if let (Some(start), Some(end)) = (
                        state.time_cache.last_period_start,
                        state.time_cache.last_period_end,
                    ) {
                        date_range = Some(DateRange { start, end });
                    }
                }
                notes.push(format!("inherit: month '{}' from conversation", month));
            }
        }

        RoutedTime {
            kind,
            month_names,
            date_range,
        }
    }

    fn resolve_metrics(
        &self,
        plan: &SemanticPlan,
        normalized: &str,
        state: &ConversationState,
    ) -> Vec<String> {
        if !plan.metrics.is_empty() {
            let mut metrics = Vec::new();
            for metric in &plan.metrics {
                push_unique(&mut metrics, metric);
            }
            return metrics;
        }
        MetricDetector::new(&self.config)
            .detect(normalized)
            .or_else(|| state.slots.metric.clone())
            .into_iter()
            .collect()
    }
}

struct RoutedTime {
    kind: TimeWindowKind,
    month_names: Vec<String>,
    date_range: Option<DateRange>,
}

fn student_provider_mode(time: &RoutedTime) -> QueryMode {
    if time.kind == TimeWindowKind::SchoolYear && time.month_names.is_empty() {
        QueryMode::StudentProviderYear
    } else {
        QueryMode::StudentProviderBreakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActiveTopic;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    fn router() -> QueryModeRouter {
        QueryModeRouter::new(Arc::new(PatternConfig::builtin()))
    }

    fn route(
        plan: &SemanticPlan,
        entities: &ResolvedEntities,
        intent: &NormalizedIntent,
        state: &ConversationState,
    ) -> RoutingDecision {
        router().route(RouteRequest {
            plan,
            entities,
            intent,
            state,
            today: today(),
        })
    }

    fn plan(kind: &str) -> SemanticPlan {
        SemanticPlan {
            kind: Some(kind.to_string()),
            ..Default::default()
        }
    }

    fn student_topic(name: &str) -> ConversationState {
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, name, "q");
        state.time_cache.last_month = Some("August".into());
        state
    }

    #[test]
    fn test_top_invoices_is_exclusive() {
        let entities = ResolvedEntities::new().with(EntityRole::Student, &["Jack Garcia"]);
        let d = route(
            &plan("student_monthly"),
            &entities,
            &NormalizedIntent::new("highest invoices for Jack Garcia"),
            &student_topic("Jack Garcia"),
        );
        assert_eq!(d.mode, QueryMode::TopInvoices);
        assert!(d.primary_entity_type.is_none());
        assert!(d.primary_entities.is_empty());
        assert!(!d.needs_invoice_details && !d.needs_provider_breakdown);
        assert_eq!(d.top_n, Some(DEFAULT_TOP_N));
    }

    #[test]
    fn test_drilldown_beats_plan() {
        let d = route(
            &plan("student_monthly"),
            &ResolvedEntities::new().with(EntityRole::Student, &["Jack Garcia"]),
            &NormalizedIntent::new("invoice details for Jack Garcia in August"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::InvoiceDetails);
        assert!(d.needs_invoice_details);
        assert!(!d.needs_provider_breakdown);
        assert_eq!(d.primary_entities, vec!["Jack Garcia"]);
        assert_eq!(d.month_names, vec!["August"]);
    }

    #[test]
    fn test_plan_overrides_ambiguous_trigger() {
        // Single "by vendor" hit is ambiguous; the plan wins.
        let d = route(
            &plan("district_summary"),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("spend by vendor"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::DistrictSummary);
    }

    #[test]
    fn test_unanimous_specific_trigger_beats_plan() {
        let d = route(
            &plan("district_summary"),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("vendor spend by vendor"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::VendorMonthly);
    }

    #[test]
    fn test_inherits_topic_and_month() {
        let d = route(
            &SemanticPlan::default(),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("what about hours"),
            &student_topic("Jack Garcia"),
        );
        assert_eq!(d.mode, QueryMode::StudentMonthly);
        assert_eq!(d.primary_entity_type, Some(EntityRole::Student));
        assert_eq!(d.primary_entities, vec!["Jack Garcia"]);
        assert_eq!(d.month_names, vec!["August"]);
        assert_eq!(d.time_window, TimeWindowKind::ExplicitMonth);
        assert_eq!(d.metrics, vec!["hours"]);
    }

    #[test]
    fn test_non_entity_scoped_mode_does_not_inherit() {
        let d = route(
            &plan("district_summary"),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("district summary"),
            &student_topic("Jack Garcia"),
        );
        assert_eq!(d.mode, QueryMode::DistrictSummary);
        assert!(d.primary_entities.is_empty());
        assert!(d.month_names.is_empty());
    }

    #[test]
    fn test_provider_breakdown_refined_for_student() {
        let d = route(
            &plan("provider_breakdown"),
            &ResolvedEntities::new().with(EntityRole::Student, &["Mia Chen"]),
            &NormalizedIntent::new("provider breakdown this school year"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::StudentProviderYear);
        assert!(d.needs_provider_breakdown);
        assert!(!d.needs_invoice_details);
    }

    #[test]
    fn test_safe_fallback_forces_student_provider_breakdown() {
        let d = route(
            &plan("student_hours"),
            &ResolvedEntities::new().with(EntityRole::Student, &["Mia Chen"]),
            &NormalizedIntent::new("which provider billed her hours in September"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::StudentProviderBreakdown);
        assert!(d.needs_provider_breakdown);
        assert!(d.notes.iter().any(|n| n.starts_with("safe_fallback")));
    }

    #[test]
    fn test_terminal_guard() {
        let d = route(
            &plan("provider_breakdown"),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("spend per provider"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::ProviderBreakdown);
        assert!(!d.needs_provider_breakdown);
        assert!(!d.needs_invoice_details);
    }

    #[test]
    fn test_vendor_containment() {
        let entities = ResolvedEntities::new().with(EntityRole::Vendor, &["Acme Therapy"]);
        let mut vendor_plan = plan("vendor_spend");
        vendor_plan.primary_entity_type = Some(EntityRole::Vendor);

        let unscoped = route(
            &vendor_plan,
            &entities,
            &NormalizedIntent::new("spend for Acme Therapy"),
            &ConversationState::new(),
        );
        assert!(unscoped.primary_entity_type.is_none());
        assert!(unscoped.primary_entities.is_empty());

        let scoped = route(
            &vendor_plan,
            &entities,
            &NormalizedIntent::new("vendor spend for Acme Therapy").vendor_scoped(true),
            &ConversationState::new(),
        );
        assert_eq!(scoped.primary_entity_type, Some(EntityRole::Vendor));
        assert_eq!(scoped.primary_entities, vec!["Acme Therapy"]);
    }

    #[test]
    fn test_student_scope_strips_vendor_names() {
        let mut student_plan = plan("student_spend");
        student_plan.primary_entity_type = Some(EntityRole::Student);
        student_plan.primary_entities = vec!["Jack Garcia".into(), "Acme Therapy".into()];
        let entities = ResolvedEntities::new().with(EntityRole::Vendor, &["Acme Therapy"]);

        let d = route(
            &student_plan,
            &entities,
            &NormalizedIntent::new("spend for Jack Garcia"),
            &ConversationState::new(),
        );
        assert_eq!(d.primary_entities, vec!["Jack Garcia"]);
    }

    #[test]
    fn test_default_mode_falls_back_to_district() {
        let d = route(
            &SemanticPlan::default(),
            &ResolvedEntities::new(),
            &NormalizedIntent::new("how are things"),
            &ConversationState::new(),
        );
        assert_eq!(d.mode, QueryMode::DistrictSummary);
        assert!(d.notes.iter().any(|n| n.starts_with("default")));
    }
}
