//! The ordered rule list. Phrase sets overlap, so order decides: the
//! first rule whose predicate holds resolves the turn.

use crate::config::PatternConfig;
use crate::models::{DecisionKind, EntityRole, Period, QueryMode, SlotDelta, TimeWindowKind};
use crate::services::extractors::periods::month_number;
use crate::services::extractors::{PeriodExtractor, PeriodMatch, ReferenceResolver};
use crate::utils::text::{
    find_phrase, strip_leading_phrases, strip_trailing_phrases, trim_query,
};

use super::fusion;
use super::policy::plan_kind_for;
use super::ClassifierInput;

type Predicate = fn(&PatternConfig, &ClassifierInput<'_>) -> bool;
type Resolver = fn(&PatternConfig, &ClassifierInput<'_>) -> RuleOutcome;

pub(super) struct Rule {
    pub name: &'static str,
    /// Decision the rule normally yields; a resolver may relabel it.
    pub decision: DecisionKind,
    pub applies: Predicate,
    pub resolve: Resolver,
}

pub(super) struct RuleOutcome {
    pub decision: DecisionKind,
    pub delta: SlotDelta,
    pub fused_query: String,
    pub reason: String,
}

pub(super) fn ordered_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "time_only",
            decision: DecisionKind::TimeOnlyFollowup,
            applies: time_only_applies,
            resolve: time_only_resolve,
        },
        Rule {
            name: "provider_time",
            decision: DecisionKind::ProviderTimeFollowup,
            applies: provider_time_applies,
            resolve: provider_time_resolve,
        },
        Rule {
            name: "metric_switch",
            decision: DecisionKind::MetricFollowup,
            applies: metric_switch_applies,
            resolve: metric_switch_resolve,
        },
        Rule {
            name: "list_followup",
            decision: DecisionKind::ListFollowup,
            applies: list_followup_applies,
            resolve: list_followup_resolve,
        },
        Rule {
            name: "reset",
            decision: DecisionKind::NewTopic,
            applies: reset_applies,
            resolve: reset_resolve,
        },
    ]
}

// ---- time-only follow-up ----

/// The message with lead-ins and filler removed, if what remains is
/// exactly one time phrase.
fn time_only_period(config: &PatternConfig, input: &ClassifierInput<'_>) -> Option<PeriodMatch> {
    let stripped = strip_leading_phrases(&input.hints.normalized, &config.phrases.time_lead_ins);
    let stripped = strip_trailing_phrases(&stripped, &config.phrases.trailing_filler);
    if stripped.is_empty() {
        return None;
    }

    let cache = &input.state.time_cache;
    let mut candidates = vec![stripped.clone()];
    for preposition in ["in ", "for ", "during "] {
        if let Some(rest) = stripped.strip_prefix(preposition) {
            candidates.push(rest.to_string());
        }
    }

    // The whole remainder is a month name, so "may" is the month here.
    if let Some(month) = candidates.iter().find(|t| is_month_only(t)).cloned() {
        candidates.push(format!("in {}", month));
    }

    candidates.into_iter().find_map(|text| {
        PeriodExtractor::extract(&text, input.today, cache).filter(|m| m.covers(&text))
    })
}

/// "may", "sept 2024": a month name with at most a year after it.
fn is_month_only(text: &str) -> bool {
    let mut words = text.split_whitespace();
    let month = words.next().and_then(month_number).is_some();
    let year = match words.next() {
        None => true,
        Some(word) => word.len() == 4 && word.chars().all(|c| c.is_ascii_digit()),
    };
    month && year && words.next().is_none()
}

fn time_only_applies(config: &PatternConfig, input: &ClassifierInput<'_>) -> bool {
    input.state.slots.has_non_time_context() && time_only_period(config, input).is_some()
}

fn time_only_resolve(config: &PatternConfig, input: &ClassifierInput<'_>) -> RuleOutcome {
    let period = time_only_period(config, input).map(|m| m.period);
    let base = base_query(input);
    let fused_query = match &period {
        Some(p) => fusion::replace_time(&base, p, input.today, &input.state.time_cache),
        None => base,
    };
    let described = period.as_ref().and_then(Period::describe).unwrap_or_default();

    RuleOutcome {
        decision: DecisionKind::TimeOnlyFollowup,
        delta: SlotDelta::default().with_period(period),
        fused_query,
        reason: format!("message is only a time window ({})", described),
    }
}

// ---- provider + time follow-up ----

fn provider_time_applies(config: &PatternConfig, input: &ClassifierInput<'_>) -> bool {
    let normalized = &input.hints.normalized;
    input.state.slots.entity_role == Some(EntityRole::Student)
        && ReferenceResolver::new(config).has_pronoun(normalized)
        && (input.hints.period.is_some()
            || find_phrase(normalized, &config.phrases.provider_focus).is_some())
}

fn provider_time_resolve(_config: &PatternConfig, input: &ClassifierInput<'_>) -> RuleOutcome {
    let previous = &input.state.slots;
    let new_period = input.hints.period.as_ref().map(|m| m.period.clone());
    let effective = new_period.clone().or_else(|| previous.period());

    let mode = match &effective {
        Some(p) if p.kind == TimeWindowKind::SchoolYear => QueryMode::StudentProviderYear,
        _ => QueryMode::StudentProviderBreakdown,
    };

    let student = previous
        .entity_name
        .clone()
        .or_else(|| input.state.active_topic.as_ref().map(|t| t.value.clone()))
        .unwrap_or_else(|| "the student".to_string());

    RuleOutcome {
        decision: DecisionKind::ProviderTimeFollowup,
        delta: SlotDelta {
            metric: Some("hours".to_string()),
            mode: Some(mode),
            plan_kind: Some(mode.as_str().to_string()),
            period: new_period,
            ..Default::default()
        },
        fused_query: fusion::provider_breakdown_query(&student, effective.as_ref()),
        reason: format!("student pronoun with provider/time focus -> {}", mode),
    }
}

// ---- metric switch ----

fn metric_switch_applies(_config: &PatternConfig, input: &ClassifierInput<'_>) -> bool {
    input.hints.metric.is_some()
}

fn metric_switch_resolve(config: &PatternConfig, input: &ClassifierInput<'_>) -> RuleOutcome {
    let hints = input.hints;
    let previous = &input.state.slots;
    let metric = hints.metric.clone().unwrap_or_default();

    let name_conflict = previous.entity_name.is_some()
        && hints.names_other_than(previous.entity_name.as_deref());
    let explicit_role = hints.seed_role();
    let role_conflict = match (explicit_role, previous.entity_role) {
        (Some(new), Some(old)) => new != old,
        _ => false,
    };
    let reset = find_phrase(&hints.normalized, &config.phrases.reset).is_some();
    let continuation =
        previous.has_non_time_context() && !name_conflict && !role_conflict && !reset;

    let role = if continuation {
        explicit_role.or(previous.entity_role)
    } else {
        explicit_role
    };

    let delta = SlotDelta {
        entity_role: explicit_role,
        entity_name: hints.name.clone(),
        all_vendors: hints.all_vendors.then_some(true),
        metric: Some(metric.clone()),
        plan_kind: plan_kind_for(role, &metric),
        period: hints.period.as_ref().map(|m| m.period.clone()),
        ..Default::default()
    };

    if continuation {
        let mut query = trim_query(input.message);
        if let Some(name) = &previous.entity_name {
            query = fusion::append_topic(&query, name);
        }
        let fused_query = fusion::append_time(
            &query,
            previous.period().as_ref(),
            input.today,
            &input.state.time_cache,
        );
        RuleOutcome {
            decision: DecisionKind::MetricFollowup,
            delta,
            fused_query,
            reason: format!("metric switched to '{}'", metric),
        }
    } else {
        let why = if reset {
            "reset phrase"
        } else if name_conflict {
            "different entity"
        } else if role_conflict {
            "different role"
        } else {
            "no prior context"
        };
        RuleOutcome {
            decision: DecisionKind::NewTopic,
            delta,
            fused_query: trim_query(input.message),
            reason: format!("metric '{}' seeds a new topic ({})", metric, why),
        }
    }
}

// ---- list follow-up ----

fn list_followup_applies(config: &PatternConfig, input: &ClassifierInput<'_>) -> bool {
    find_phrase(&input.hints.normalized, &config.phrases.list_followup).is_some()
        && (input.state.slots.has_non_time_context() || !input.state.candidate_entities.is_empty())
}

fn list_followup_resolve(config: &PatternConfig, input: &ClassifierInput<'_>) -> RuleOutcome {
    let phrase = find_phrase(&input.hints.normalized, &config.phrases.list_followup)
        .unwrap_or_default()
        .to_string();
    let message = trim_query(input.message);
    let fused_query = match input.state.last_fused_query.as_deref() {
        Some(previous) => format!("{} (following up on: {})", message, trim_query(previous)),
        None => message,
    };

    RuleOutcome {
        decision: DecisionKind::ListFollowup,
        delta: SlotDelta::default(),
        fused_query,
        reason: format!("refers to the previous list ('{}')", phrase),
    }
}

// ---- reset ----

fn reset_applies(config: &PatternConfig, input: &ClassifierInput<'_>) -> bool {
    find_phrase(&input.hints.normalized, &config.phrases.reset).is_some()
}

fn reset_resolve(config: &PatternConfig, input: &ClassifierInput<'_>) -> RuleOutcome {
    let hints = input.hints;
    let phrase = find_phrase(&hints.normalized, &config.phrases.reset)
        .unwrap_or_default()
        .to_string();
    let role = hints.seed_role();

    RuleOutcome {
        decision: DecisionKind::NewTopic,
        delta: seed_delta(input, role),
        fused_query: trim_query(input.message),
        reason: format!("reset phrase '{}'", phrase),
    }
}

/// Slots a brand-new topic starts with.
pub(crate) fn seed_delta(input: &ClassifierInput<'_>, role: Option<EntityRole>) -> SlotDelta {
    let hints = input.hints;
    SlotDelta {
        entity_role: role,
        entity_name: hints.name.clone(),
        all_vendors: hints.all_vendors.then_some(true),
        metric: hints.metric.clone(),
        plan_kind: hints.metric.as_deref().and_then(|m| plan_kind_for(role, m)),
        period: hints.period.as_ref().map(|m| m.period.clone()),
        ..Default::default()
    }
}

/// Last query text for the topic, or one rebuilt from slots.
fn base_query(input: &ClassifierInput<'_>) -> String {
    input
        .state
        .last_fused_query
        .clone()
        .or_else(|| input.state.active_topic.as_ref().map(|t| t.last_query.clone()))
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| fusion::compose_from_slots(&input.state.slots))
}
