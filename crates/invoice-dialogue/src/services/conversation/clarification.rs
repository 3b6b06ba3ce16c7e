//! Resuming a parked query once the user answers a clarification.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::PatternConfig;
use crate::models::{ConversationState, DecisionKind, EntityRole, Period, SlotDelta, Slots, TimeWindowKind};
use crate::services::classifier::{fuse_slots, fusion};
use crate::services::extractors::periods::{month_name, month_number};
use crate::services::extractors::ReferenceResolver;
use crate::utils::text::{contains_ignore_case, find_phrase, normalize, trim_query};

static SLOT_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z_ ]{0,24}?)\s*[:=]\s*([^,;\n]+)").expect("Invalid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// The user walked away from the question.
    Abandoned,
    Completed {
        slots: Slots,
        fused_query: String,
        resolved: BTreeMap<String, String>,
    },
    Pending {
        missing: Vec<String>,
        resolved: BTreeMap<String, String>,
    },
}

pub struct ClarificationResolver<'a> {
    config: &'a PatternConfig,
}

impl<'a> ClarificationResolver<'a> {
    pub fn new(config: &'a PatternConfig) -> Self {
        Self { config }
    }

    pub fn resume(&self, state: &ConversationState, message: &str) -> ResumeOutcome {
        let normalized = normalize(message);
        if find_phrase(&normalized, &self.config.phrases.reset).is_some() {
            return ResumeOutcome::Abandoned;
        }

        let mut resolved = state.resolved_slots.clone();
        let mut missing = state.missing_slots.clone();
        let mut filled_this_turn = false;

        for (key, value) in parse_slot_pairs(message) {
            if let Some(pos) = missing.iter().position(|m| *m == key) {
                missing.remove(pos);
                resolved.insert(key, value);
                filled_this_turn = true;
            }
        }

        if let Some(pos) = missing.iter().position(|m| m == "vendor_name") {
            let phrases = &self.config.phrases;
            if find_phrase(&normalized, &phrases.all_vendors)
                .or_else(|| find_phrase(&normalized, &phrases.all_vendors_replies))
                .is_some()
            {
                missing.remove(pos);
                resolved.insert("all_vendors".to_string(), "true".to_string());
                filled_this_turn = true;
            }
        }

        // One question outstanding: the whole reply is the answer.
        if !filled_this_turn && missing.len() == 1 {
            let key = missing.remove(0);
            let value = self.pick_value(state, &key, message);
            resolved.insert(key, value);
        }

        if !missing.is_empty() {
            debug!(?missing, "clarification still pending");
            return ResumeOutcome::Pending { missing, resolved };
        }

        let (slots, fused_query) = self.complete(state, &resolved);
        ResumeOutcome::Completed {
            slots,
            fused_query,
            resolved,
        }
    }

    /// Prefer a candidate the reply names over the raw reply.
    fn pick_value(&self, state: &ConversationState, key: &str, message: &str) -> String {
        let candidates = match key {
            "invoice_id" => &state.last_invoice_candidates,
            "entity_name" | "vendor_name" => &state.candidate_entities,
            _ => return trim_query(message),
        };
        candidates
            .iter()
            .find(|c| contains_ignore_case(message, c))
            .cloned()
            .unwrap_or_else(|| trim_query(message))
    }

    fn complete(&self, state: &ConversationState, resolved: &BTreeMap<String, String>) -> (Slots, String) {
        let mut query = state
            .pending_query
            .clone()
            .or_else(|| state.last_fused_query.clone())
            .unwrap_or_default();
        let mut delta = SlotDelta::default();

        for (key, value) in in_fill_order(resolved) {
            match key {
                "vendor_name" => {
                    delta.entity_role = Some(EntityRole::Vendor);
                    delta.entity_name = Some(value.clone());
                    query = fusion::append_topic(&query, value);
                }
                "entity_name" => {
                    delta.entity_name = Some(value.clone());
                    query = fusion::append_topic(&query, value);
                }
                "all_vendors" => {
                    delta.all_vendors = Some(true);
                    query = format!("{} across all vendors", query.trim_end());
                }
                "invoice_id" => {
                    query = ReferenceResolver::new(self.config).substitute_invoice(&query, value);
                }
                "month" => {
                    if let Some(name) = month_number(value).and_then(month_name) {
                        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
                        period.month = Some(name.to_string());
                        query = format!("{} in {}", query.trim_end(), name);
                        delta.period = Some(period);
                    }
                }
                _ => query = format!("{} {}", query.trim_end(), value),
            }
        }

        let slots = fuse_slots(self.config, DecisionKind::Clarification, &state.slots, &delta);
        (slots, query.trim().to_string())
    }
}

/// Entity slots first so the fused query reads "X for Acme in May".
fn in_fill_order(resolved: &BTreeMap<String, String>) -> Vec<(&str, &String)> {
    const ORDER: [&str; 5] = ["vendor_name", "entity_name", "all_vendors", "invoice_id", "month"];
    let rank = |key: &str| ORDER.iter().position(|k| *k == key).unwrap_or(ORDER.len());
    let mut pairs: Vec<_> = resolved.iter().map(|(k, v)| (k.as_str(), v)).collect();
    pairs.sort_by_key(|(k, _)| rank(k));
    pairs
}

/// "vendor: Acme Therapy, month = May" -> [("vendor_name", ...), ("month", ...)]
fn parse_slot_pairs(message: &str) -> Vec<(String, String)> {
    SLOT_PAIR
        .captures_iter(message)
        .filter_map(|caps| {
            let key = canonical_slot(caps.get(1)?.as_str());
            let value = trim_query(caps.get(2)?.as_str());
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
}

fn canonical_slot(raw: &str) -> String {
    let raw = raw.trim().to_lowercase();
    let key = raw.replace(' ', "_");
    slot_alias(&key)
        .or_else(|| raw.split_whitespace().last().and_then(slot_alias))
        .map(str::to_string)
        .unwrap_or(key)
}

fn slot_alias(key: &str) -> Option<&'static str> {
    match key {
        "vendor" | "agency" | "vendor_name" => Some("vendor_name"),
        "student" | "name" | "entity" | "entity_name" => Some("entity_name"),
        "invoice" | "invoice_id" | "invoice_number" => Some("invoice_id"),
        "month" => Some("month"),
        _ => None,
    }
}
