use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::routing::DateRange;
use super::state::{EntityRole, TimeWindowKind};
use crate::utils::extract_first_json_object;

/// Advisory plan produced by the query-plan collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticPlan {
    pub kind: Option<String>,
    pub primary_entity_type: Option<EntityRole>,
    pub primary_entities: Vec<String>,
    pub time_window: Option<TimeWindowKind>,
    pub month_names: Vec<String>,
    pub date_range: Option<DateRange>,
    pub metrics: Vec<String>,
    pub group_by: Vec<String>,
}

impl SemanticPlan {
    /// Salvage a plan from raw collaborator output. Anything unparsable
    /// yields the empty plan so routing falls back to its own rules.
    pub fn from_llm_output(raw: &str) -> Self {
        let Some(json) = extract_first_json_object(raw) else {
            warn!("Plan output contained no JSON object, using empty plan");
            return Self::default();
        };

        match serde_json::from_str::<SemanticPlan>(json) {
            Ok(plan) => {
                debug!("Parsed semantic plan: kind={:?}", plan.kind);
                plan
            }
            Err(e) => {
                warn!("Plan JSON rejected ({}), using empty plan", e);
                Self::default()
            }
        }
    }
}

/// Canonical names per role from the entity-resolution collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedEntities {
    pub by_role: BTreeMap<EntityRole, Vec<String>>,
}

impl ResolvedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: EntityRole, names: &[&str]) -> Self {
        let entry = self.by_role.entry(role).or_default();
        for name in names {
            crate::utils::text::push_unique(entry, name);
        }
        self
    }

    pub fn get(&self, role: EntityRole) -> &[String] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_role.values().all(Vec::is_empty)
    }
}

/// Output of the intent-normalization collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedIntent {
    pub text: String,
    /// Set only when the user explicitly scoped the question to vendors.
    pub vendor_scoped: bool,
}

impl NormalizedIntent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vendor_scoped: false,
        }
    }

    pub fn vendor_scoped(mut self, scoped: bool) -> Self {
        self.vendor_scoped = scoped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_noisy_output() {
        let raw = r#"Here is the plan:
```json
{"kind": "student_hours", "primary_entity_type": "student",
 "primary_entities": ["Mia Chen"], "time_window": "explicit_month",
 "month_names": ["August"], "metrics": ["hours"]}
```"#;
        let plan = SemanticPlan::from_llm_output(raw);
        assert_eq!(plan.kind.as_deref(), Some("student_hours"));
        assert_eq!(plan.primary_entity_type, Some(EntityRole::Student));
        assert_eq!(plan.primary_entities, vec!["Mia Chen"]);
        assert_eq!(plan.time_window, Some(TimeWindowKind::ExplicitMonth));
        assert!(plan.date_range.is_none());
    }

    #[test]
    fn test_plan_from_garbage_is_empty() {
        assert_eq!(SemanticPlan::from_llm_output("sorry, I can't"), SemanticPlan::default());
        assert_eq!(
            SemanticPlan::from_llm_output(r#"{"primary_entity_type": "spaceship"}"#),
            SemanticPlan::default()
        );
    }

    #[test]
    fn test_resolved_entities_dedup() {
        let entities = ResolvedEntities::new()
            .with(EntityRole::Student, &["Jack Garcia", "jack garcia", "Mia Chen"]);
        assert_eq!(entities.get(EntityRole::Student), ["Jack Garcia", "Mia Chen"]);
        assert!(entities.get(EntityRole::Vendor).is_empty());
        assert!(!entities.is_empty());
    }

    #[test]
    fn test_resolved_entities_deserialize_by_role() {
        let entities: ResolvedEntities =
            serde_json::from_str(r#"{"vendor": ["Acme Therapy"], "student": []}"#).unwrap();
        assert_eq!(entities.get(EntityRole::Vendor), ["Acme Therapy"]);
    }
}
