//! Pattern configuration: the phrase tables, slot policies and stop-words
//! that parameterize the classifier and router without code changes.
//!
//! The TOML schema is typed. Unknown keys, blank phrases, unknown decision
//! names and contradictory slot policies are rejected when the file is
//! loaded, so a bad edit fails loudly instead of silently never matching.
//! An absent file is different: it degrades to [`PatternConfig::empty`],
//! where every phrase-driven rule reports "no match".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{error, info, warn};

use crate::models::{DecisionKind, EntityRole, QueryMode, SlotKey};
use crate::utils::error::{DialogueError, DialogueResult};
use crate::utils::text::normalize;

const BUILTIN_PATTERNS: &str = include_str!("../../config/patterns.toml");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhraseLists {
    pub reset: Vec<String>,
    pub list_intent: Vec<String>,
    pub list_followup: Vec<String>,
    pub time_lead_ins: Vec<String>,
    pub trailing_filler: Vec<String>,
    pub provider_focus: Vec<String>,
    pub vendor_scope: Vec<String>,
    pub hours_cost: Vec<String>,
    pub top_n: Vec<String>,
    pub drilldown: Vec<String>,
    pub pronouns: Vec<String>,
    pub placeholders: Vec<String>,
    pub invoice_placeholders: Vec<String>,
    /// Vendor-qualified confirmations, trusted in any message.
    pub all_vendors: Vec<String>,
    /// Loose replies ("all", "everyone") accepted only as the answer to a
    /// pending vendor question.
    pub all_vendors_replies: Vec<String>,
    pub question_openers: Vec<String>,
}

impl PhraseLists {
    fn lists_mut(&mut self) -> [(&'static str, &mut Vec<String>); 16] {
        [
            ("reset", &mut self.reset),
            ("list_intent", &mut self.list_intent),
            ("list_followup", &mut self.list_followup),
            ("time_lead_ins", &mut self.time_lead_ins),
            ("trailing_filler", &mut self.trailing_filler),
            ("provider_focus", &mut self.provider_focus),
            ("vendor_scope", &mut self.vendor_scope),
            ("hours_cost", &mut self.hours_cost),
            ("top_n", &mut self.top_n),
            ("drilldown", &mut self.drilldown),
            ("pronouns", &mut self.pronouns),
            ("placeholders", &mut self.placeholders),
            ("invoice_placeholders", &mut self.invoice_placeholders),
            ("all_vendors", &mut self.all_vendors),
            ("all_vendors_replies", &mut self.all_vendors_replies),
            ("question_openers", &mut self.question_openers),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NameRules {
    pub stop_words: Vec<String>,
    /// Single-token names accepted despite the two-token rule.
    pub allow_single: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleKeywords {
    pub role: EntityRole,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSynonyms {
    pub name: String,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeTrigger {
    pub mode: QueryMode,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotPolicy {
    /// Informational: fusion carries every slot forward that `resets_slots`
    /// and the rule's delta leave alone. Validated against `resets_slots`
    /// but never read when fusing.
    pub inherits_slots: Vec<SlotKey>,
    pub resets_slots: Vec<SlotKey>,
}

impl SlotPolicy {
    fn new(inherits: &[SlotKey], resets: &[SlotKey]) -> Self {
        Self {
            inherits_slots: inherits.to_vec(),
            resets_slots: resets.to_vec(),
        }
    }

    /// Policy compiled into the crate for each decision.
    pub fn builtin(kind: DecisionKind) -> Self {
        const ENTITY: [SlotKey; 2] = [SlotKey::EntityRole, SlotKey::EntityName];
        match kind {
            DecisionKind::TimeOnlyFollowup => Self::new(
                &[
                    SlotKey::EntityRole,
                    SlotKey::EntityName,
                    SlotKey::AllVendors,
                    SlotKey::Metric,
                    SlotKey::Mode,
                    SlotKey::PlanKind,
                ],
                &SlotKey::TIME,
            ),
            DecisionKind::ProviderTimeFollowup => Self::new(
                &ENTITY,
                &[SlotKey::Mode, SlotKey::PlanKind, SlotKey::Metric],
            ),
            DecisionKind::MetricFollowup => Self::new(
                &[SlotKey::EntityRole, SlotKey::EntityName, SlotKey::AllVendors],
                &[SlotKey::Mode, SlotKey::PlanKind],
            ),
            DecisionKind::ListFollowup | DecisionKind::Clarification => {
                Self::new(&SlotKey::ALL, &[])
            }
            DecisionKind::NewTopic => Self::new(&[], &SlotKey::ALL),
            DecisionKind::Fuse => Self::new(
                &[
                    SlotKey::EntityRole,
                    SlotKey::EntityName,
                    SlotKey::Metric,
                    SlotKey::PlanKind,
                ],
                &[SlotKey::Mode],
            ),
        }
    }
}

/// On-disk shape. Decision names are validated while converting.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatternConfig {
    version: u32,
    #[serde(default)]
    phrases: PhraseLists,
    #[serde(default)]
    names: NameRules,
    #[serde(default)]
    roles: Vec<RoleKeywords>,
    #[serde(default)]
    metrics: Vec<MetricSynonyms>,
    #[serde(default)]
    mode_triggers: Vec<ModeTrigger>,
    #[serde(default)]
    decisions: BTreeMap<String, SlotPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConfig {
    pub version: u32,
    pub phrases: PhraseLists,
    pub names: NameRules,
    pub roles: Vec<RoleKeywords>,
    pub metrics: Vec<MetricSynonyms>,
    pub mode_triggers: Vec<ModeTrigger>,
    pub decisions: BTreeMap<DecisionKind, SlotPolicy>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self::empty()
    }
}

impl PatternConfig {
    /// No phrases at all. Every phrase-driven rule reports "no match".
    pub fn empty() -> Self {
        Self {
            version: 0,
            phrases: PhraseLists::default(),
            names: NameRules::default(),
            roles: Vec::new(),
            metrics: Vec::new(),
            mode_triggers: Vec::new(),
            decisions: BTreeMap::new(),
        }
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        match Self::from_toml_str(BUILTIN_PATTERNS) {
            Ok(config) => config,
            Err(e) => {
                error!("Built-in pattern table rejected: {}", e);
                Self::empty()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> DialogueResult<Self> {
        let raw: RawPatternConfig = toml::from_str(content)?;
        Self::validate(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> DialogueResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| DialogueError::Config(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded pattern config v{} from {} ({} metrics, {} mode triggers)",
            config.version,
            path.display(),
            config.metrics.len(),
            config.mode_triggers.len()
        );
        Ok(config)
    }

    /// Missing file degrades to the empty table; a malformed file is
    /// still an error.
    pub fn load_or_empty(path: impl AsRef<Path>) -> DialogueResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Pattern config {} not found, phrase rules disabled",
                path.display()
            );
            return Ok(Self::empty());
        }
        Self::load(path)
    }

    fn validate(raw: RawPatternConfig) -> DialogueResult<Self> {
        if raw.version == 0 {
            return Err(DialogueError::Config("version must be >= 1".into()));
        }

        let mut phrases = raw.phrases;
        for (name, list) in phrases.lists_mut() {
            normalize_list(&format!("phrases.{}", name), list)?;
        }

        let mut names = raw.names;
        normalize_list("names.stop_words", &mut names.stop_words)?;
        for name in &names.allow_single {
            if name.trim().is_empty() {
                return Err(DialogueError::Config("names.allow_single has a blank entry".into()));
            }
        }

        let mut roles = raw.roles;
        for entry in &mut roles {
            normalize_list(&format!("roles.{}", entry.role), &mut entry.keywords)?;
        }

        let mut metrics = raw.metrics;
        let mut seen = HashSet::new();
        for metric in &mut metrics {
            let name = metric.name.trim().to_lowercase();
            if name.is_empty() {
                return Err(DialogueError::Config("metric with blank name".into()));
            }
            if !seen.insert(name.clone()) {
                return Err(DialogueError::Config(format!("duplicate metric '{}'", name)));
            }
            metric.name = name;
            normalize_list(&format!("metrics.{}", metric.name), &mut metric.synonyms)?;
        }

        let mut mode_triggers = raw.mode_triggers;
        for trigger in &mut mode_triggers {
            normalize_list(&format!("mode_triggers.{}", trigger.mode), &mut trigger.phrases)?;
        }

        let mut decisions = BTreeMap::new();
        for (name, policy) in raw.decisions {
            let kind: DecisionKind = serde_json::from_value(serde_json::Value::String(name.clone()))
                .map_err(|_| DialogueError::Config(format!("unknown decision '{}'", name)))?;
            if let Some(key) = policy
                .inherits_slots
                .iter()
                .find(|k| policy.resets_slots.contains(k))
            {
                return Err(DialogueError::Config(format!(
                    "decision '{}' both inherits and resets '{}'",
                    name,
                    key.as_str()
                )));
            }
            decisions.insert(kind, policy);
        }

        Ok(Self {
            version: raw.version,
            phrases,
            names,
            roles,
            metrics,
            mode_triggers,
            decisions,
        })
    }

    /// Effective policy: configured inherits (or built-in), resets are the
    /// union of configured and built-in so reset semantics cannot be
    /// weakened by an edit.
    pub fn policy_for(&self, kind: DecisionKind) -> SlotPolicy {
        let builtin = SlotPolicy::builtin(kind);
        let Some(configured) = self.decisions.get(&kind) else {
            return builtin;
        };

        let resets: Vec<SlotKey> = SlotKey::ALL
            .into_iter()
            .filter(|k| configured.resets_slots.contains(k) || builtin.resets_slots.contains(k))
            .collect();
        let inherits: Vec<SlotKey> = configured
            .inherits_slots
            .iter()
            .copied()
            .filter(|k| !resets.contains(k))
            .collect();

        SlotPolicy {
            inherits_slots: inherits,
            resets_slots: resets,
        }
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.names.stop_words.iter().any(|w| *w == token)
    }

    pub fn is_allowed_single(&self, token: &str) -> bool {
        self.names
            .allow_single
            .iter()
            .any(|w| w.eq_ignore_ascii_case(token))
    }
}

fn normalize_list(field: &str, list: &mut Vec<String>) -> DialogueResult<()> {
    let mut out = Vec::with_capacity(list.len());
    for phrase in list.iter() {
        let normalized = normalize(phrase);
        if normalized.is_empty() {
            return Err(DialogueError::Config(format!("{} has a blank phrase", field)));
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    *list = out;
    Ok(())
}
