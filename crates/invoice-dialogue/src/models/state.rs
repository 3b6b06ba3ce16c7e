use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::slots::Slots;

/// Entity roles that can hold conversational focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    #[serde(alias = "students")]
    Student,
    #[serde(alias = "vendors", alias = "agency")]
    Vendor,
    #[serde(alias = "clinicians", alias = "provider")]
    Clinician,
    District,
    #[serde(alias = "invoices")]
    Invoice,
    Month,
}

impl EntityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Vendor => "vendor",
            Self::Clinician => "clinician",
            Self::District => "district",
            Self::Invoice => "invoice",
            Self::Month => "month",
        }
    }

    /// Lenient parse used for configuration values and collaborator output.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "student" | "students" => Some(Self::Student),
            "vendor" | "vendors" | "agency" | "agencies" => Some(Self::Vendor),
            "clinician" | "clinicians" | "provider" | "providers" => Some(Self::Clinician),
            "district" => Some(Self::District),
            "invoice" | "invoices" => Some(Self::Invoice),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity currently in conversational focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTopic {
    #[serde(rename = "type")]
    pub role: EntityRole,
    pub value: String,
    pub last_query: String,
}

impl ActiveTopic {
    /// Returns `None` for a blank value; a topic always names something.
    pub fn new(role: EntityRole, value: &str, last_query: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            role,
            value: value.to_string(),
            last_query: last_query.to_string(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.value.eq_ignore_ascii_case(name.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindowKind {
    ExplicitMonth,
    SchoolYear,
    Ytd,
    DateRange,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl TimeWindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitMonth => "explicit_month",
            Self::SchoolYear => "school_year",
            Self::Ytd => "ytd",
            Self::DateRange => "date_range",
            Self::Unspecified => "unspecified",
        }
    }
}

/// Coarse intent tag, only compared across turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentShape {
    ProviderBreakdown,
    DistrictMetrics,
    InvoiceDetails,
    ListEntities,
    StudentMetrics,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A resolved time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub kind: TimeWindowKind,
    pub month: Option<String>,
    pub year: Option<i32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub school_year: Option<i32>,
}

impl Period {
    pub fn new(kind: TimeWindowKind) -> Self {
        Self {
            kind,
            month: None,
            year: None,
            start: None,
            end: None,
            school_year: None,
        }
    }

    /// "2025-2026" style label for school-year windows.
    pub fn year_window_label(&self) -> Option<String> {
        self.school_year.map(|fy| format!("{}-{}", fy - 1, fy))
    }

    /// Short phrase used when rebuilding a fused query.
    pub fn describe(&self) -> Option<String> {
        match self.kind {
            TimeWindowKind::ExplicitMonth => self.month.as_ref().map(|m| match self.year {
                Some(y) => format!("in {} {}", m, y),
                None => format!("in {}", m),
            }),
            TimeWindowKind::SchoolYear => Some(match self.year_window_label() {
                Some(label) => format!("for school year {}", label),
                None => "for this school year".to_string(),
            }),
            TimeWindowKind::Ytd => Some("year to date".to_string()),
            TimeWindowKind::DateRange => match (self.start, self.end) {
                (Some(s), Some(e)) if s == e => Some(format!("on {}", s)),
                (Some(s), Some(e)) => Some(format!("from {} to {}", s, e)),
                (Some(s), None) => Some(format!("since {}", s)),
                (None, Some(e)) => Some(format!("through {}", e)),
                (None, None) => None,
            },
            TimeWindowKind::Unspecified => None,
        }
    }
}

/// Denormalized time snapshot inherited when a message omits time.
/// Written only through [`PeriodCache::record`] and [`PeriodCache::clear`]
/// so the fields stay mutually consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodCache {
    pub last_period_type: Option<TimeWindowKind>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
    pub last_month: Option<String>,
    pub last_explicit_month: Option<String>,
    pub last_year_window: Option<String>,
}

impl PeriodCache {
    pub fn record(&mut self, period: &Period, explicit_month: bool) {
        self.last_period_type = Some(period.kind);
        self.last_period_start = period.start;
        self.last_period_end = period.end;
        self.last_month = period.month.clone();
        // The explicit month survives a later relative window so that
        // "that month" still has an anchor.
        if explicit_month && period.month.is_some() {
            self.last_explicit_month = period.month.clone();
        }
        self.last_year_window = period.year_window_label();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Per-session conversational state, persisted between turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    pub active_topic: Option<ActiveTopic>,

    pub slots: Slots,

    #[serde(flatten)]
    pub time_cache: PeriodCache,

    /// Names from the active topic's last result set.
    pub candidate_entities: Vec<String>,

    /// Invoice identifiers from the last listing.
    pub last_invoice_candidates: Vec<String>,

    pub missing_slots: Vec<String>,
    pub resolved_slots: BTreeMap<String, String>,

    /// Fused query parked while a clarification is outstanding.
    pub pending_query: Option<String>,

    pub last_fused_query: Option<String>,

    pub history: Vec<HistoryEntry>,

    pub last_intent_shape: IntentShape,

    pub turn_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awaiting_clarification(&self) -> bool {
        !self.missing_slots.is_empty()
    }

    /// Discard the topic and everything inherited from it. History is kept.
    pub fn reset_topic(&mut self) {
        self.active_topic = None;
        self.slots = Slots::default();
        self.time_cache.clear();
        self.candidate_entities = Vec::new();
        self.last_invoice_candidates = Vec::new();
        self.clear_clarification();
        self.last_fused_query = None;
        self.last_intent_shape = IntentShape::Unknown;
    }

    pub fn clear_clarification(&mut self) {
        self.missing_slots.clear();
        self.resolved_slots.clear();
        self.pending_query = None;
    }

    pub fn push_history(&mut self, role: HistoryRole, content: &str, max_entries: usize) {
        self.history.push(HistoryEntry {
            role,
            content: content.to_string(),
            at: Utc::now(),
        });
        self.enforce_history_window(max_entries);
    }

    /// Sliding window: drop the oldest entries beyond `max_entries`.
    pub fn enforce_history_window(&mut self, max_entries: usize) {
        if self.history.len() > max_entries {
            let excess = self.history.len() - max_entries;
            self.history.drain(0..excess);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::routing::QueryMode;

    #[test]
    fn test_active_topic_rejects_blank_value() {
        assert!(ActiveTopic::new(EntityRole::Student, "   ", "q").is_none());
        let topic = ActiveTopic::new(EntityRole::Student, " Jack Garcia ", "q").unwrap();
        assert_eq!(topic.value, "Jack Garcia");
        assert!(topic.matches("jack garcia"));
    }

    #[test]
    fn test_reset_topic_clears_inherited_context() {
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Vendor, "Acme Therapy", "spend");
        state.slots.metric = Some("spend".into());
        state.slots.mode = Some(QueryMode::VendorMonthly);
        state.candidate_entities = vec!["Acme Therapy".into()];
        state.last_invoice_candidates = vec!["INV-1".into()];
        state.missing_slots = vec!["vendor_name".into()];
        state.time_cache.last_month = Some("August".into());
        state.push_history(HistoryRole::User, "spend for Acme", 10);

        state.reset_topic();

        assert!(state.active_topic.is_none());
        assert_eq!(state.slots, Slots::default());
        assert!(state.candidate_entities.is_empty());
        assert!(state.last_invoice_candidates.is_empty());
        assert!(state.missing_slots.is_empty());
        assert!(state.time_cache.is_empty());
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn test_history_window() {
        let mut state = ConversationState::new();
        for i in 0..5 {
            state.push_history(HistoryRole::User, &format!("m{}", i), 3);
        }
        let contents: Vec<_> = state.history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_period_cache_record_is_consistent() {
        let mut cache = PeriodCache::default();
        let mut period = Period::new(TimeWindowKind::SchoolYear);
        period.school_year = Some(2026);
        period.start = NaiveDate::from_ymd_opt(2025, 7, 1);
        period.end = NaiveDate::from_ymd_opt(2026, 6, 30);
        cache.record(&period, false);

        assert_eq!(cache.last_period_type, Some(TimeWindowKind::SchoolYear));
        assert_eq!(cache.last_year_window.as_deref(), Some("2025-2026"));
        assert!(cache.last_month.is_none());
    }

    #[test]
    fn test_state_serializes_topic_type() {
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, "Mia Chen", "hours");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["active_topic"]["type"], "student");
        assert!(json.get("last_month").is_some());

        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_unknown_window_kind_deserializes_to_unspecified() {
        let kind: TimeWindowKind = serde_json::from_str("\"fortnight\"").unwrap();
        assert_eq!(kind, TimeWindowKind::Unspecified);
    }
}
