use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where in the turn pipeline a trace entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    Store,
    Extraction,
    Reference,
    Classifier,
    LegacyFallback,
    VendorGuard,
    TopicShift,
    Override,
    Clarification,
    Router,
}

impl TraceStage {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Store => "store",
            Self::Extraction => "extraction",
            Self::Reference => "reference",
            Self::Classifier => "classifier",
            Self::LegacyFallback => "legacy_fallback",
            Self::VendorGuard => "vendor_guard",
            Self::TopicShift => "topic_shift",
            Self::Override => "override",
            Self::Clarification => "clarification",
            Self::Router => "router",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Fired,
    Fallback,
    Anomaly,
    Info,
}

impl TraceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fired => "fired",
            Self::Fallback => "fallback",
            Self::Anomaly => "anomaly",
            Self::Info => "info",
        }
    }
}

/// One rule firing or fallback, kept so misroutes can be explained later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub trace_id: Uuid,
    pub session_key: String,
    pub stage: TraceStage,
    pub status: TraceStatus,
    pub rule: String,
    pub reason: String,
    pub fields: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl TraceEntry {
    /// Create builder for fluent API
    pub fn builder(session_key: &str, stage: TraceStage, rule: &str) -> TraceEntryBuilder {
        TraceEntryBuilder::new(session_key, stage, rule)
    }
}

pub struct TraceEntryBuilder {
    entry: TraceEntry,
}

impl TraceEntryBuilder {
    pub fn new(session_key: &str, stage: TraceStage, rule: &str) -> Self {
        Self {
            entry: TraceEntry {
                trace_id: Uuid::new_v4(),
                session_key: session_key.to_string(),
                stage,
                status: TraceStatus::Fired,
                rule: rule.to_string(),
                reason: String::new(),
                fields: BTreeMap::new(),
                created_at: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: TraceStatus) -> Self {
        self.entry.status = status;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.entry.reason = reason.into();
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entry.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> TraceEntry {
        self.entry
    }
}
