use serde::{Deserialize, Serialize};

/// Outcome of classifying one turn against the previous context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Fuse,
    NewTopic,
    Clarification,
    TimeOnlyFollowup,
    ProviderTimeFollowup,
    MetricFollowup,
    ListFollowup,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fuse => "fuse",
            Self::NewTopic => "new_topic",
            Self::Clarification => "clarification",
            Self::TimeOnlyFollowup => "time_only_followup",
            Self::ProviderTimeFollowup => "provider_time_followup",
            Self::MetricFollowup => "metric_followup",
            Self::ListFollowup => "list_followup",
        }
    }

    /// Decisions that keep (and narrow) the active topic.
    pub fn is_continuation(&self) -> bool {
        matches!(
            self,
            Self::Fuse
                | Self::TimeOnlyFollowup
                | Self::ProviderTimeFollowup
                | Self::MetricFollowup
                | Self::ListFollowup
        )
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
