//! Stateless extractors turning raw text into structured hints.
//! None of them fail; no match means an empty hint.

pub mod names;
pub mod periods;
pub mod references;
pub mod roles;

pub use names::{NameCandidate, NameExtractor};
pub use periods::{fiscal_year_for, school_year_bounds, PeriodExtractor, PeriodMatch};
pub use references::{ReferenceResolution, ReferenceResolver};
pub use roles::{MetricDetector, RoleDetector};

use chrono::NaiveDate;

use crate::config::PatternConfig;
use crate::models::{ConversationState, EntityRole};
use crate::utils::text::{find_phrase, normalize};

/// Everything the extractors found in one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHints {
    pub normalized: String,
    pub name: Option<String>,
    /// Role assigned to `name`.
    pub name_role: Option<EntityRole>,
    /// Role keyword present in the text, if any.
    pub role: Option<EntityRole>,
    pub vendor_scoped: bool,
    /// An "all vendors" style confirmation.
    pub all_vendors: bool,
    pub metric: Option<String>,
    pub period: Option<PeriodMatch>,
    pub reference: ReferenceResolution,
}

impl MessageHints {
    pub fn extract(
        config: &PatternConfig,
        message: &str,
        state: &ConversationState,
        today: NaiveDate,
        default_name_role: EntityRole,
    ) -> Self {
        let normalized = normalize(message);
        let roles = RoleDetector::new(config);

        let mut name = NameExtractor::new(config).extract(message);
        let reference = ReferenceResolver::new(config).resolve(&normalized, state);
        if name.is_none() {
            if let ReferenceResolution::Candidate(candidate) = &reference {
                name = Some(candidate.clone());
            }
        }
        let name_role = name
            .as_ref()
            .map(|_| roles.role_for_name(&normalized, default_name_role));

        Self {
            role: roles.detect(&normalized),
            vendor_scoped: roles.is_vendor_scoped(&normalized),
            all_vendors: find_phrase(&normalized, &config.phrases.all_vendors).is_some(),
            metric: MetricDetector::new(config).detect(&normalized),
            period: PeriodExtractor::extract(message, today, &state.time_cache),
            name,
            name_role,
            reference,
            normalized,
        }
    }

    /// Role a topic seeded from this message starts with. A month is a
    /// time window, never a topic.
    pub fn seed_role(&self) -> Option<EntityRole> {
        self.name_role
            .or(self.role)
            .filter(|role| *role != EntityRole::Month)
    }

    /// A name that differs from `current`.
    pub fn names_other_than(&self, current: Option<&str>) -> bool {
        match (&self.name, current) {
            (Some(name), Some(current)) => !name.eq_ignore_ascii_case(current.trim()),
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActiveTopic, TimeWindowKind};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    #[test]
    fn test_hints_for_seed_message() {
        let config = PatternConfig::builtin();
        let hints = MessageHints::extract(
            &config,
            "Spend for Jack Garcia in August",
            &ConversationState::new(),
            today(),
            EntityRole::Student,
        );
        assert_eq!(hints.name.as_deref(), Some("Jack Garcia"));
        assert_eq!(hints.name_role, Some(EntityRole::Student));
        assert_eq!(hints.metric.as_deref(), Some("spend"));
        assert_eq!(
            hints.period.as_ref().map(|p| p.period.kind),
            Some(TimeWindowKind::ExplicitMonth)
        );
        assert_eq!(hints.reference, ReferenceResolution::NotReferenced);
    }

    #[test]
    fn test_seed_role_never_month() {
        let config = PatternConfig::builtin();
        let mut hints = MessageHints::extract(
            &config,
            "district totals",
            &ConversationState::new(),
            today(),
            EntityRole::Student,
        );
        assert_eq!(hints.seed_role(), Some(EntityRole::District));

        hints.role = Some(EntityRole::Month);
        assert_eq!(hints.seed_role(), None);
        hints.name_role = Some(EntityRole::Month);
        assert_eq!(hints.seed_role(), None);
        hints.name_role = Some(EntityRole::Vendor);
        assert_eq!(hints.seed_role(), Some(EntityRole::Vendor));
    }

    #[test]
    fn test_loose_all_is_not_a_vendor_confirmation() {
        let config = PatternConfig::builtin();
        let extract = |message: &str| {
            MessageHints::extract(&config, message, &ConversationState::new(), today(), EntityRole::Student)
        };
        assert!(!extract("how much are we paying agencies across all schools").all_vendors);
        assert!(!extract("what do agencies charge everyone").all_vendors);
        assert!(extract("spend across all vendors").all_vendors);
        assert!(extract("vendor-wide spend").all_vendors);
    }

    #[test]
    fn test_sole_candidate_fills_name() {
        let config = PatternConfig::builtin();
        let mut state = ConversationState::new();
        state.candidate_entities = vec!["Mia Chen".into()];
        let hints =
            MessageHints::extract(&config, "hours for that student", &state, today(), EntityRole::Student);
        assert_eq!(hints.name.as_deref(), Some("Mia Chen"));
    }

    #[test]
    fn test_names_other_than() {
        let config = PatternConfig::builtin();
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, "Jack Garcia", "q");
        let hints =
            MessageHints::extract(&config, "and Mia Chen?", &state, today(), EntityRole::Student);
        assert!(hints.names_other_than(Some("Jack Garcia")));
        assert!(!hints.names_other_than(Some("mia chen")));
    }
}
