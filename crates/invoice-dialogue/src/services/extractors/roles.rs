use crate::config::PatternConfig;
use crate::models::EntityRole;
use crate::utils::text::{contains_phrase, find_phrase};

/// Maps role keywords and vendor-scope terms to roles.
pub struct RoleDetector<'a> {
    config: &'a PatternConfig,
}

impl<'a> RoleDetector<'a> {
    pub fn new(config: &'a PatternConfig) -> Self {
        Self { config }
    }

    /// First role (table order) with a keyword in the text.
    pub fn detect(&self, normalized: &str) -> Option<EntityRole> {
        self.config
            .roles
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| contains_phrase(normalized, k)))
            .map(|entry| entry.role)
    }

    pub fn is_vendor_scoped(&self, normalized: &str) -> bool {
        find_phrase(normalized, &self.config.phrases.vendor_scope).is_some()
    }

    /// Role for an extracted name: an explicit person/organization role
    /// word if present, else `default_role`.
    pub fn role_for_name(&self, normalized: &str, default_role: EntityRole) -> EntityRole {
        match self.detect(normalized) {
            Some(role @ (EntityRole::Student | EntityRole::Vendor | EntityRole::Clinician)) => role,
            _ => default_role,
        }
    }
}

/// Finds the metric a message asks about.
pub struct MetricDetector<'a> {
    config: &'a PatternConfig,
}

impl<'a> MetricDetector<'a> {
    pub fn new(config: &'a PatternConfig) -> Self {
        Self { config }
    }

    /// First metric in table order with a synonym in the text.
    pub fn detect(&self, normalized: &str) -> Option<String> {
        self.config
            .metrics
            .iter()
            .find(|m| m.synonyms.iter().any(|s| contains_phrase(normalized, s)))
            .map(|m| m.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::text::normalize;

    #[test]
    fn test_role_detection() {
        let config = PatternConfig::builtin();
        let roles = RoleDetector::new(&config);
        assert_eq!(
            roles.detect(&normalize("how much are we paying agencies")),
            Some(EntityRole::Vendor)
        );
        assert_eq!(
            roles.detect(&normalize("District-wide totals")),
            Some(EntityRole::District)
        );
        assert_eq!(roles.detect(&normalize("hours for Mia Chen")), None);
        assert!(roles.is_vendor_scoped(&normalize("which agency billed most")));
    }

    #[test]
    fn test_role_for_name_defaults() {
        let config = PatternConfig::builtin();
        let roles = RoleDetector::new(&config);
        assert_eq!(
            roles.role_for_name(&normalize("spend for Jack Garcia"), EntityRole::Student),
            EntityRole::Student
        );
        assert_eq!(
            roles.role_for_name(&normalize("vendor spend for Acme Therapy"), EntityRole::Student),
            EntityRole::Vendor
        );
        assert_eq!(
            roles.role_for_name(&normalize("district spend for Acme"), EntityRole::Student),
            EntityRole::Student
        );
    }

    #[test]
    fn test_metric_table_order() {
        let config = PatternConfig::builtin();
        let metrics = MetricDetector::new(&config);
        assert_eq!(metrics.detect("how much did we spend").as_deref(), Some("spend"));
        assert_eq!(metrics.detect("what about her hours").as_deref(), Some("hours"));
        assert_eq!(metrics.detect("how many invoices").as_deref(), Some("invoice_count"));
        assert_eq!(metrics.detect("district wide totals"), None);
    }

    #[test]
    fn test_empty_config_matches_nothing() {
        let config = PatternConfig::empty();
        assert_eq!(RoleDetector::new(&config).detect("student spend"), None);
        assert_eq!(MetricDetector::new(&config).detect("student spend"), None);
    }
}
