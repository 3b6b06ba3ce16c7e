//! Intent Shape Analyzer
//! Tags a message with a coarse shape so an abrupt change of question
//! type between turns can be noticed.

use tracing::debug;

use crate::models::IntentShape;

pub struct IntentShapeAnalyzer;

impl IntentShapeAnalyzer {
    /// Pattern match on the lowercased message. First group wins.
    pub fn analyze(query: &str) -> IntentShape {
        let query_lower = query.to_lowercase();

        // Pattern 1: invoice drilldowns
        let invoice_patterns = [
            "invoice details",
            "invoice detail",
            "line item",
            "line-item",
            "itemized",
            "invoice lines",
            "drill down",
            "drilldown",
        ];

        for pattern in &invoice_patterns {
            if query_lower.contains(pattern) {
                debug!("Detected InvoiceDetails shape: matched '{}'", pattern);
                return IntentShape::InvoiceDetails;
            }
        }

        // Pattern 2: provider breakdowns
        let provider_patterns = [
            "by provider",
            "per provider",
            "providers",
            "provider breakdown",
            "each provider",
            "therapists",
        ];

        for pattern in &provider_patterns {
            if query_lower.contains(pattern) {
                debug!("Detected ProviderBreakdown shape: matched '{}'", pattern);
                return IntentShape::ProviderBreakdown;
            }
        }

        // Pattern 3: listings
        let list_patterns = [
            "list all",
            "list of",
            "show all",
            "which students",
            "which vendors",
            "which providers",
            "who are the",
        ];

        for pattern in &list_patterns {
            if query_lower.contains(pattern) {
                debug!("Detected ListEntities shape: matched '{}'", pattern);
                return IntentShape::ListEntities;
            }
        }

        // Pattern 4: district-wide metrics
        let district_patterns = [
            "district wide",
            "district-wide",
            "districtwide",
            "across the district",
            "whole district",
            "entire district",
            "district total",
            "top invoices",
            "highest invoices",
        ];

        for pattern in &district_patterns {
            if query_lower.contains(pattern) {
                debug!("Detected DistrictMetrics shape: matched '{}'", pattern);
                return IntentShape::DistrictMetrics;
            }
        }

        // Pattern 5: per-student metrics
        let student_patterns = [
            "student",
            "spend for",
            "hours for",
            "cost for",
            "her hours",
            "his hours",
            "their hours",
        ];

        for pattern in &student_patterns {
            if query_lower.contains(pattern) {
                debug!("Detected StudentMetrics shape: matched '{}'", pattern);
                return IntentShape::StudentMetrics;
            }
        }

        debug!("Defaulting to Unknown shape");
        IntentShape::Unknown
    }

    /// A jump from a specific shape to one that widens the question
    /// (district-wide or a listing). Narrowing moves such as a drilldown
    /// on the same topic are not abrupt.
    pub fn is_abrupt_change(previous: IntentShape, current: IntentShape) -> bool {
        previous != IntentShape::Unknown
            && current != previous
            && matches!(
                current,
                IntentShape::DistrictMetrics | IntentShape::ListEntities
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_details_shape() {
        assert_eq!(
            IntentShapeAnalyzer::analyze("Now give me invoice details for August"),
            IntentShape::InvoiceDetails
        );
        assert_eq!(
            IntentShapeAnalyzer::analyze("itemized charges please"),
            IntentShape::InvoiceDetails
        );
    }

    #[test]
    fn test_provider_shape() {
        assert_eq!(
            IntentShapeAnalyzer::analyze("what about her hours with providers"),
            IntentShape::ProviderBreakdown
        );
    }

    #[test]
    fn test_district_and_list_shapes() {
        assert_eq!(
            IntentShapeAnalyzer::analyze("District wide totals for October"),
            IntentShape::DistrictMetrics
        );
        assert_eq!(
            IntentShapeAnalyzer::analyze("list all students with invoices"),
            IntentShape::ListEntities
        );
    }

    #[test]
    fn test_student_and_unknown_shapes() {
        assert_eq!(
            IntentShapeAnalyzer::analyze("spend for Jack Garcia"),
            IntentShape::StudentMetrics
        );
        assert_eq!(IntentShapeAnalyzer::analyze("hello"), IntentShape::Unknown);
    }

    #[test]
    fn test_abrupt_change() {
        use IntentShape::*;
        assert!(IntentShapeAnalyzer::is_abrupt_change(StudentMetrics, DistrictMetrics));
        assert!(IntentShapeAnalyzer::is_abrupt_change(ProviderBreakdown, ListEntities));
        assert!(!IntentShapeAnalyzer::is_abrupt_change(StudentMetrics, InvoiceDetails));
        assert!(!IntentShapeAnalyzer::is_abrupt_change(Unknown, DistrictMetrics));
        assert!(!IntentShapeAnalyzer::is_abrupt_change(DistrictMetrics, DistrictMetrics));
    }
}
