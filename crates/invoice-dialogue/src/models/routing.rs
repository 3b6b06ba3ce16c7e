use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::state::{EntityRole, TimeWindowKind};

/// Canonical query shape executed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    StudentMonthly,
    VendorMonthly,
    ClinicianMonthly,
    DistrictSummary,
    InvoiceDetails,
    TopInvoices,
    StudentProviderBreakdown,
    ProviderBreakdown,
    StudentProviderYear,
}

impl QueryMode {
    /// Tie-break order for trigger matches, highest first.
    pub const PRIORITY: [QueryMode; 9] = [
        QueryMode::InvoiceDetails,
        QueryMode::TopInvoices,
        QueryMode::StudentProviderBreakdown,
        QueryMode::StudentProviderYear,
        QueryMode::StudentMonthly,
        QueryMode::VendorMonthly,
        QueryMode::ClinicianMonthly,
        QueryMode::ProviderBreakdown,
        QueryMode::DistrictSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudentMonthly => "student_monthly",
            Self::VendorMonthly => "vendor_monthly",
            Self::ClinicianMonthly => "clinician_monthly",
            Self::DistrictSummary => "district_summary",
            Self::InvoiceDetails => "invoice_details",
            Self::TopInvoices => "top_invoices",
            Self::StudentProviderBreakdown => "student_provider_breakdown",
            Self::ProviderBreakdown => "provider_breakdown",
            Self::StudentProviderYear => "student_provider_year",
        }
    }

    /// Position in [`QueryMode::PRIORITY`]; lower wins.
    pub fn priority(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|m| m == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// How narrowly the mode scopes a query; higher is more specific.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::InvoiceDetails | Self::StudentProviderBreakdown | Self::StudentProviderYear => 3,
            Self::StudentMonthly | Self::VendorMonthly | Self::ClinicianMonthly => 2,
            Self::ProviderBreakdown | Self::TopInvoices => 1,
            Self::DistrictSummary => 0,
        }
    }

    /// Modes that must never inherit an entity filter from the topic.
    pub fn is_non_entity_scoped(&self) -> bool {
        matches!(
            self,
            Self::TopInvoices | Self::InvoiceDetails | Self::DistrictSummary
        )
    }

    pub fn is_provider_breakdown(&self) -> bool {
        matches!(
            self,
            Self::ProviderBreakdown | Self::StudentProviderBreakdown | Self::StudentProviderYear
        )
    }

    /// Upstream plan-kind vocabulary.
    pub fn from_plan_kind(kind: &str) -> Option<Self> {
        let mode = match kind.trim().to_lowercase().as_str() {
            "student_monthly" | "student_spend" | "student_hours" | "student_invoices" => {
                Self::StudentMonthly
            }
            "vendor_monthly" | "vendor_spend" | "vendor_hours" | "vendor_invoices" => {
                Self::VendorMonthly
            }
            "clinician_monthly" | "clinician_spend" | "clinician_hours" | "clinician_invoices" => {
                Self::ClinicianMonthly
            }
            "district_summary" | "district_totals" | "district_metrics" => Self::DistrictSummary,
            "invoice_details" | "invoice_lines" | "line_items" => Self::InvoiceDetails,
            "top_invoices" => Self::TopInvoices,
            "student_provider_breakdown" => Self::StudentProviderBreakdown,
            "student_provider_year" => Self::StudentProviderYear,
            "provider_breakdown" => Self::ProviderBreakdown,
            _ => return None,
        };
        Some(mode)
    }

    /// Mode used when nothing but the primary entity role is known.
    pub fn default_for_role(role: EntityRole) -> Option<Self> {
        match role {
            EntityRole::Student => Some(Self::StudentMonthly),
            EntityRole::Vendor => Some(Self::VendorMonthly),
            EntityRole::Clinician => Some(Self::ClinicianMonthly),
            EntityRole::Invoice => Some(Self::InvoiceDetails),
            EntityRole::District => Some(Self::DistrictSummary),
            EntityRole::Month => None,
        }
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Per-turn routing outcome handed to execution and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub mode: QueryMode,
    pub primary_entity_type: Option<EntityRole>,
    pub primary_entities: Vec<String>,
    pub time_window: TimeWindowKind,
    pub month_names: Vec<String>,
    pub metrics: Vec<String>,
    pub needs_invoice_details: bool,
    pub needs_provider_breakdown: bool,
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
    pub notes: Vec<String>,
}

impl RoutingDecision {
    pub fn new(mode: QueryMode) -> Self {
        Self {
            mode,
            primary_entity_type: None,
            primary_entities: Vec::new(),
            time_window: TimeWindowKind::Unspecified,
            month_names: Vec::new(),
            metrics: Vec::new(),
            needs_invoice_details: false,
            needs_provider_breakdown: false,
            date_range: None,
            top_n: None,
            notes: Vec::new(),
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(QueryMode::InvoiceDetails.priority() < QueryMode::TopInvoices.priority());
        assert!(
            QueryMode::StudentProviderBreakdown.priority() < QueryMode::StudentMonthly.priority()
        );
        assert_eq!(QueryMode::DistrictSummary.priority(), 8);
    }

    #[test]
    fn test_plan_kind_lookup() {
        assert_eq!(
            QueryMode::from_plan_kind("Student_Hours"),
            Some(QueryMode::StudentMonthly)
        );
        assert_eq!(
            QueryMode::from_plan_kind("line_items"),
            Some(QueryMode::InvoiceDetails)
        );
        assert_eq!(QueryMode::from_plan_kind("weather"), None);
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&QueryMode::StudentProviderYear).unwrap();
        assert_eq!(json, "\"student_provider_year\"");
    }
}
