use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::routing::QueryMode;
use super::state::{EntityRole, Period, TimeWindowKind};

/// Named pieces of cross-turn context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    EntityRole,
    EntityName,
    AllVendors,
    Metric,
    Mode,
    PlanKind,
    TimeWindowKind,
    Month,
    PeriodStart,
    PeriodEnd,
}

impl SlotKey {
    pub const ALL: [SlotKey; 10] = [
        SlotKey::EntityRole,
        SlotKey::EntityName,
        SlotKey::AllVendors,
        SlotKey::Metric,
        SlotKey::Mode,
        SlotKey::PlanKind,
        SlotKey::TimeWindowKind,
        SlotKey::Month,
        SlotKey::PeriodStart,
        SlotKey::PeriodEnd,
    ];

    pub const TIME: [SlotKey; 4] = [
        SlotKey::TimeWindowKind,
        SlotKey::Month,
        SlotKey::PeriodStart,
        SlotKey::PeriodEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityRole => "entity_role",
            Self::EntityName => "entity_name",
            Self::AllVendors => "all_vendors",
            Self::Metric => "metric",
            Self::Mode => "mode",
            Self::PlanKind => "plan_kind",
            Self::TimeWindowKind => "time_window_kind",
            Self::Month => "month",
            Self::PeriodStart => "period_start",
            Self::PeriodEnd => "period_end",
        }
    }

    pub fn is_time(&self) -> bool {
        Self::TIME.contains(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slots {
    pub entity_role: Option<EntityRole>,
    pub entity_name: Option<String>,
    /// User confirmed a vendor-wide aggregate.
    pub all_vendors: bool,
    pub metric: Option<String>,
    pub mode: Option<QueryMode>,
    pub plan_kind: Option<String>,
    pub time_window_kind: Option<TimeWindowKind>,
    pub month: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

impl Slots {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when anything besides time is known.
    pub fn has_non_time_context(&self) -> bool {
        self.entity_role.is_some()
            || self.entity_name.is_some()
            || self.metric.is_some()
            || self.plan_kind.is_some()
            || self.mode.is_some()
    }

    pub fn clear(&mut self, key: SlotKey) {
        match key {
            SlotKey::EntityRole => self.entity_role = None,
            SlotKey::EntityName => self.entity_name = None,
            SlotKey::AllVendors => self.all_vendors = false,
            SlotKey::Metric => self.metric = None,
            SlotKey::Mode => self.mode = None,
            SlotKey::PlanKind => self.plan_kind = None,
            SlotKey::TimeWindowKind => self.time_window_kind = None,
            SlotKey::Month => self.month = None,
            SlotKey::PeriodStart => self.period_start = None,
            SlotKey::PeriodEnd => self.period_end = None,
        }
    }

    /// Whether a slot holds a value, used by fusion checks and traces.
    pub fn is_set(&self, key: SlotKey) -> bool {
        match key {
            SlotKey::EntityRole => self.entity_role.is_some(),
            SlotKey::EntityName => self.entity_name.is_some(),
            SlotKey::AllVendors => self.all_vendors,
            SlotKey::Metric => self.metric.is_some(),
            SlotKey::Mode => self.mode.is_some(),
            SlotKey::PlanKind => self.plan_kind.is_some(),
            SlotKey::TimeWindowKind => self.time_window_kind.is_some(),
            SlotKey::Month => self.month.is_some(),
            SlotKey::PeriodStart => self.period_start.is_some(),
            SlotKey::PeriodEnd => self.period_end.is_some(),
        }
    }

    /// Vendor scope with nothing to scope it to.
    pub fn is_unscoped_vendor(&self) -> bool {
        let vendor_scoped = self.entity_role == Some(EntityRole::Vendor)
            || self.mode == Some(QueryMode::VendorMonthly)
            || self
                .plan_kind
                .as_deref()
                .is_some_and(|k| k.starts_with("vendor_"));
        let has_name = self
            .entity_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        vendor_scoped && !has_name && !self.all_vendors
    }

    /// Current time slots as a period, if any are set.
    pub fn period(&self) -> Option<Period> {
        let kind = self.time_window_kind?;
        let mut period = Period::new(kind);
        period.month = self.month.clone();
        period.start = self.period_start;
        period.end = self.period_end;
        Some(period)
    }
}

/// Values a rule sets explicitly. `None` leaves the fused slot alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDelta {
    pub entity_role: Option<EntityRole>,
    pub entity_name: Option<String>,
    pub all_vendors: Option<bool>,
    pub metric: Option<String>,
    pub mode: Option<QueryMode>,
    pub plan_kind: Option<String>,
    pub period: Option<Period>,
}

impl SlotDelta {
    pub fn with_period(mut self, period: Option<Period>) -> Self {
        self.period = period;
        self
    }

    pub fn apply(&self, slots: &mut Slots) {
        if let Some(role) = self.entity_role {
            slots.entity_role = Some(role);
        }
        if let Some(name) = &self.entity_name {
            slots.entity_name = Some(name.clone());
        }
        if let Some(all) = self.all_vendors {
            slots.all_vendors = all;
        }
        if let Some(metric) = &self.metric {
            slots.metric = Some(metric.clone());
        }
        if let Some(mode) = self.mode {
            slots.mode = Some(mode);
        }
        if let Some(kind) = &self.plan_kind {
            slots.plan_kind = Some(kind.clone());
        }
        if let Some(period) = &self.period {
            // Time slots move together.
            slots.time_window_kind = Some(period.kind);
            slots.month = period.month.clone();
            slots.period_start = period.start;
            slots.period_end = period.end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscoped_vendor() {
        let mut slots = Slots {
            entity_role: Some(EntityRole::Vendor),
            metric: Some("spend".into()),
            ..Default::default()
        };
        assert!(slots.is_unscoped_vendor());

        slots.all_vendors = true;
        assert!(!slots.is_unscoped_vendor());

        slots.all_vendors = false;
        slots.entity_name = Some("Acme Therapy".into());
        assert!(!slots.is_unscoped_vendor());

        let plan_only = Slots {
            plan_kind: Some("vendor_spend".into()),
            ..Default::default()
        };
        assert!(plan_only.is_unscoped_vendor());
    }

    #[test]
    fn test_delta_period_overwrites_all_time_slots() {
        let mut slots = Slots {
            time_window_kind: Some(TimeWindowKind::DateRange),
            period_start: NaiveDate::from_ymd_opt(2025, 1, 1),
            period_end: NaiveDate::from_ymd_opt(2025, 1, 31),
            metric: Some("hours".into()),
            ..Default::default()
        };
        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
        period.month = Some("August".into());

        SlotDelta::default().with_period(Some(period)).apply(&mut slots);

        assert_eq!(slots.time_window_kind, Some(TimeWindowKind::ExplicitMonth));
        assert_eq!(slots.month.as_deref(), Some("August"));
        assert!(slots.period_start.is_none());
        assert!(slots.period_end.is_none());
        assert_eq!(slots.metric.as_deref(), Some("hours"));
    }

    #[test]
    fn test_slot_key_names() {
        let json = serde_json::to_string(&SlotKey::TimeWindowKind).unwrap();
        assert_eq!(json, "\"time_window_kind\"");
        assert!(SlotKey::Month.is_time());
        assert!(!SlotKey::Metric.is_time());
    }
}
