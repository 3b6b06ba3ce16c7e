use crate::config::PatternConfig;
use crate::models::{DecisionKind, EntityRole, SlotDelta, Slots};

/// previous slots -> policy resets -> rule delta. Nothing else is dropped.
pub fn fuse_slots(
    config: &PatternConfig,
    decision: DecisionKind,
    previous: &Slots,
    delta: &SlotDelta,
) -> Slots {
    let policy = config.policy_for(decision);
    let mut slots = previous.clone();
    for key in &policy.resets_slots {
        slots.clear(*key);
    }
    delta.apply(&mut slots);
    slots
}

/// Upstream plan kind for a (role, metric) pair.
pub fn plan_kind_for(role: Option<EntityRole>, metric: &str) -> Option<String> {
    let prefix = match role? {
        EntityRole::Student => "student",
        EntityRole::Vendor => "vendor",
        EntityRole::Clinician => "clinician",
        EntityRole::District => return Some("district_summary".to_string()),
        EntityRole::Invoice => return Some("invoice_details".to_string()),
        EntityRole::Month => return None,
    };
    let suffix = match metric {
        "invoice_count" => "invoices",
        other => other,
    };
    Some(format!("{}_{}", prefix, suffix))
}
