//! Builders for the fused query text.

use chrono::NaiveDate;

use crate::models::{EntityRole, Period, PeriodCache, Slots};
use crate::services::extractors::PeriodExtractor;
use crate::utils::text::{contains_ignore_case, trim_query};

/// Swap the time phrase in `base` for `period`, or append it.
pub fn replace_time(base: &str, period: &Period, today: NaiveDate, cache: &PeriodCache) -> String {
    let base = trim_query(base);
    let Some(phrase) = period.describe() else {
        return base;
    };

    match PeriodExtractor::extract(&base, today, cache) {
        Some(found) => {
            let head = base.get(..found.span.start).unwrap_or_default().trim_end();
            let tail = base.get(found.span.end..).unwrap_or_default().trim_start();
            join_words(&[head, &phrase, tail])
        }
        None => join_words(&[&base, &phrase]),
    }
}

/// Append " for {value}" unless the query already names it.
pub fn append_topic(query: &str, value: &str) -> String {
    let query = trim_query(query);
    if value.trim().is_empty() || contains_ignore_case(&query, value.trim()) {
        return query;
    }
    format!("{} for {}", query, value.trim())
}

/// Append the inherited time window when the query has none of its own.
pub fn append_time(
    query: &str,
    period: Option<&Period>,
    today: NaiveDate,
    cache: &PeriodCache,
) -> String {
    let query = trim_query(query);
    if PeriodExtractor::extract(&query, today, cache).is_some() {
        return query;
    }
    match period.and_then(Period::describe) {
        Some(phrase) => join_words(&[&query, &phrase]),
        None => query,
    }
}

/// A plain query rebuilt from slots, for turns with no stored query text.
pub fn compose_from_slots(slots: &Slots) -> String {
    let metric = slots.metric.as_deref().unwrap_or("spend").replace('_', " ");
    let subject = match (&slots.entity_name, slots.entity_role) {
        (Some(name), _) => format!("{} for {}", metric, name),
        (None, Some(EntityRole::District)) => format!("district {}", metric),
        (None, Some(EntityRole::Vendor)) if slots.all_vendors => {
            format!("{} across all vendors", metric)
        }
        (None, Some(role)) => format!("{} by {}", metric, role),
        (None, None) => metric,
    };
    match slots.period().as_ref().and_then(Period::describe) {
        Some(phrase) => join_words(&[&subject, &phrase]),
        None => subject,
    }
}

pub fn provider_breakdown_query(student: &str, period: Option<&Period>) -> String {
    let base = format!("hours by provider for {}", student);
    match period.and_then(Period::describe) {
        Some(phrase) => join_words(&[&base, &phrase]),
        None => base,
    }
}

fn join_words(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeWindowKind;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    fn month(name: &str) -> Period {
        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
        period.month = Some(name.to_string());
        period
    }

    #[test]
    fn test_replace_time_in_place() {
        let cache = PeriodCache::default();
        assert_eq!(
            replace_time("spend for Jack Garcia in August?", &month("September"), today(), &cache),
            "spend for Jack Garcia in September"
        );
        assert_eq!(
            replace_time("spend for Jack Garcia", &month("September"), today(), &cache),
            "spend for Jack Garcia in September"
        );
    }

    #[test]
    fn test_append_topic_and_time() {
        let cache = PeriodCache::default();
        let q = append_topic("Now give me invoice details for August", "Jack Garcia");
        assert_eq!(q, "Now give me invoice details for August for Jack Garcia");
        assert_eq!(append_time(&q, Some(&month("July")), today(), &cache), q);
        assert_eq!(
            append_time("what about hours", Some(&month("July")), today(), &cache),
            "what about hours in July"
        );
        assert_eq!(append_topic("hours for jack garcia", "Jack Garcia"), "hours for jack garcia");
    }

    #[test]
    fn test_compose_from_slots() {
        let slots = Slots {
            entity_role: Some(EntityRole::Vendor),
            all_vendors: true,
            metric: Some("invoice_count".into()),
            ..Default::default()
        };
        assert_eq!(compose_from_slots(&slots), "invoice count across all vendors");
    }

    #[test]
    fn test_provider_breakdown_query() {
        assert_eq!(
            provider_breakdown_query("Mia Chen", Some(&month("May"))),
            "hours by provider for Mia Chen in May"
        );
    }
}
