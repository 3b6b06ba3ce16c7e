//! Time-window extraction.
//!
//! Recognizes explicit months, ISO dates and a handful of relative phrases.
//! Relative school-year phrases resolve through the fiscal rule: fiscal
//! year N runs July 1 (N-1) through June 30 (N). Fields the text does not
//! pin down stay `None`; a month without a year has no dates.

use chrono::{Datelike, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;
use tracing::debug;

use crate::models::{Period, PeriodCache, TimeWindowKind};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b(since|from|after|starting|until|before|through|thru|to)\s+)?\b(\d{4})-(\d{2})-(\d{2})\b",
    )
    .expect("Invalid regex")
});

static SCHOOL_YEAR_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:school\s+year|sy|fy)\s+(\d{4})\s*[-/]\s*(\d{4}|\d{2})\b")
        .expect("Invalid regex")
});

static SCHOOL_YEAR_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(this|current|last|previous|prior|the)\s+)?school\s+year\b")
        .expect("Invalid regex")
});

static YEAR_TO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:year\s+to\s+date|year-to-date|ytd)\b").expect("Invalid regex")
});

static THAT_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:that|same)\s+month\b").expect("Invalid regex"));

static RELATIVE_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(this|current|last|previous|prior)\s+month\b").expect("Invalid regex")
});

static EXPLICIT_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:in|for|during)\s+(?:the\s+month\s+of\s+)?(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b(?:\s+(\d{4}))?",
    )
    .expect("Invalid regex")
});

// "May" is left out of bare matching; it is too often a verb.
static BARE_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|june|july|august|september|sept|october|november|december)\b(?:\s+(\d{4}))?",
    )
    .expect("Invalid regex")
});

/// Fiscal (school) year containing `date`.
pub fn fiscal_year_for(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// July 1 (fy-1) through June 30 (fy).
pub fn school_year_bounds(fiscal_year: i32) -> Option<(NaiveDate, NaiveDate)> {
    NaiveDate::from_ymd_opt(fiscal_year - 1, 7, 1).zip(NaiveDate::from_ymd_opt(fiscal_year, 6, 30))
}

pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

/// Month number (1-12) for a full or abbreviated month name.
pub fn month_number(name: &str) -> Option<u32> {
    let name = name.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }
    if name == "sept" {
        return Some(9);
    }
    MONTH_NAMES
        .iter()
        .position(|m| {
            let full = m.to_lowercase();
            full == name || (name.len() == 3 && full.starts_with(&name))
        })
        .map(|i| i as u32 + 1)
}

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get((month as usize).checked_sub(1)?).copied()
}

/// A time window found in text, with the byte span it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodMatch {
    pub period: Period,
    pub span: Range<usize>,
    /// The user named a calendar month.
    pub explicit_month: bool,
}

impl PeriodMatch {
    fn new(period: Period, span: Range<usize>, explicit_month: bool) -> Self {
        Self {
            period,
            span,
            explicit_month,
        }
    }

    /// True when the match spans all of `text` (ignoring outer whitespace).
    pub fn covers(&self, text: &str) -> bool {
        let trimmed_start = text.len() - text.trim_start().len();
        let trimmed_end = text.trim_end().len();
        self.span.start <= trimmed_start && self.span.end >= trimmed_end
    }
}

pub struct PeriodExtractor;

impl PeriodExtractor {
    /// First time window in `text`, checked from most to least specific.
    pub fn extract(text: &str, today: NaiveDate, cache: &PeriodCache) -> Option<PeriodMatch> {
        let found = Self::iso_dates(text)
            .or_else(|| Self::school_year_label(text))
            .or_else(|| Self::school_year_relative(text, today))
            .or_else(|| Self::year_to_date(text, today))
            .or_else(|| Self::that_month(text, cache))
            .or_else(|| Self::relative_month(text, today))
            .or_else(|| Self::month(&EXPLICIT_MONTH, text))
            .or_else(|| Self::month(&BARE_MONTH, text));

        if let Some(m) = &found {
            debug!(
                "Period '{}' -> {:?}",
                text.get(m.span.clone()).unwrap_or_default(),
                m.period.kind
            );
        }
        found
    }

    fn iso_dates(text: &str) -> Option<PeriodMatch> {
        let mut dates: Vec<(Option<String>, NaiveDate, Range<usize>)> = Vec::new();
        for caps in ISO_DATE.captures_iter(text) {
            let Some(date) = parse_iso(&caps) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let keyword = caps.get(1).map(|k| k.as_str().to_lowercase());
            dates.push((keyword, date, whole.range()));
            if dates.len() == 2 {
                break;
            }
        }

        let mut period = Period::new(TimeWindowKind::DateRange);
        let span = match dates.as_slice() {
            [] => return None,
            [(keyword, date, span)] => {
                match keyword.as_deref() {
                    Some("since" | "from" | "after" | "starting") => period.start = Some(*date),
                    Some("until" | "before" | "through" | "thru" | "to") => period.end = Some(*date),
                    _ => {
                        period.start = Some(*date);
                        period.end = Some(*date);
                    }
                }
                span.clone()
            }
            [(_, first, first_span), (_, second, second_span), ..] => {
                let (start, end) = if first <= second {
                    (*first, *second)
                } else {
                    (*second, *first)
                };
                period.start = Some(start);
                period.end = Some(end);
                first_span.start..second_span.end
            }
        };
        Some(PeriodMatch::new(period, span, false))
    }

    fn school_year_label(text: &str) -> Option<PeriodMatch> {
        let caps = SCHOOL_YEAR_LABEL.captures(text)?;
        let first: i32 = caps.get(1)?.as_str().parse().ok()?;
        let second = caps.get(2)?.as_str();
        let fiscal_year = if second.len() == 2 {
            (first / 100) * 100 + second.parse::<i32>().ok()?
        } else {
            second.parse().ok()?
        };
        if fiscal_year != first + 1 {
            debug!("Ignoring inconsistent school year label {}-{}", first, second);
            return None;
        }
        Some(PeriodMatch::new(
            school_year_period(fiscal_year)?,
            caps.get(0)?.range(),
            false,
        ))
    }

    fn school_year_relative(text: &str, today: NaiveDate) -> Option<PeriodMatch> {
        let caps = SCHOOL_YEAR_RELATIVE.captures(text)?;
        let current = fiscal_year_for(today);
        let fiscal_year = match caps.get(1).map(|m| m.as_str().to_lowercase()).as_deref() {
            Some("last" | "previous" | "prior") => current - 1,
            _ => current,
        };
        Some(PeriodMatch::new(
            school_year_period(fiscal_year)?,
            caps.get(0)?.range(),
            false,
        ))
    }

    fn year_to_date(text: &str, today: NaiveDate) -> Option<PeriodMatch> {
        let m = YEAR_TO_DATE.find(text)?;
        let fiscal_year = fiscal_year_for(today);
        let (start, _) = school_year_bounds(fiscal_year)?;
        let mut period = Period::new(TimeWindowKind::Ytd);
        period.school_year = Some(fiscal_year);
        period.start = Some(start);
        period.end = Some(today);
        Some(PeriodMatch::new(period, m.range(), false))
    }

    fn that_month(text: &str, cache: &PeriodCache) -> Option<PeriodMatch> {
        let m = THAT_MONTH.find(text)?;
        let Some(month) = cache.last_month.clone().or_else(|| cache.last_explicit_month.clone())
        else {
            debug!("'that month' with nothing cached");
            return None;
        };
        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
        if cache.last_period_type == Some(TimeWindowKind::ExplicitMonth) {
            period.start = cache.last_period_start;
            period.end = cache.last_period_end;
            period.year = cache.last_period_start.map(|d| d.year());
        }
        period.month = Some(month);
        Some(PeriodMatch::new(period, m.range(), true))
    }

    fn relative_month(text: &str, today: NaiveDate) -> Option<PeriodMatch> {
        let caps = RELATIVE_MONTH.captures(text)?;
        let anchor = match caps.get(1).map(|m| m.as_str().to_lowercase()).as_deref() {
            Some("last" | "previous" | "prior") => today.checked_sub_months(Months::new(1))?,
            _ => today,
        };
        let (start, end) = month_bounds(anchor.year(), anchor.month())?;
        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
        period.month = month_name(anchor.month()).map(str::to_string);
        period.year = Some(anchor.year());
        period.start = Some(start);
        period.end = Some(end);
        Some(PeriodMatch::new(period, caps.get(0)?.range(), false))
    }

    fn month(pattern: &Regex, text: &str) -> Option<PeriodMatch> {
        let caps = pattern.captures(text)?;
        let number = month_number(caps.get(1)?.as_str())?;
        let mut period = Period::new(TimeWindowKind::ExplicitMonth);
        period.month = month_name(number).map(str::to_string);

        if let Some(year) = caps.get(2).and_then(|y| y.as_str().parse::<i32>().ok()) {
            if let Some((start, end)) = month_bounds(year, number) {
                period.year = Some(year);
                period.start = Some(start);
                period.end = Some(end);
            }
        }
        Some(PeriodMatch::new(period, caps.get(0)?.range(), true))
    }
}

fn parse_iso(caps: &Captures<'_>) -> Option<NaiveDate> {
    let year = caps.get(2)?.as_str().parse().ok()?;
    let month = caps.get(3)?.as_str().parse().ok()?;
    let day = caps.get(4)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn school_year_period(fiscal_year: i32) -> Option<Period> {
    let (start, end) = school_year_bounds(fiscal_year)?;
    let mut period = Period::new(TimeWindowKind::SchoolYear);
    period.school_year = Some(fiscal_year);
    period.start = Some(start);
    period.end = Some(end);
    Some(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn extract(text: &str) -> Option<PeriodMatch> {
        PeriodExtractor::extract(text, date(2025, 10, 15), &PeriodCache::default())
    }

    #[test]
    fn test_fiscal_year_rule() {
        for d in [date(2025, 7, 1), date(2025, 9, 30), date(2025, 12, 31)] {
            assert_eq!(fiscal_year_for(d), 2026);
            assert_eq!(
                school_year_bounds(fiscal_year_for(d)),
                Some((date(2025, 7, 1), date(2026, 6, 30)))
            );
        }
        for d in [date(2026, 1, 1), date(2026, 3, 15), date(2026, 6, 30)] {
            assert_eq!(fiscal_year_for(d), 2026);
            assert_eq!(
                school_year_bounds(fiscal_year_for(d)),
                Some((date(2025, 7, 1), date(2026, 6, 30)))
            );
        }
    }

    #[test]
    fn test_explicit_month_without_year_has_no_dates() {
        let m = extract("spend for Jack in August").unwrap();
        assert_eq!(m.period.kind, TimeWindowKind::ExplicitMonth);
        assert_eq!(m.period.month.as_deref(), Some("August"));
        assert!(m.period.start.is_none() && m.period.end.is_none());
        assert!(m.explicit_month);
        assert_eq!(&"spend for Jack in August"[m.span.clone()], "in August");
    }

    #[test]
    fn test_month_with_year_has_bounds() {
        let m = extract("invoices for feb 2024").unwrap();
        assert_eq!(m.period.month.as_deref(), Some("February"));
        assert_eq!(m.period.start, Some(date(2024, 2, 1)));
        assert_eq!(m.period.end, Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_bare_month_and_may() {
        assert_eq!(extract("october").unwrap().period.month.as_deref(), Some("October"));
        assert!(extract("may I see the totals").is_none());
        assert_eq!(extract("hours in May").unwrap().period.month.as_deref(), Some("May"));
    }

    #[test]
    fn test_relative_phrases() {
        let sy = extract("this school year").unwrap();
        assert_eq!(sy.period.kind, TimeWindowKind::SchoolYear);
        assert_eq!(sy.period.school_year, Some(2026));
        assert_eq!(sy.period.start, Some(date(2025, 7, 1)));

        let last = extract("last school year").unwrap();
        assert_eq!(last.period.year_window_label().as_deref(), Some("2024-2025"));

        let ytd = extract("spend ytd").unwrap();
        assert_eq!(ytd.period.kind, TimeWindowKind::Ytd);
        assert_eq!(ytd.period.end, Some(date(2025, 10, 15)));

        let lm = extract("last month").unwrap();
        assert_eq!(lm.period.month.as_deref(), Some("September"));
        assert_eq!(lm.period.end, Some(date(2025, 9, 30)));
    }

    #[test]
    fn test_school_year_label() {
        let m = extract("totals for school year 2024-25").unwrap();
        assert_eq!(m.period.school_year, Some(2025));
        assert!(extract("school year 2024-2027").unwrap().period.school_year == Some(2026));
    }

    #[test]
    fn test_iso_dates() {
        let range = extract("from 2025-08-01 to 2025-08-15").unwrap();
        assert_eq!(range.period.start, Some(date(2025, 8, 1)));
        assert_eq!(range.period.end, Some(date(2025, 8, 15)));

        let since = extract("since 2025-09-01").unwrap();
        assert_eq!(since.period.start, Some(date(2025, 9, 1)));
        assert!(since.period.end.is_none());

        let until = extract("until 2025-09-01").unwrap();
        assert!(until.period.start.is_none());

        let day = extract("on 2025-09-03").unwrap();
        assert_eq!(day.period.start, day.period.end);

        assert!(extract("2025-13-45").is_none());
    }

    #[test]
    fn test_that_month_uses_cache() {
        assert!(extract("that month").is_none());

        let mut cache = PeriodCache::default();
        cache.last_month = Some("August".into());
        let m = PeriodExtractor::extract("same month please", date(2025, 10, 1), &cache).unwrap();
        assert_eq!(m.period.month.as_deref(), Some("August"));
    }

    #[test]
    fn test_covers() {
        let text = "in august";
        assert!(extract(text).unwrap().covers(text));
        let text = "hours in august";
        assert!(!extract(text).unwrap().covers(text));
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(month_number("Sept"), Some(9));
        assert_eq!(month_number("aug"), Some(8));
        assert_eq!(month_number("ma"), None);
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
    }
}
