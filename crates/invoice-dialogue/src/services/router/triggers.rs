use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::PatternConfig;
use crate::models::QueryMode;
use crate::utils::text::{contains_phrase, find_phrase};

pub const DEFAULT_TOP_N: u32 = 10;

static TOP_N: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\btop\s+(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b",
    )
    .expect("Invalid regex")
});

const NUMBER_WORDS: [&str; 20] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
    "twenty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextModeSource {
    TopN,
    Drilldown,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerHit {
    pub mode: QueryMode,
    pub phrase: String,
}

/// Mode implied by the message text alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextModeMatch {
    pub mode: QueryMode,
    pub source: TextModeSource,
    pub top_n: Option<u32>,
    /// Every trigger phrase that matched; empty for top-N and drilldown.
    pub hits: Vec<TriggerHit>,
}

impl TextModeMatch {
    /// Two or more trigger phrases, all for the same mode.
    pub fn is_unanimous(&self) -> bool {
        self.hits.len() >= 2 && self.hits.iter().all(|h| h.mode == self.mode)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.source, TextModeSource::TopN | TextModeSource::Drilldown)
    }
}

/// "top 5", "top ten", or a superlative next to "invoice(s)".
pub fn detect_top_n(config: &PatternConfig, normalized: &str) -> Option<u32> {
    if let Some(caps) = TOP_N.captures(normalized) {
        let raw = caps.get(1)?.as_str();
        let n = raw.parse::<u32>().ok().or_else(|| {
            NUMBER_WORDS
                .iter()
                .position(|w| *w == raw)
                .map(|i| i as u32 + 1)
        })?;
        if n > 0 {
            return Some(n);
        }
    }

    let mentions_invoices =
        contains_phrase(normalized, "invoice") || contains_phrase(normalized, "invoices");
    if mentions_invoices && find_phrase(normalized, &config.phrases.top_n).is_some() {
        return Some(DEFAULT_TOP_N);
    }
    None
}

pub fn detect_drilldown<'a>(config: &'a PatternConfig, normalized: &str) -> Option<&'a str> {
    find_phrase(normalized, &config.phrases.drilldown)
}

/// All trigger phrases found, in table order.
pub fn trigger_hits(config: &PatternConfig, normalized: &str) -> Vec<TriggerHit> {
    config
        .mode_triggers
        .iter()
        .flat_map(|trigger| {
            trigger
                .phrases
                .iter()
                .filter(|p| contains_phrase(normalized, p))
                .map(move |p| TriggerHit {
                    mode: trigger.mode,
                    phrase: p.clone(),
                })
        })
        .collect()
}

/// Steps 1-3 of routing on text alone: top-N, then drilldown, then the
/// trigger table with ties broken by mode priority.
pub fn detect_text_mode(config: &PatternConfig, normalized: &str) -> Option<TextModeMatch> {
    if let Some(n) = detect_top_n(config, normalized) {
        return Some(TextModeMatch {
            mode: QueryMode::TopInvoices,
            source: TextModeSource::TopN,
            top_n: Some(n),
            hits: Vec::new(),
        });
    }

    if detect_drilldown(config, normalized).is_some() {
        return Some(TextModeMatch {
            mode: QueryMode::InvoiceDetails,
            source: TextModeSource::Drilldown,
            top_n: None,
            hits: Vec::new(),
        });
    }

    let hits = trigger_hits(config, normalized);
    let mode = hits.iter().map(|h| h.mode).min_by_key(QueryMode::priority)?;
    Some(TextModeMatch {
        mode,
        source: TextModeSource::Trigger,
        top_n: None,
        hits,
    })
}
