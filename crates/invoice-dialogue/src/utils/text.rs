//! Text helpers shared by the extractors, classifier and router.
//!
//! Phrase matching works on a normalized form: lowercase, punctuation
//! folded to spaces (hyphens and apostrophes kept), whitespace collapsed.
//! Matches are whole-word, so "her" never matches inside "there".

/// Normalize free text for phrase matching.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-phrase containment on normalized text.
pub fn contains_phrase(normalized_text: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() || normalized_text.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", normalized_text);
    haystack.contains(&format!(" {} ", phrase))
}

/// First phrase (in list order) contained in the text.
pub fn find_phrase<'a>(normalized_text: &str, phrases: &'a [String]) -> Option<&'a str> {
    phrases
        .iter()
        .find(|p| contains_phrase(normalized_text, p))
        .map(String::as_str)
}

/// Repeatedly strip leading phrases. Longer phrases are tried first so
/// "and what about" wins over "and".
pub fn strip_leading_phrases(normalized_text: &str, phrases: &[String]) -> String {
    let ordered = longest_first(phrases);
    let mut current = normalized_text.to_string();

    loop {
        let before = current.clone();
        for phrase in &ordered {
            if current == *phrase {
                current.clear();
                break;
            }
            if let Some(rest) = current.strip_prefix(&format!("{} ", phrase)) {
                current = rest.to_string();
                break;
            }
        }
        if current == before || current.is_empty() {
            return current;
        }
    }
}

/// Repeatedly strip trailing phrases.
pub fn strip_trailing_phrases(normalized_text: &str, phrases: &[String]) -> String {
    let ordered = longest_first(phrases);
    let mut current = normalized_text.to_string();

    loop {
        let before = current.clone();
        for phrase in &ordered {
            if current == *phrase {
                current.clear();
                break;
            }
            if let Some(rest) = current.strip_suffix(&format!(" {}", phrase)) {
                current = rest.to_string();
                break;
            }
        }
        if current == before || current.is_empty() {
            return current;
        }
    }
}

fn longest_first(phrases: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = phrases
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.is_empty())
        .collect();
    // Stable sort keeps list order among equal lengths.
    ordered.sort_by(|a, b| b.len().cmp(&a.len()));
    ordered
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Trim surrounding whitespace and trailing sentence punctuation.
pub fn trim_query(text: &str) -> String {
    text.trim()
        .trim_end_matches(['?', '.', '!', ',', ';'])
        .trim()
        .to_string()
}

/// Case-insensitive substring test on raw text.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Push a value if no case-insensitive duplicate is present.
pub fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}
