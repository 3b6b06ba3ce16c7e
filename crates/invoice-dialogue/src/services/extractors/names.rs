use tracing::debug;

use crate::config::PatternConfig;

/// A capitalized run that survived the stop-word filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCandidate {
    pub value: String,
    /// The run starts right after "for".
    pub after_for: bool,
}

/// Finds person and organization names by capitalization.
///
/// Stop-words break a run, only the first two tokens of a run are kept,
/// and single tokens need to be allow-listed.
pub struct NameExtractor<'a> {
    config: &'a PatternConfig,
}

impl<'a> NameExtractor<'a> {
    pub fn new(config: &'a PatternConfig) -> Self {
        Self { config }
    }

    /// Best candidate: the first one after "for", else the first one.
    pub fn extract(&self, text: &str) -> Option<String> {
        let candidates = self.candidates(text);
        candidates
            .iter()
            .find(|c| c.after_for)
            .or_else(|| candidates.first())
            .map(|c| c.value.clone())
    }

    pub fn candidates(&self, text: &str) -> Vec<NameCandidate> {
        let mut candidates = Vec::new();
        let mut run: Vec<String> = Vec::new();
        let mut run_after_for = false;
        let mut previous_word = String::new();

        for raw in text.split_whitespace() {
            let token = clean_token(raw);
            let breaks_after = raw.ends_with([',', '.', '?', '!', ';', ':']);

            if self.is_name_token(&token) {
                if run.is_empty() {
                    run_after_for = previous_word == "for";
                }
                run.push(token.clone());
            } else {
                self.close_run(&mut run, run_after_for, &mut candidates);
            }

            if breaks_after {
                self.close_run(&mut run, run_after_for, &mut candidates);
            }
            previous_word = token.to_lowercase();
        }
        self.close_run(&mut run, run_after_for, &mut candidates);

        candidates
    }

    fn is_name_token(&self, token: &str) -> bool {
        let Some(first) = token.chars().next() else {
            return false;
        };
        first.is_uppercase()
            && !token.chars().any(|c| c.is_ascii_digit())
            && !self.config.is_stop_word(token)
    }

    fn close_run(&self, run: &mut Vec<String>, after_for: bool, out: &mut Vec<NameCandidate>) {
        if run.is_empty() {
            return;
        }
        let tokens: Vec<String> = run.drain(..).take(2).collect();

        if tokens.len() == 1 && !self.config.is_allowed_single(&tokens[0]) {
            debug!("Rejected single-token name candidate '{}'", tokens[0]);
            return;
        }

        out.push(NameCandidate {
            value: tokens.join(" "),
            after_for,
        });
    }
}

/// Strip surrounding punctuation and a possessive suffix.
fn clean_token(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'');
    let trimmed = trimmed.trim_matches(|c: char| c == '-' || c == '\'');
    trimmed
        .strip_suffix("'s")
        .or_else(|| trimmed.strip_suffix("’s"))
        .unwrap_or(trimmed)
        .to_string()
}
