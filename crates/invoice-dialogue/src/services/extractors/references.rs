use regex::RegexBuilder;
use tracing::debug;

use crate::config::PatternConfig;
use crate::models::{ActiveTopic, ConversationState};
use crate::utils::text::find_phrase;

/// What a pronoun or placeholder in the message points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceResolution {
    /// No pronoun or placeholder in the message.
    NotReferenced,
    /// The active topic.
    Topic(ActiveTopic),
    /// The only entity left over from the last result set.
    Candidate(String),
    /// The only invoice from the last listing.
    Invoice(String),
    /// Several candidates; the user must pick one.
    Ambiguous { slot: String, candidates: Vec<String> },
    /// A reference with nothing to point at.
    Unresolved,
}

impl ReferenceResolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotReferenced => "not_referenced",
            Self::Topic(_) => "topic",
            Self::Candidate(_) => "candidate",
            Self::Invoice(_) => "invoice",
            Self::Ambiguous { .. } => "ambiguous",
            Self::Unresolved => "unresolved",
        }
    }
}

pub struct ReferenceResolver<'a> {
    config: &'a PatternConfig,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(config: &'a PatternConfig) -> Self {
        Self { config }
    }

    pub fn has_pronoun(&self, normalized: &str) -> bool {
        find_phrase(normalized, &self.config.phrases.pronouns).is_some()
    }

    pub fn invoice_placeholder<'t>(&'t self, normalized: &str) -> Option<&'t str> {
        find_phrase(normalized, &self.config.phrases.invoice_placeholders)
    }

    fn entity_reference(&self, normalized: &str) -> Option<&str> {
        find_phrase(normalized, &self.config.phrases.placeholders)
            .or_else(|| find_phrase(normalized, &self.config.phrases.pronouns))
    }

    pub fn resolve(&self, normalized: &str, state: &ConversationState) -> ReferenceResolution {
        if let Some(placeholder) = self.invoice_placeholder(normalized) {
            debug!("Invoice placeholder '{}'", placeholder);
            return match state.last_invoice_candidates.as_slice() {
                [] => ReferenceResolution::Unresolved,
                [only] => ReferenceResolution::Invoice(only.clone()),
                many => ReferenceResolution::Ambiguous {
                    slot: "invoice_id".to_string(),
                    candidates: many.to_vec(),
                },
            };
        }

        let Some(reference) = self.entity_reference(normalized) else {
            return ReferenceResolution::NotReferenced;
        };
        debug!("Entity reference '{}'", reference);

        if let Some(topic) = &state.active_topic {
            return ReferenceResolution::Topic(topic.clone());
        }

        match state.candidate_entities.as_slice() {
            [] => ReferenceResolution::Unresolved,
            [only] => ReferenceResolution::Candidate(only.clone()),
            many => ReferenceResolution::Ambiguous {
                slot: "entity_name".to_string(),
                candidates: many.to_vec(),
            },
        }
    }

    /// Replace the first invoice placeholder in `message` with `invoice_id`,
    /// or append the id when no placeholder is present.
    pub fn substitute_invoice(&self, message: &str, invoice_id: &str) -> String {
        for placeholder in &self.config.phrases.invoice_placeholders {
            let pattern = format!(r"\b{}\b", regex::escape(placeholder).replace(' ', r"\s+"));
            let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
                continue;
            };
            if re.is_match(message) {
                let replacement = format!("invoice {}", invoice_id);
                return re.replace(message, regex::NoExpand(&replacement)).into_owned();
            }
        }
        format!("{} for invoice {}", message, invoice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityRole;
    use crate::utils::text::normalize;

    fn resolve(text: &str, state: &ConversationState) -> ReferenceResolution {
        let config = PatternConfig::builtin();
        ReferenceResolver::new(&config).resolve(&normalize(text), state)
    }

    #[test]
    fn test_no_reference() {
        assert_eq!(
            resolve("spend for Jack Garcia", &ConversationState::new()),
            ReferenceResolution::NotReferenced
        );
        // "there" must not match "her".
        assert_eq!(
            resolve("is there anything new", &ConversationState::new()),
            ReferenceResolution::NotReferenced
        );
    }

    #[test]
    fn test_pronoun_resolves_to_topic() {
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, "Mia Chen", "hours");
        state.candidate_entities = vec!["A".into(), "B".into()];
        match resolve("what about her hours", &state) {
            ReferenceResolution::Topic(topic) => assert_eq!(topic.value, "Mia Chen"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_candidates_without_topic() {
        let mut state = ConversationState::new();
        state.candidate_entities = vec!["Mia Chen".into()];
        assert_eq!(
            resolve("that student", &state),
            ReferenceResolution::Candidate("Mia Chen".into())
        );

        state.candidate_entities.push("Jack Garcia".into());
        assert_eq!(
            resolve("how about them", &state),
            ReferenceResolution::Ambiguous {
                slot: "entity_name".into(),
                candidates: vec!["Mia Chen".into(), "Jack Garcia".into()],
            }
        );

        state.candidate_entities.clear();
        assert_eq!(resolve("her spend", &state), ReferenceResolution::Unresolved);
    }

    #[test]
    fn test_invoice_placeholder() {
        let mut state = ConversationState::new();
        state.last_invoice_candidates = vec!["INV-2041".into()];
        assert_eq!(
            resolve("line items for that invoice", &state),
            ReferenceResolution::Invoice("INV-2041".into())
        );

        state.last_invoice_candidates.push("INV-2042".into());
        assert!(matches!(
            resolve("line items for that invoice", &state),
            ReferenceResolution::Ambiguous { ref slot, .. } if slot == "invoice_id"
        ));
    }

    #[test]
    fn test_substitute_invoice() {
        let config = PatternConfig::builtin();
        let resolver = ReferenceResolver::new(&config);
        assert_eq!(
            resolver.substitute_invoice("Line items for That Invoice?", "INV-7"),
            "Line items for invoice INV-7?"
        );
        assert_eq!(
            resolver.substitute_invoice("line items", "INV-7"),
            "line items for invoice INV-7"
        );
    }
}
