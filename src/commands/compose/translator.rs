use tracing::warn;

use crate::config::TRANSLATION_TIMEOUT;
use crate::providers::{GenerationOptions, TextGeneration};

const TRANSLATOR_SYSTEM_PROMPT: &str = "\
You rewrite everyday requests into the vocabulary of a classic devotional \
passage corpus so they can be matched against it. Reply with a single \
comma-separated list of 5 to 8 concept terms and nothing else.

Examples:
Request: something to smile about
Concept terms: joy, laughter, gladness, rejoicing, delight

Request: my dad is in the hospital
Concept terms: healing, sickness, comfort, restoration, trust, deliverance

Request: I can't stop worrying about money
Concept terms: provision, anxiety, trust, daily bread, contentment, peace";

/// Translation outcome. The pipeline only consumes `text`; the flag exists
/// so callers and tests can tell a real translation from the silent
/// fallback without guessing from content.
#[derive(Debug, Clone)]
pub(super) struct ConceptExpansion {
    pub(super) translated: bool,
    pub(super) text: String,
}

/// Best-effort rewrite of the raw request into corpus-register concept
/// terms. Any failure (transport, timeout, unusable reply) falls back to the
/// raw request text. One attempt only; this stage never retries.
pub(super) async fn translate(
    generator: &impl TextGeneration,
    request_text: &str,
) -> ConceptExpansion {
    let user_prompt = format!("Request: {request_text}\nConcept terms:");

    match generator
        .complete(
            TRANSLATOR_SYSTEM_PROMPT,
            &user_prompt,
            GenerationOptions::default(),
            TRANSLATION_TIMEOUT,
        )
        .await
    {
        Ok(raw) => match parse_term_list(&raw) {
            Some(terms) => ConceptExpansion {
                translated: true,
                text: terms,
            },
            None => {
                warn!(
                    reply_chars = raw.chars().count(),
                    "intent translation returned no usable term list; using raw request"
                );
                fallback(request_text)
            }
        },
        Err(err) => {
            warn!(error = %err, "intent translation failed; using raw request");
            fallback(request_text)
        }
    }
}

fn fallback(request_text: &str) -> ConceptExpansion {
    ConceptExpansion {
        translated: false,
        text: request_text.to_string(),
    }
}

/// Accepts only a plain comma-separated term list; prose or multi-line
/// replies are rejected so the fallback kicks in.
fn parse_term_list(raw: &str) -> Option<String> {
    let line = raw.trim().trim_matches('"').trim();
    let line = line.strip_prefix("Concept terms:").unwrap_or(line).trim();
    if line.is_empty() || line.contains('\n') {
        return None;
    }

    let terms = line
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .collect::<Vec<&str>>();

    if terms.len() < 2 || terms.iter().any(|term| term.split_whitespace().count() > 4) {
        return None;
    }

    Some(terms.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_term_list_accepts_plain_lists() {
        assert_eq!(
            parse_term_list("joy, laughter, gladness").as_deref(),
            Some("joy, laughter, gladness")
        );
        assert_eq!(
            parse_term_list("\"Concept terms: peace, rest, stillness\"").as_deref(),
            Some("peace, rest, stillness")
        );
    }

    #[test]
    fn parse_term_list_rejects_prose_and_multiline() {
        assert!(parse_term_list("Here are some terms you could use for this").is_none());
        assert!(parse_term_list("joy, laughter\ngladness, delight").is_none());
        assert!(parse_term_list("").is_none());
    }
}
