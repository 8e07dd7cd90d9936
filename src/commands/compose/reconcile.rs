use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CitationSource, GenerationResult, ReconciledResult, RetrievedCandidate};

static ANNOTATION_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("annotation span pattern is valid"));

/// Removes `{...}` marginal-note spans and any stray brace characters, then
/// collapses repeated whitespace. Idempotent; output never contains braces.
pub(super) fn strip_annotations(text: &str) -> String {
    let without_spans = ANNOTATION_SPAN.replace_all(text, " ");
    let without_braces = without_spans
        .chars()
        .filter(|ch| *ch != '{' && *ch != '}')
        .collect::<String>();
    without_braces.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Loose citation match: either label contains the other, or their leading
/// whitespace-delimited tokens are identical. Comparison is whitespace-
/// normalized and case-insensitive, tolerating partial or abbreviated
/// citations like "John 3" against "John 3:16".
pub(super) fn citation_matches(generated_label: &str, candidate_reference: &str) -> bool {
    let left = normalize_label(generated_label);
    let right = normalize_label(candidate_reference);
    if left.is_empty() || right.is_empty() {
        return false;
    }

    if left.contains(&right) || right.contains(&left) {
        return true;
    }

    leading_token(&left) == leading_token(&right)
}

/// Decides whether to trust the generator's citation or substitute the
/// corpus's authoritative text. A matched candidate always wins. With no
/// match (including zero candidates) the generator's citation stands,
/// annotation-stripped only; text the corpus has no record of is never
/// substituted.
pub(super) fn reconcile(
    result: GenerationResult,
    candidates: &[RetrievedCandidate],
) -> (ReconciledResult, CitationSource) {
    let matched = candidates
        .iter()
        .find(|candidate| citation_matches(&result.citation_label, &candidate.reference));

    match matched {
        Some(candidate) => (
            ReconciledResult {
                theme: result.theme,
                citation_text: strip_annotations(&candidate.text),
                citation_label: candidate.reference.clone(),
                body: result.body,
            },
            CitationSource::Corpus,
        ),
        None => (
            ReconciledResult {
                theme: result.theme,
                citation_text: strip_annotations(&result.citation_text),
                citation_label: result.citation_label,
                body: result.body,
            },
            CitationSource::Generator,
        ),
    }
}

/// Advisory check only: reports whether the body echoes the citation text
/// verbatim (alphanumeric-normalized containment). Callers log and surface
/// the flag; the result is never mutated or rejected over it.
pub(super) fn body_repeats_citation(body: &str, citation_text: &str) -> bool {
    let body_norm = normalize_for_overlap(body);
    let citation_norm = normalize_for_overlap(citation_text);
    if citation_norm.is_empty() {
        return false;
    }

    body_norm.contains(&citation_norm)
}

fn normalize_label(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn leading_token(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or("")
}

fn normalize_for_overlap(value: &str) -> String {
    value
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}
